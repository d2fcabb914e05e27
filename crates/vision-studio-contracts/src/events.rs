use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::diagnostics::Diagnostic;
use crate::operations::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Chat,
    Run,
}

/// One line of `events.jsonl`. The variant name is written as `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        mode: SessionMode,
        client: String,
        operation: Operation,
    },
    GenerationStarted {
        operation: Operation,
        prompt: String,
        images: usize,
    },
    GenerationSucceeded {
        operation: Operation,
        mime_type: String,
        width: u32,
        height: u32,
    },
    GenerationFailed {
        operation: Operation,
        kind: String,
        error: String,
    },
    ArtifactSaved {
        operation: Operation,
        path: String,
        rotation: u32,
        bytes: usize,
    },
    SessionFinished {
        generations: usize,
        saved: usize,
    },
}

impl SessionEvent {
    pub fn generation_failed(operation: Operation, diagnostic: &Diagnostic) -> Self {
        SessionEvent::GenerationFailed {
            operation,
            kind: diagnostic.kind().to_string(),
            error: diagnostic.to_string(),
        }
    }
}

/// Per-session event trail. Without a file it only keeps the counters
/// reported by `session_finished`.
#[derive(Debug)]
pub struct EventLog {
    session_id: String,
    file: Option<File>,
    generations: usize,
    saved: usize,
}

impl EventLog {
    pub fn disabled(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            file: None,
            generations: 0,
            saved: 0,
        }
    }

    /// Opens `path` for appending, creating parent directories.
    pub fn open(path: &Path, session_id: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed opening {}", path.display()))?;
        let mut log = Self::disabled(session_id);
        log.file = Some(file);
        Ok(log)
    }

    pub fn record(&mut self, event: &SessionEvent) -> Result<()> {
        match event {
            SessionEvent::GenerationStarted { .. } => self.generations += 1,
            SessionEvent::ArtifactSaved { .. } => self.saved += 1,
            _ => {}
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        let mut line = serde_json::to_value(event)?;
        if let Value::Object(fields) = &mut line {
            fields.insert(
                "session_id".to_string(),
                Value::String(self.session_id.clone()),
            );
            fields.insert("ts".to_string(), Value::String(now_utc_iso()));
        }
        let mut encoded = serde_json::to_vec(&line)?;
        encoded.push(b'\n');
        file.write_all(&encoded)
            .context("failed appending session event")?;
        Ok(())
    }

    /// Records `session_finished` with the counts seen so far.
    pub fn finish(&mut self) -> Result<()> {
        let event = SessionEvent::SessionFinished {
            generations: self.generations,
            saved: self.saved,
        };
        self.record(&event)
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
