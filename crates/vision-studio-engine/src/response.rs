use anyhow::{Context, Result};
use serde_json::Value;

/// Finish reasons that mean the service filtered the output.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "IMAGE_PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

/// Numeric form of `SAFETY` in the service's finish reason enum.
const SAFETY_FINISH_CODE: i64 = 3;

/// Untrusted reply from the generation endpoint.
///
/// Nothing about the payload is assumed: every accessor checks optional
/// fields and yields `None` or an empty iterator when the shape differs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteResponse {
    payload: Value,
}

/// Structural shapes seen across service versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Candidates wrapped in a `_result` / `result` object.
    LegacyNested,
    Candidates,
    Blocked,
    TextOnly,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    LegacyNested,
    Standard,
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateSource<'a> {
    pub origin: CandidateOrigin,
    candidates: &'a [Value],
}

impl<'a> CandidateSource<'a> {
    pub fn candidates(&self) -> impl Iterator<Item = Candidate<'a>> + 'a {
        self.candidates.iter().map(Candidate)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a>(&'a Value);

#[derive(Debug, Clone, Copy)]
pub struct Part<'a>(&'a Value);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Named(String),
    Code(i64),
}

/// Inline image data as it was carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlinePayload {
    /// Base64 text (optionally a `data:` URL).
    Encoded(String),
    /// A JSON array of byte values.
    Raw(Vec<u8>),
}

impl RemoteResponse {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let payload: Value =
            serde_json::from_slice(bytes).context("model returned invalid JSON payload")?;
        Ok(Self::new(payload))
    }

    /// Legacy-wrapped candidates first, then top-level ones.
    pub fn candidate_sources(&self) -> Vec<CandidateSource<'_>> {
        let mut sources = Vec::new();
        let legacy = self
            .payload
            .get("_result")
            .or_else(|| self.payload.get("result"))
            .and_then(|wrapper| wrapper.get("candidates"))
            .and_then(Value::as_array);
        if let Some(candidates) = legacy {
            sources.push(CandidateSource {
                origin: CandidateOrigin::LegacyNested,
                candidates,
            });
        }
        if let Some(candidates) = self.payload.get("candidates").and_then(Value::as_array) {
            sources.push(CandidateSource {
                origin: CandidateOrigin::Standard,
                candidates,
            });
        }
        sources
    }

    pub fn candidates(&self) -> impl Iterator<Item = Candidate<'_>> + '_ {
        self.candidate_sources()
            .into_iter()
            .flat_map(|source| source.candidates())
    }

    /// Reason the service filtered the request, if it did.
    pub fn block_reason(&self) -> Option<String> {
        let from_candidates = self
            .candidates()
            .filter_map(|candidate| candidate.finish_reason())
            .find(FinishReason::is_block)
            .map(|reason| reason.to_string());
        from_candidates.or_else(|| {
            self.payload
                .get("promptFeedback")
                .or_else(|| self.payload.get("prompt_feedback"))
                .and_then(|feedback| {
                    feedback
                        .get("blockReason")
                        .or_else(|| feedback.get("block_reason"))
                })
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|reason| !reason.is_empty() && *reason != "BLOCK_REASON_UNSPECIFIED")
                .map(str::to_string)
        })
    }

    /// Plain text the model answered with: a top-level `text` field, or the
    /// text parts of the first candidate that has any.
    pub fn text(&self) -> Option<String> {
        if let Some(text) = self
            .payload
            .get("text")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
        {
            return Some(text.to_string());
        }
        self.candidates()
            .map(|candidate| {
                candidate
                    .parts()
                    .filter_map(|part| part.text())
                    .collect::<String>()
            })
            .find(|text| !text.trim().is_empty())
    }

    pub fn shape(&self) -> ResponseShape {
        let sources = self.candidate_sources();
        let non_empty = |origin| {
            sources
                .iter()
                .any(|source| source.origin == origin && !source.candidates.is_empty())
        };
        if non_empty(CandidateOrigin::LegacyNested) {
            ResponseShape::LegacyNested
        } else if non_empty(CandidateOrigin::Standard) {
            ResponseShape::Candidates
        } else if self.block_reason().is_some() {
            ResponseShape::Blocked
        } else if self.text().is_some() {
            ResponseShape::TextOnly
        } else {
            ResponseShape::Empty
        }
    }
}

impl<'a> Candidate<'a> {
    pub fn parts(&self) -> impl Iterator<Item = Part<'a>> + 'a {
        self.0
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| parts.as_slice())
            .unwrap_or_default()
            .iter()
            .map(Part)
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        let raw = self
            .0
            .get("finishReason")
            .or_else(|| self.0.get("finish_reason"))?;
        match raw {
            Value::String(name) if !name.trim().is_empty() => {
                Some(FinishReason::Named(name.trim().to_ascii_uppercase()))
            }
            Value::Number(code) => code.as_i64().map(FinishReason::Code),
            _ => None,
        }
    }
}

impl<'a> Part<'a> {
    pub fn text(&self) -> Option<&'a str> {
        self.0.get("text").and_then(Value::as_str)
    }

    pub fn inline_payload(&self) -> Option<InlinePayload> {
        let inline = self
            .0
            .get("inlineData")
            .or_else(|| self.0.get("inline_data"))?;
        match inline.get("data")? {
            Value::String(encoded) if !encoded.trim().is_empty() => {
                Some(InlinePayload::Encoded(encoded.clone()))
            }
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .map(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(InlinePayload::Raw),
            _ => None,
        }
    }
}

impl FinishReason {
    pub fn is_block(&self) -> bool {
        match self {
            FinishReason::Named(name) => BLOCKING_FINISH_REASONS.contains(&name.as_str()),
            FinishReason::Code(code) => *code == SAFETY_FINISH_CODE,
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishReason::Named(name) => f.write_str(name),
            FinishReason::Code(code) => write!(f, "finish reason {code}"),
        }
    }
}
