use std::env;
use std::fmt;
use std::time::Duration;

use anyhow::{bail, Result};
use vision_studio_contracts::Operation;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";

const DEFAULT_TIMEOUT_SECS: f64 = 90.0;
const MIN_TIMEOUT_SECS: f64 = 15.0;
const MAX_TIMEOUT_SECS: f64 = 300.0;

/// Process-wide settings, built once at startup and passed by reference.
#[derive(Clone, PartialEq)]
pub struct StudioConfig {
    pub api_key: String,
    pub api_base: String,
    /// Model for edit, fusion, and restoration.
    pub image_model: String,
    /// Model for text-to-image.
    pub generation_model: String,
    pub request_timeout: Duration,
}

impl StudioConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        match dotenv::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(_) => tracing::debug!("no .env file found, using process environment"),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let Some(api_key) = read("GEMINI_API_KEY").or_else(|| read("GOOGLE_API_KEY")) else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let mut config = Self::with_api_key(api_key);
        if let Some(base) = read("GEMINI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = read("VISION_STUDIO_IMAGE_MODEL") {
            config.image_model = model;
        }
        if let Some(model) = read("VISION_STUDIO_GENERATION_MODEL") {
            config.generation_model = model;
        }
        if let Some(raw) = read("VISION_STUDIO_REQUEST_TIMEOUT") {
            config.request_timeout = parse_timeout(&raw);
        }
        Ok(config)
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            generation_model: DEFAULT_IMAGE_MODEL.to_string(),
            request_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn model_for(&self, operation: Operation) -> &str {
        match operation {
            Operation::TextToImage => &self.generation_model,
            Operation::Edit | Operation::Fusion | Operation::Restoration => &self.image_model,
        }
    }
}

impl fmt::Debug for StudioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudioConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("image_model", &self.image_model)
            .field("generation_model", &self.generation_model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn parse_timeout(raw: &str) -> Duration {
    let seconds = raw
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
        .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
    Duration::from_secs_f64(seconds)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use vision_studio_contracts::Operation;

    use super::{StudioConfig, DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL};

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let err = StudioConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = StudioConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "   ")])).unwrap_err();
        assert!(err.to_string().contains("not set"));
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() -> anyhow::Result<()> {
        let config = StudioConfig::from_lookup(lookup_from(&[("GOOGLE_API_KEY", "g-key")]))?;
        assert_eq!(config.api_key, "g-key");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.model_for(Operation::Edit), DEFAULT_IMAGE_MODEL);
        assert_eq!(config.model_for(Operation::TextToImage), DEFAULT_IMAGE_MODEL);
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        Ok(())
    }

    #[test]
    fn overrides_are_trimmed_and_routed_per_operation() -> anyhow::Result<()> {
        let config = StudioConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", " primary "),
            ("GOOGLE_API_KEY", "secondary"),
            ("GEMINI_API_BASE", "https://example.test/v1/"),
            ("VISION_STUDIO_IMAGE_MODEL", "gemini-edit"),
            ("VISION_STUDIO_GENERATION_MODEL", "gemini-t2i"),
        ]))?;
        assert_eq!(config.api_key, "primary");
        assert_eq!(config.api_base, "https://example.test/v1");
        assert_eq!(config.model_for(Operation::Fusion), "gemini-edit");
        assert_eq!(config.model_for(Operation::Restoration), "gemini-edit");
        assert_eq!(config.model_for(Operation::TextToImage), "gemini-t2i");
        Ok(())
    }

    #[test]
    fn request_timeout_is_clamped() -> anyhow::Result<()> {
        let cases = [("120", 120.0), ("1", 15.0), ("9000", 300.0), ("soon", 90.0)];
        for (raw, expected) in cases {
            let config = StudioConfig::from_lookup(lookup_from(&[
                ("GEMINI_API_KEY", "k"),
                ("VISION_STUDIO_REQUEST_TIMEOUT", raw),
            ]))?;
            assert_eq!(config.request_timeout.as_secs_f64(), expected, "{raw}");
        }
        Ok(())
    }

    #[test]
    fn debug_output_redacts_key() {
        let rendered = format!("{:?}", StudioConfig::with_api_key("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
