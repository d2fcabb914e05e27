use thiserror::Error;

use crate::operations::Operation;

/// Outcome of a generation that did not produce an image.
///
/// Every variant is returned as a value so the front-end can render a
/// distinguishable message; nothing here is retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("{operation} is missing input: {reason}")]
    MissingInput {
        operation: Operation,
        reason: String,
    },
    #[error("generation was blocked by the safety filter ({})", .reason.as_deref().unwrap_or("no reason given"))]
    Blocked { reason: Option<String> },
    #[error("malformed image data: {reason}")]
    MalformedImageData {
        reason: String,
        /// Hex of the leading payload bytes.
        head_hex: String,
    },
    #[error("model returned text instead of an image: {0}")]
    TextOnly(String),
    #[error("no image was found in the model response")]
    NoImage,
    #[error("model request failed: {0}")]
    NetworkFailure(String),
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MissingInput { .. } => "missing_input",
            Diagnostic::Blocked { .. } => "blocked",
            Diagnostic::MalformedImageData { .. } => "malformed_image_data",
            Diagnostic::TextOnly(_) => "text_only",
            Diagnostic::NoImage => "no_image",
            Diagnostic::NetworkFailure(_) => "network_failure",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Diagnostic::MissingInput { .. } => {
                "Please provide all required inputs first!".to_string()
            }
            Diagnostic::Blocked { .. } => {
                "Image generation was blocked. Try a different, more appropriate prompt."
                    .to_string()
            }
            Diagnostic::MalformedImageData { reason, .. } => {
                format!("The model returned image data that could not be decoded ({reason}).")
            }
            Diagnostic::TextOnly(text) => format!("Model response: {text}"),
            Diagnostic::NoImage => {
                "No image was generated. The request may have been filtered or the model returned no content."
                    .to_string()
            }
            Diagnostic::NetworkFailure(detail) => format!("Error processing image: {detail}"),
        }
    }
}
