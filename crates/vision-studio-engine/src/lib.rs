pub mod config;
pub mod dispatch;
pub mod imaging;
pub mod providers;
pub mod resolver;
pub mod response;
pub mod session;

pub use config::StudioConfig;
pub use dispatch::{Dispatcher, GenerationRequest};
pub use imaging::{
    decode_image_bytes, encode_png, load_source_image, ImageEncoding, ResolvedImage, Rotation,
    SourceImage,
};
pub use providers::{ContentPart, DryrunClient, GeminiClient, ImageModelClient, ModelCall};
pub use resolver::resolve;
pub use response::{RemoteResponse, ResponseShape};
pub use session::{Download, SessionState};

/// Flattens an error and its causes into one line, dropping repeated links.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing: &String| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::{error_chain_text, truncate_text};

    #[test]
    fn error_chain_text_preserves_nested_contexts() {
        let err = anyhow::anyhow!("socket closed")
            .context("Gemini request failed (https://example.test)")
            .context("generation failed");
        let rendered = error_chain_text(&err, 400);
        assert_eq!(
            rendered,
            "generation failed | caused by: Gemini request failed (https://example.test) | caused by: socket closed"
        );
    }

    #[test]
    fn error_chain_text_skips_repeated_causes() {
        let err = anyhow::anyhow!("timed out").context("timed out");
        assert_eq!(error_chain_text(&err, 400), "timed out");
    }

    #[test]
    fn truncate_text_counts_chars_not_bytes() {
        assert_eq!(truncate_text("héllo", 5), "héllo");
        assert_eq!(truncate_text("héllo wörld", 5), "héllo…");
    }
}
