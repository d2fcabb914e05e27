use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use vision_studio_contracts::Diagnostic;

use crate::imaging::{decode_image_bytes, head_hex, RejectedImage, ResolvedImage};
use crate::response::{InlinePayload, RemoteResponse};

/// Locates the first decodable inline image in `response`.
///
/// Branch order: image, malformed payload, blocked, text-only, nothing.
/// A malformed part does not stop the scan; a later valid part still wins.
pub fn resolve(response: &RemoteResponse) -> Result<ResolvedImage, Diagnostic> {
    let mut first_rejection: Option<RejectedImage> = None;

    for candidate in response.candidates() {
        for part in candidate.parts() {
            let Some(payload) = part.inline_payload() else {
                continue;
            };
            match decode_inline(&payload) {
                Ok(image) => return Ok(image),
                Err(rejected) => {
                    first_rejection.get_or_insert(rejected);
                }
            }
        }
    }

    if let Some(rejected) = first_rejection {
        return Err(Diagnostic::MalformedImageData {
            reason: rejected.reason,
            head_hex: rejected.head_hex,
        });
    }
    if let Some(reason) = response.block_reason() {
        return Err(Diagnostic::Blocked {
            reason: Some(reason),
        });
    }
    if let Some(text) = response.text() {
        return Err(Diagnostic::TextOnly(text));
    }
    Err(Diagnostic::NoImage)
}

/// Only textual payloads go through base64; byte arrays are used as-is.
fn decode_inline(payload: &InlinePayload) -> Result<ResolvedImage, RejectedImage> {
    match payload {
        InlinePayload::Raw(bytes) => decode_image_bytes(bytes),
        InlinePayload::Encoded(text) => {
            let body = strip_data_url_prefix(text.trim());
            let bytes = BASE64.decode(body.as_bytes()).map_err(|err| RejectedImage {
                reason: format!("base64 decode failed: {err}"),
                head_hex: head_hex(body.as_bytes()),
            })?;
            decode_image_bytes(&bytes)
        }
    }
}

fn strip_data_url_prefix(value: &str) -> &str {
    if !value.starts_with("data:") {
        return value;
    }
    match value.split_once(";base64,") {
        Some((_, body)) => body,
        None => value,
    }
}
