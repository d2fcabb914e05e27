use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::StudioConfig;
use crate::imaging::{encode_png, ImageEncoding};
use crate::response::RemoteResponse;
use crate::truncate_text;

const API_KEY_HEADER: &str = "x-goog-api-key";
const DRYRUN_DEFAULT_SIZE: u32 = 512;
const DRYRUN_MIN_SIZE: u32 = 16;

/// One element of the prompt sequence, in the order it is sent.
#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    Image(DynamicImage),
}

#[derive(Debug, Clone)]
pub struct ModelCall {
    pub model: String,
    pub parts: Vec<ContentPart>,
}

impl ModelCall {
    pub fn prompt(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            ContentPart::Text(text) => Some(text.as_str()),
            ContentPart::Image(_) => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &DynamicImage> {
        self.parts.iter().filter_map(|part| match part {
            ContentPart::Image(image) => Some(image),
            ContentPart::Text(_) => None,
        })
    }
}

/// Remote generation collaborator: one blocking call per request.
pub trait ImageModelClient: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, call: &ModelCall) -> Result<RemoteResponse>;
}

pub struct GeminiClient {
    api_base: String,
    api_key: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &StudioConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_parts(call: &ModelCall) -> Result<Vec<Value>> {
        let mut parts = Vec::with_capacity(call.parts.len());
        for part in &call.parts {
            match part {
                ContentPart::Text(text) => parts.push(json!({ "text": text })),
                ContentPart::Image(image) => {
                    let bytes = encode_png(image).context("failed to encode input image")?;
                    parts.push(json!({
                        "inlineData": {
                            "mimeType": ImageEncoding::Png.mime_type(),
                            "data": BASE64.encode(bytes),
                        }
                    }));
                }
            }
        }
        Ok(parts)
    }

    fn build_payload(call: &ModelCall) -> Result<Value> {
        Ok(json!({
            "contents": [{
                "role": "user",
                "parts": Self::build_parts(call)?,
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
        }))
    }
}

impl ImageModelClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, call: &ModelCall) -> Result<RemoteResponse> {
        let endpoint = self.endpoint_for_model(&call.model);
        let payload = Self::build_payload(call)?;
        tracing::debug!(%endpoint, parts = call.parts.len(), "sending generateContent request");
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<RemoteResponse> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    RemoteResponse::from_slice(body.as_bytes())
        .with_context(|| format!("{provider} returned an unreadable response"))
}

/// Offline collaborator: answers every call with a PNG tinted by a hash of
/// the prompt, sized like the first input image.
#[derive(Debug, Default)]
pub struct DryrunClient;

impl DryrunClient {
    pub fn new() -> Self {
        Self
    }
}

impl ImageModelClient for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, call: &ModelCall) -> Result<RemoteResponse> {
        let (width, height) = call
            .images()
            .next()
            .map(|image| (image.width(), image.height()))
            .unwrap_or((DRYRUN_DEFAULT_SIZE, DRYRUN_DEFAULT_SIZE));
        let canvas = dryrun_canvas(
            width.max(DRYRUN_MIN_SIZE),
            height.max(DRYRUN_MIN_SIZE),
            call.prompt().unwrap_or_default(),
            &call.model,
        );
        let bytes = encode_png(&DynamicImage::ImageRgb8(canvas))?;
        Ok(RemoteResponse::new(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "inlineData": {
                            "mimeType": ImageEncoding::Png.mime_type(),
                            "data": BASE64.encode(bytes),
                        }
                    }],
                },
                "finishReason": "STOP",
            }],
            "modelVersion": format!("dryrun:{}", call.model),
        })))
    }
}

/// Prompt-colored canvas with low-bit grain so the PNG never compresses
/// below the resolver's size floor.
fn dryrun_canvas(width: u32, height: u32, prompt: &str, model: &str) -> RgbImage {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(model.as_bytes());
    let digest = hasher.finalize();
    let (r, g, b) = (digest[0], digest[1], digest[2]);
    let mut state = u32::from_be_bytes([digest[3], digest[4], digest[5], digest[6]]) | 1;
    let mut grain = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state & 0x0f) as u8
    };

    let mut canvas = RgbImage::new(width, height);
    for pixel in canvas.pixels_mut() {
        *pixel = Rgb([r ^ grain(), g ^ grain(), b ^ grain()]);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use vision_studio_contracts::{Diagnostic, Operation};

    use super::{ContentPart, DryrunClient, GeminiClient, ImageModelClient, ModelCall};
    use crate::config::StudioConfig;
    use crate::dispatch::{Dispatcher, GenerationRequest};
    use crate::imaging::test_images::noise_image;
    use crate::imaging::ImageEncoding;
    use crate::resolver::resolve;

    fn call(parts: Vec<ContentPart>) -> ModelCall {
        ModelCall {
            model: "gemini-2.5-flash-image-preview".to_string(),
            parts,
        }
    }

    #[test]
    fn endpoint_accepts_bare_and_prefixed_model_names() {
        let mut config = StudioConfig::with_api_key("k");
        config.api_base = "https://example.test/v1beta".to_string();
        let client = GeminiClient::new(&config);
        assert_eq!(
            client.endpoint_for_model("gemini-2.5-flash-image-preview"),
            "https://example.test/v1beta/models/gemini-2.5-flash-image-preview:generateContent"
        );
        assert_eq!(
            client.endpoint_for_model(" models/custom "),
            "https://example.test/v1beta/models/custom:generateContent"
        );
    }

    #[test]
    fn payload_keeps_prompt_then_images_order() -> anyhow::Result<()> {
        let request = call(vec![
            ContentPart::Text("merge them".to_string()),
            ContentPart::Image(noise_image(4, 4)),
            ContentPart::Image(noise_image(6, 2)),
        ]);
        let payload = GeminiClient::build_payload(&request)?;
        let parts = payload["contents"][0]["parts"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], json!({ "text": "merge them" }));
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("image/png"));
        assert!(parts[2]["inlineData"]["data"]
            .as_str()
            .map(|data| !data.is_empty())
            .unwrap_or(false));
        assert_eq!(payload["contents"][0]["role"], json!("user"));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
        Ok(())
    }

    #[test]
    fn text_only_call_sends_single_part() -> anyhow::Result<()> {
        let payload = GeminiClient::build_payload(&call(vec![ContentPart::Text(
            "a red circle".to_string(),
        )]))?;
        assert_eq!(
            payload["contents"][0]["parts"],
            Value::Array(vec![json!({ "text": "a red circle" })])
        );
        Ok(())
    }

    #[test]
    fn transport_failure_text_never_contains_api_key() {
        let mut config = StudioConfig::with_api_key("SECRET-KEY-123");
        config.api_base = "http://127.0.0.1:1/v1beta".to_string();
        let client = GeminiClient::new(&config);
        let dispatcher = Dispatcher::new(&config, &client);

        let outcome = dispatcher.dispatch(&GenerationRequest::new(
            Operation::TextToImage,
            "a red circle",
        ));
        match outcome {
            Err(diagnostic @ Diagnostic::NetworkFailure(_)) => {
                let detail = diagnostic.to_string();
                assert!(detail.contains("Gemini request failed"), "{detail}");
                assert!(!detail.contains("SECRET-KEY-123"), "{detail}");
                assert!(!diagnostic.user_message().contains("SECRET-KEY-123"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn dryrun_matches_first_input_size_and_resolves() -> anyhow::Result<()> {
        let client = DryrunClient::new();
        assert_eq!(client.name(), "dryrun");

        let response = client.generate(&call(vec![
            ContentPart::Text("restore".to_string()),
            ContentPart::Image(noise_image(30, 20)),
        ]))?;
        let image = resolve(&response).map_err(anyhow::Error::new)?;
        assert_eq!((image.width(), image.height()), (30, 20));
        assert_eq!(image.encoding(), ImageEncoding::Png);

        let response = client.generate(&call(vec![ContentPart::Text("sky".to_string())]))?;
        let image = resolve(&response).map_err(anyhow::Error::new)?;
        assert_eq!((image.width(), image.height()), (512, 512));
        Ok(())
    }

    #[test]
    fn dryrun_color_is_stable_per_prompt() -> anyhow::Result<()> {
        let client = DryrunClient::new();
        let first = client.generate(&call(vec![ContentPart::Text("teal".to_string())]))?;
        let again = client.generate(&call(vec![ContentPart::Text("teal".to_string())]))?;
        let other = client.generate(&call(vec![ContentPart::Text("rust".to_string())]))?;
        assert_eq!(first, again);
        assert_ne!(first, other);
        Ok(())
    }
}
