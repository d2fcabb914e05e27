use image::DynamicImage;
use vision_studio_contracts::{Diagnostic, Operation};

use crate::config::StudioConfig;
use crate::imaging::ResolvedImage;
use crate::providers::{ContentPart, ImageModelClient, ModelCall};
use crate::resolver::resolve;
use crate::{error_chain_text, truncate_text};

/// Prompt characters kept in warning logs.
const LOGGED_PROMPT_CHARS: usize = 48;

/// One user action. Images are expected to be oriented already.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub operation: Operation,
    pub prompt: String,
    pub images: Vec<DynamicImage>,
}

impl GenerationRequest {
    pub fn new(operation: Operation, prompt: impl Into<String>) -> Self {
        Self {
            operation,
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: DynamicImage) -> Self {
        self.images.push(image);
        self
    }

    pub fn check_preconditions(&self) -> Result<(), Diagnostic> {
        let expected = self.operation.required_images();
        if self.images.len() != expected {
            return Err(Diagnostic::MissingInput {
                operation: self.operation,
                reason: format!(
                    "expected {expected} image(s), got {}",
                    self.images.len()
                ),
            });
        }
        if self.operation.requires_prompt() && self.prompt.trim().is_empty() {
            return Err(Diagnostic::MissingInput {
                operation: self.operation,
                reason: "prompt is empty".to_string(),
            });
        }
        Ok(())
    }

    fn to_model_call(&self, model: &str) -> ModelCall {
        let mut parts = Vec::with_capacity(1 + self.images.len());
        parts.push(ContentPart::Text(self.prompt.clone()));
        parts.extend(self.images.iter().cloned().map(ContentPart::Image));
        ModelCall {
            model: model.to_string(),
            parts,
        }
    }
}

pub struct Dispatcher<'a> {
    config: &'a StudioConfig,
    client: &'a dyn ImageModelClient,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a StudioConfig, client: &'a dyn ImageModelClient) -> Self {
        Self { config, client }
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }

    /// Validates, issues exactly one remote call, and resolves its reply.
    pub fn dispatch(&self, request: &GenerationRequest) -> Result<ResolvedImage, Diagnostic> {
        request.check_preconditions()?;

        let model = self.config.model_for(request.operation);
        let call = request.to_model_call(model);
        tracing::info!(
            operation = request.operation.slug(),
            model,
            client = self.client.name(),
            images = request.images.len(),
            "dispatching generation"
        );

        let response = self.client.generate(&call).map_err(|err| {
            let detail = error_chain_text(&err, 512);
            tracing::warn!(
                operation = request.operation.slug(),
                prompt = %truncate_text(&request.prompt, LOGGED_PROMPT_CHARS),
                error = %detail,
                "model call failed"
            );
            Diagnostic::NetworkFailure(detail)
        })?;
        tracing::debug!(shape = ?response.shape(), "model responded");

        let outcome = resolve(&response);
        match &outcome {
            Ok(image) => tracing::info!(
                operation = request.operation.slug(),
                encoding = %image.encoding(),
                width = image.width(),
                height = image.height(),
                "resolved image"
            ),
            Err(Diagnostic::MalformedImageData { reason, head_hex }) => tracing::warn!(
                operation = request.operation.slug(),
                prompt = %truncate_text(&request.prompt, LOGGED_PROMPT_CHARS),
                %reason,
                %head_hex,
                "model returned malformed image data"
            ),
            Err(diagnostic) => tracing::info!(
                operation = request.operation.slug(),
                kind = diagnostic.kind(),
                "no image resolved"
            ),
        }
        outcome
    }
}
