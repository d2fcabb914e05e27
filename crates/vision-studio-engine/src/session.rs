use anyhow::{bail, Result};
use vision_studio_contracts::{Diagnostic, Operation};

use crate::dispatch::{Dispatcher, GenerationRequest};
use crate::imaging::{ResolvedImage, Rotation, SourceImage};

/// PNG bytes ready to hand to the user, with their deterministic filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub png: Vec<u8>,
}

/// Per-session state for the interactive front-end. Never persisted.
#[derive(Debug, Clone)]
pub struct SessionState {
    operation: Operation,
    uploaded_image: Option<SourceImage>,
    /// Fusion needs both images, so a lone one is never stored.
    fusion_images: Option<[SourceImage; 2]>,
    /// The result together with the operation that produced it.
    result: Option<(Operation, ResolvedImage)>,
    result_rotation: Rotation,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            operation: Operation::Edit,
            uploaded_image: None,
            fusion_images: None,
            result: None,
            result_rotation: Rotation::None,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Switching operation keeps uploads; each operation reads its own slots.
    pub fn set_operation(&mut self, operation: Operation) {
        self.operation = operation;
    }

    pub fn upload(&mut self, image: SourceImage) {
        self.uploaded_image = Some(image);
    }

    pub fn upload_fusion(&mut self, first: SourceImage, second: SourceImage) {
        self.fusion_images = Some([first, second]);
    }

    pub fn uploaded_image(&self) -> Option<&SourceImage> {
        self.uploaded_image.as_ref()
    }

    pub fn fusion_images(&self) -> Option<&[SourceImage; 2]> {
        self.fusion_images.as_ref()
    }

    /// Slots are 1-based; fusion has slots 1 and 2, edit/restoration only 1.
    pub fn rotate_upload(&mut self, slot: usize, rotation: Rotation) -> Result<()> {
        let operation = self.operation;
        let target = match operation {
            Operation::Fusion => self
                .fusion_images
                .as_mut()
                .and_then(|images| slot.checked_sub(1).and_then(|idx| images.get_mut(idx))),
            Operation::Edit | Operation::Restoration if slot == 1 => self.uploaded_image.as_mut(),
            Operation::Edit | Operation::Restoration => None,
            Operation::TextToImage => bail!("{operation} takes no source images"),
        };
        let Some(image) = target else {
            bail!("no uploaded image in slot {slot} for {operation}");
        };
        image.set_rotation(rotation);
        Ok(())
    }

    /// Source images the current operation would send.
    pub fn source_count(&self) -> usize {
        match self.operation {
            Operation::Edit | Operation::Restoration => usize::from(self.uploaded_image.is_some()),
            Operation::Fusion if self.fusion_images.is_some() => 2,
            Operation::Fusion | Operation::TextToImage => 0,
        }
    }

    /// Oriented images for the current operation; missing uploads are left
    /// for the dispatcher to reject.
    pub fn build_request(&self, prompt: &str) -> GenerationRequest {
        let images = match self.operation {
            Operation::Edit | Operation::Restoration => self
                .uploaded_image
                .iter()
                .map(SourceImage::oriented)
                .collect(),
            Operation::Fusion => self
                .fusion_images
                .iter()
                .flat_map(|images| images.iter().map(SourceImage::oriented))
                .collect(),
            Operation::TextToImage => Vec::new(),
        };
        GenerationRequest {
            operation: self.operation,
            prompt: prompt.to_string(),
            images,
        }
    }

    /// Drops the previous result before a new request starts.
    pub fn begin_generation(&mut self) {
        self.result = None;
        self.result_rotation = Rotation::None;
    }

    pub fn finish_generation(
        &mut self,
        operation: Operation,
        outcome: Result<ResolvedImage, Diagnostic>,
    ) -> Result<&ResolvedImage, Diagnostic> {
        let stored = self.result.insert((operation, outcome?));
        Ok(&stored.1)
    }

    pub fn generate(
        &mut self,
        dispatcher: &Dispatcher<'_>,
        prompt: &str,
    ) -> Result<&ResolvedImage, Diagnostic> {
        self.begin_generation();
        let request = self.build_request(prompt);
        let outcome = dispatcher.dispatch(&request);
        self.finish_generation(request.operation, outcome)
    }

    pub fn result(&self) -> Option<&ResolvedImage> {
        self.result.as_ref().map(|(_, image)| image)
    }

    pub fn result_operation(&self) -> Option<Operation> {
        self.result.as_ref().map(|(operation, _)| *operation)
    }

    pub fn result_rotation(&self) -> Rotation {
        self.result_rotation
    }

    pub fn rotate_result(&mut self, rotation: Rotation) -> Result<()> {
        if self.result.is_none() {
            bail!("no generated image to rotate");
        }
        self.result_rotation = rotation;
        Ok(())
    }

    /// The result as it should be shown: with the selected rotation applied.
    pub fn display_image(&self) -> Option<ResolvedImage> {
        self.result()
            .map(|image| image.rotated(self.result_rotation))
    }

    /// Named after the operation that produced the result, not the current one.
    pub fn download(&self) -> Result<Download> {
        let (Some(operation), Some(image)) = (self.result_operation(), self.display_image())
        else {
            bail!("no generated image to download");
        };
        Ok(Download {
            filename: operation.download_filename(),
            png: image.to_png_bytes()?,
        })
    }

    pub fn reset_result(&mut self) {
        self.begin_generation();
    }

    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Operation: {} ({})",
            self.operation,
            self.operation.description()
        )];
        match self.operation {
            Operation::Edit | Operation::Restoration => {
                lines.push(describe_upload("Image", self.uploaded_image.as_ref()));
            }
            Operation::Fusion => match &self.fusion_images {
                Some([first, second]) => {
                    lines.push(describe_upload("First image", Some(first)));
                    lines.push(describe_upload("Second image", Some(second)));
                }
                None => lines.push("Images: none (upload two)".to_string()),
            },
            Operation::TextToImage => {}
        }
        match (self.result_operation(), self.display_image()) {
            (Some(operation), Some(image)) => lines.push(format!(
                "Result: {}x{} {} from {operation} (rotated {}°)",
                image.width(),
                image.height(),
                image.encoding(),
                self.result_rotation.degrees()
            )),
            _ => lines.push("Result: none".to_string()),
        }
        lines
    }
}

fn describe_upload(label: &str, image: Option<&SourceImage>) -> String {
    match image {
        Some(image) => {
            let oriented = image.oriented();
            format!(
                "{label}: {}x{} (rotated {}°)",
                oriented.width(),
                oriented.height(),
                image.rotation().degrees()
            )
        }
        None => format!("{label}: none"),
    }
}
