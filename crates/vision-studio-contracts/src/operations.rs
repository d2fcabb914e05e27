use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Edit,
    Fusion,
    Restoration,
    TextToImage,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Edit,
        Operation::Fusion,
        Operation::Restoration,
        Operation::TextToImage,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Operation::Edit => "Image Edit",
            Operation::Fusion => "Image Fusion",
            Operation::Restoration => "Image Restoration",
            Operation::TextToImage => "Text to Image",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Operation::Edit => "edit",
            Operation::Fusion => "fusion",
            Operation::Restoration => "restoration",
            Operation::TextToImage => "text_to_image",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Operation::Edit => "Transform your image with AI-powered edits",
            Operation::Fusion => "Blend two images into something extraordinary",
            Operation::Restoration => "Restore and enhance old photographs",
            Operation::TextToImage => "Generate images from your imagination",
        }
    }

    /// Exact number of source images the operation consumes.
    pub fn required_images(self) -> usize {
        match self {
            Operation::Edit | Operation::Restoration => 1,
            Operation::Fusion => 2,
            Operation::TextToImage => 0,
        }
    }

    pub fn requires_prompt(self) -> bool {
        matches!(self, Operation::TextToImage)
    }

    /// `<label lowercased, spaces as underscores>.png`, e.g. `text_to_image.png`.
    pub fn download_filename(self) -> String {
        format!(
            "{}.png",
            self.label().to_ascii_lowercase().replace(' ', "_")
        )
    }

    pub fn example_prompt(self) -> &'static str {
        match self {
            Operation::Edit => {
                "Try: 'Convert to cinematic style with dramatic shadows' or 'Enhance colors to make them pop vibrantly'"
            }
            Operation::Fusion => {
                "Try: 'Merge the subject from first image into the background of the second seamlessly'"
            }
            Operation::Restoration => {
                "Try: 'Fix all scratches and color fading while preserving the authentic vintage feel'"
            }
            Operation::TextToImage => {
                "Try: 'A majestic eagle soaring over snow-capped mountains during sunrise, professional wildlife photography'"
            }
        }
    }

    /// Prompt used by the single-shot runner when none is given.
    pub fn default_prompt(self) -> &'static str {
        match self {
            Operation::Edit => "Make the dog wear a small wizard hat and spectacles.",
            Operation::Fusion => {
                "Make the dog from the first image wear the cap from the second image. The cap should fit realistically on the dog's head."
            }
            Operation::Restoration => {
                "Restore this old, faded photograph. Sharpen the details, remove any scratches or damage, and enhance the colors to make it look like a new, high-quality photo."
            }
            Operation::TextToImage => "",
        }
    }

    pub fn default_output_filename(self) -> &'static str {
        match self {
            Operation::Edit => "edited_image_result.png",
            Operation::Fusion => "dog_with_cap_result.png",
            Operation::Restoration => "restored_image_result.png",
            Operation::TextToImage => "text_to_image_result.png",
        }
    }

    pub fn parse(raw: &str) -> Option<Operation> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        match normalized.as_str() {
            "edit" | "image_edit" => Some(Operation::Edit),
            "fusion" | "fuse" | "blend" | "image_fusion" => Some(Operation::Fusion),
            "restoration" | "restore" | "image_restoration" => Some(Operation::Restoration),
            "text_to_image" | "generate" | "generation" | "t2i" => Some(Operation::TextToImage),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::Operation;

    #[test]
    fn download_filenames_follow_lowercase_underscore_labels() {
        assert_eq!(Operation::Edit.download_filename(), "image_edit.png");
        assert_eq!(Operation::Fusion.download_filename(), "image_fusion.png");
        assert_eq!(
            Operation::Restoration.download_filename(),
            "image_restoration.png"
        );
        assert_eq!(
            Operation::TextToImage.download_filename(),
            "text_to_image.png"
        );
    }

    #[test]
    fn image_counts_match_operation_contract() {
        let counts: Vec<usize> = Operation::ALL
            .iter()
            .map(|operation| operation.required_images())
            .collect();
        assert_eq!(counts, vec![1, 2, 1, 0]);
        assert!(Operation::TextToImage.requires_prompt());
        assert!(!Operation::Fusion.requires_prompt());
    }

    #[test]
    fn parse_accepts_slugs_labels_and_aliases() {
        assert_eq!(Operation::parse("edit"), Some(Operation::Edit));
        assert_eq!(Operation::parse("Image Fusion"), Some(Operation::Fusion));
        assert_eq!(Operation::parse(" RESTORE "), Some(Operation::Restoration));
        assert_eq!(Operation::parse("text-to-image"), Some(Operation::TextToImage));
        assert_eq!(Operation::parse("Text to Image"), Some(Operation::TextToImage));
        assert_eq!(Operation::parse("t2i"), Some(Operation::TextToImage));
        assert_eq!(Operation::parse("upscale"), None);
    }

    #[test]
    fn only_text_to_image_has_empty_default_prompt() {
        for operation in Operation::ALL {
            let empty = operation.default_prompt().is_empty();
            assert_eq!(empty, operation == Operation::TextToImage, "{operation}");
        }
    }
}
