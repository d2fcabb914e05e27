use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, ImageFormat};

/// Payloads shorter than this cannot be a real raster image.
pub const MIN_IMAGE_BYTES: usize = 100;

/// Number of leading bytes reported when a payload is rejected.
pub const HEAD_SAMPLE_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Jpeg,
    Gif,
}

impl ImageEncoding {
    pub fn sniff(bytes: &[u8]) -> Option<ImageEncoding> {
        if bytes.starts_with(b"\x89PNG") {
            Some(ImageEncoding::Png)
        } else if bytes.starts_with(b"\xFF\xD8") {
            Some(ImageEncoding::Jpeg)
        } else if bytes.starts_with(b"GIF") {
            Some(ImageEncoding::Gif)
        } else {
            None
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
            ImageEncoding::Jpeg => "image/jpeg",
            ImageEncoding::Gif => "image/gif",
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ImageEncoding::Png => ImageFormat::Png,
            ImageEncoding::Jpeg => ImageFormat::Jpeg,
            ImageEncoding::Gif => ImageFormat::Gif,
        }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageEncoding::Png => "PNG",
            ImageEncoding::Jpeg => "JPEG",
            ImageEncoding::Gif => "GIF",
        })
    }
}

/// Why a payload was rejected before or during decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedImage {
    pub reason: String,
    pub head_hex: String,
}

impl RejectedImage {
    fn new(reason: String, bytes: &[u8]) -> Self {
        Self {
            reason,
            head_hex: head_hex(bytes),
        }
    }
}

pub fn head_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(HEAD_SAMPLE_BYTES)])
}

/// Size and signature checks run before any decode attempt.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<ImageEncoding, RejectedImage> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(RejectedImage::new(
            format!(
                "payload is {} bytes, below the {MIN_IMAGE_BYTES} byte minimum",
                bytes.len()
            ),
            bytes,
        ));
    }
    ImageEncoding::sniff(bytes).ok_or_else(|| {
        RejectedImage::new(
            "payload does not start with a PNG, JPEG, or GIF signature".to_string(),
            bytes,
        )
    })
}

pub fn decode_image_bytes(bytes: &[u8]) -> Result<ResolvedImage, RejectedImage> {
    let encoding = validate_image_bytes(bytes)?;
    let image = image::load_from_memory_with_format(bytes, encoding.format())
        .map_err(|err| RejectedImage::new(format!("{encoding} decode failed: {err}"), bytes))?;
    Ok(ResolvedImage { image, encoding })
}

/// Clockwise quarter turns. 90 and 270 swap width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    pub const DEGREES: [u32; 4] = [0, 90, 180, 270];

    pub fn from_degrees(degrees: u32) -> Option<Rotation> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Clockwise180),
            270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }

    pub fn apply(self, image: &DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => image.clone(),
            Rotation::Clockwise90 => image.rotate90(),
            Rotation::Clockwise180 => image.rotate180(),
            Rotation::Clockwise270 => image.rotate270(),
        }
    }
}

/// A decoded raster image plus the encoding it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImage {
    image: DynamicImage,
    encoding: ImageEncoding,
}

impl ResolvedImage {
    pub fn new(image: DynamicImage, encoding: ImageEncoding) -> Self {
        Self { image, encoding }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn encoding(&self) -> ImageEncoding {
        self.encoding
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn rotated(&self, rotation: Rotation) -> ResolvedImage {
        ResolvedImage {
            image: rotation.apply(&self.image),
            encoding: self.encoding,
        }
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        encode_png(&self.image)
    }
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .context("PNG encode failed")?;
    Ok(buf.into_inner())
}

/// An uploaded source image with the rotation the user picked for it.
#[derive(Debug, Clone)]
pub struct SourceImage {
    original: DynamicImage,
    rotation: Rotation,
}

impl SourceImage {
    pub fn new(original: DynamicImage) -> Self {
        Self {
            original,
            rotation: Rotation::None,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("failed to decode uploaded image")?;
        Ok(Self::new(image))
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Rotation is always relative to the upload, never cumulative.
    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    pub fn oriented(&self) -> DynamicImage {
        self.rotation.apply(&self.original)
    }
}

pub fn load_source_image(path: &Path) -> Result<SourceImage> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    SourceImage::from_bytes(&bytes).with_context(|| format!("failed loading {}", path.display()))
}


#[cfg(test)]
mod tests {
    use image::ImageFormat;

    use super::test_images::{encoded, noise_image, png_bytes};
    use super::*;

    #[test]
    fn sniff_recognizes_known_signatures() {
        assert_eq!(
            ImageEncoding::sniff(b"\x89PNG\r\n\x1a\n"),
            Some(ImageEncoding::Png)
        );
        assert_eq!(
            ImageEncoding::sniff(b"\xFF\xD8\xFF\xE0"),
            Some(ImageEncoding::Jpeg)
        );
        assert_eq!(ImageEncoding::sniff(b"GIF89a"), Some(ImageEncoding::Gif));
        assert_eq!(ImageEncoding::sniff(b"RIFF....WEBP"), None);
        assert_eq!(ImageEncoding::sniff(b""), None);
    }

    #[test]
    fn short_payloads_are_rejected_with_head_sample() {
        let err = validate_image_bytes(b"\x89PNG tiny").unwrap_err();
        assert!(err.reason.contains("below the 100 byte minimum"));
        assert_eq!(err.head_hex, hex::encode(b"\x89PNG tiny"));
    }

    #[test]
    fn unknown_signature_is_rejected_even_when_large() {
        let zeros = vec![0u8; 4096];
        let err = validate_image_bytes(&zeros).unwrap_err();
        assert!(err.reason.contains("signature"));
        assert_eq!(err.head_hex, "0".repeat(HEAD_SAMPLE_BYTES * 2));
    }

    #[test]
    fn corrupt_body_behind_valid_signature_is_rejected() {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend(std::iter::repeat(0xAB).take(200));
        let err = decode_image_bytes(&bytes).unwrap_err();
        assert!(err.reason.starts_with("PNG decode failed"));
    }

    #[test]
    fn decodes_each_supported_encoding() {
        let source = noise_image(32, 24);
        for (format, encoding) in [
            (ImageFormat::Png, ImageEncoding::Png),
            (ImageFormat::Jpeg, ImageEncoding::Jpeg),
            (ImageFormat::Gif, ImageEncoding::Gif),
        ] {
            let bytes = encoded(&source, format);
            let resolved = decode_image_bytes(&bytes).unwrap();
            assert_eq!(resolved.encoding(), encoding);
            assert_eq!((resolved.width(), resolved.height()), (32, 24));
        }
    }

    #[test]
    fn quarter_turns_swap_dimensions_and_four_restore_them() {
        let resolved = decode_image_bytes(&png_bytes(40, 10)).unwrap();

        let once = resolved.rotated(Rotation::Clockwise90);
        assert_eq!((once.width(), once.height()), (10, 40));
        let half = resolved.rotated(Rotation::Clockwise180);
        assert_eq!((half.width(), half.height()), (40, 10));

        let mut spun = resolved.clone();
        for _ in 0..4 {
            spun = spun.rotated(Rotation::Clockwise90);
        }
        assert_eq!((spun.width(), spun.height()), (40, 10));
        assert_eq!(spun, resolved);
    }

    #[test]
    fn rotation_parses_only_quarter_turns() {
        for degrees in Rotation::DEGREES {
            assert_eq!(
                Rotation::from_degrees(degrees).map(Rotation::degrees),
                Some(degrees)
            );
        }
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::from_degrees(360), None);
    }

    #[test]
    fn png_export_round_trips_pixels() -> Result<()> {
        let resolved = decode_image_bytes(&png_bytes(16, 16)).unwrap();
        let rotated = resolved.rotated(Rotation::Clockwise270);
        let bytes = rotated.to_png_bytes()?;
        let back = decode_image_bytes(&bytes).unwrap();
        assert_eq!(back.encoding(), ImageEncoding::Png);
        assert_eq!(back.image().to_rgba8(), rotated.image().to_rgba8());
        Ok(())
    }

    #[test]
    fn source_rotation_is_relative_to_upload() -> Result<()> {
        let mut source = SourceImage::from_bytes(&png_bytes(20, 8))?;
        source.set_rotation(Rotation::Clockwise90);
        source.set_rotation(Rotation::Clockwise90);
        let oriented = source.oriented();
        assert_eq!((oriented.width(), oriented.height()), (8, 20));
        Ok(())
    }

    #[test]
    fn load_source_image_reports_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_source_image(&temp.path().join("absent.png")).unwrap_err();
        assert!(format!("{err:#}").contains("failed reading"));
    }
}
