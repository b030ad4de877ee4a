//! Image validation and normalization.
//!
//! Every catalog image is decoded, flattened to RGB, downscaled to the
//! policy's maximum edge, and re-encoded as JPEG at a fixed quality. The
//! output is deterministic for identical input, which keeps repeated
//! ingestions of the same archive byte-stable.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::debug;

use crate::error::ProcessError;
use crate::policy::UploadPolicy;
use crate::security::SecurityValidator;

/// A normalized, storable image payload.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Slugified source stem with a `.jpg` extension.
    pub filename: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub struct ImageNormalizer {
    policy: UploadPolicy,
}

impl ImageNormalizer {
    pub fn new(policy: UploadPolicy) -> Self {
        Self { policy }
    }

    /// Decodes, normalizes, and re-encodes one image file.
    ///
    /// Non-image or corrupt files, and outputs over the size ceiling, are
    /// recoverable errors — the caller skips the image and continues.
    pub fn process(&self, path: &Path) -> Result<ProcessedImage, ProcessError> {
        let bytes = std::fs::read(path).map_err(|e| ProcessError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let img = image::load_from_memory(&bytes).map_err(|e| ProcessError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let max_edge = self.policy.image_max_edge;
        let img = if img.width() > max_edge || img.height() > max_edge {
            debug!(
                "Downscaling {}x{} image to fit {}px",
                img.width(),
                img.height(),
                max_edge
            );
            img.resize(max_edge, max_edge, FilterType::Lanczos3)
        } else {
            img
        };

        // Flatten paletted/alpha modes to an opaque RGB model.
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut out = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut out, self.policy.jpeg_quality);
        rgb.write_with_encoder(encoder)
            .map_err(|e| ProcessError::Encode {
                reason: e.to_string(),
            })?;
        let encoded = out.into_inner();

        let filename = normalized_filename(path);

        if encoded.len() as u64 > self.policy.max_image_bytes {
            return Err(ProcessError::TooLarge {
                filename,
                bytes: encoded.len() as u64,
                limit: self.policy.max_image_bytes,
            });
        }

        Ok(ProcessedImage {
            filename,
            bytes: encoded,
            width,
            height,
        })
    }
}

fn normalized_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let slug = SecurityValidator::slugify(stem);
    if slug.is_empty() {
        "image.jpg".to_string()
    } else {
        format!("{}.jpg", slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_oversized_image_downscaled_preserving_aspect() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(tmp.path(), "wide.png", 3840, 1920);

        let normalizer = ImageNormalizer::new(UploadPolicy::default());
        let processed = normalizer.process(&path).unwrap();

        assert_eq!(processed.width, 1920);
        assert_eq!(processed.height, 960);
    }

    #[test]
    fn test_small_image_keeps_dimensions() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(tmp.path(), "small.png", 640, 480);

        let normalizer = ImageNormalizer::new(UploadPolicy::default());
        let processed = normalizer.process(&path).unwrap();

        assert_eq!(processed.width, 640);
        assert_eq!(processed.height, 480);
    }

    #[test]
    fn test_output_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(tmp.path(), "stable.png", 800, 600);

        let normalizer = ImageNormalizer::new(UploadPolicy::default());
        let first = normalizer.process(&path).unwrap();
        let second = normalizer.process(&path).unwrap();

        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn test_filename_slugified_to_jpg() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(tmp.path(), "Main Photo (1).png", 32, 32);

        let normalizer = ImageNormalizer::new(UploadPolicy::default());
        let processed = normalizer.process(&path).unwrap();

        assert_eq!(processed.filename, "main-photo-1.jpg");
    }

    #[test]
    fn test_corrupt_image_is_recoverable_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let normalizer = ImageNormalizer::new(UploadPolicy::default());
        assert!(matches!(
            normalizer.process(&path),
            Err(ProcessError::Decode { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_recoverable_error() {
        let normalizer = ImageNormalizer::new(UploadPolicy::default());
        assert!(matches!(
            normalizer.process(Path::new("/nonexistent/x.jpg")),
            Err(ProcessError::Read { .. })
        ));
    }
}
