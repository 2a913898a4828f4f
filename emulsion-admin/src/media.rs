//! Media storage: upload validation and variant generation
//!
//! Uploaded bytes are sniffed by magic number before anything touches
//! disk; the client-provided extension and MIME type are never trusted.
//! Variants are resized renditions keyed by (image, size label, format).

use std::path::{Path, PathBuf};

use image::GenericImageView;
use serde::Serialize;

use emulsion_common::{Error, Result};

/// Accepted upload types, by sniffed MIME.
const ACCEPTED_MIME: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

/// Variant size labels and their bounding-box edge in pixels.
pub const VARIANT_SIZES: &[(&str, u32)] = &[("thumb", 320), ("medium", 1024), ("large", 2048)];

/// Formats a variant is encoded into.
pub const VARIANT_FORMATS: &[&str] = &["jpeg", "webp"];

/// Sniffed upload type: canonical MIME plus the extension used on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SniffedImage {
    pub mime: &'static str,
    pub extension: &'static str,
}

/// Identify an upload by magic number. Returns an error for anything that
/// is not an accepted image type, regardless of the original file name.
pub fn sniff_image(bytes: &[u8]) -> Result<SniffedImage> {
    let kind = infer::get(bytes)
        .ok_or_else(|| Error::InvalidInput("unrecognized file content".to_string()))?;

    for (mime, extension) in ACCEPTED_MIME {
        if kind.mime_type() == *mime {
            return Ok(SniffedImage { mime, extension });
        }
    }

    Err(Error::InvalidInput(format!(
        "unsupported upload type {}",
        kind.mime_type()
    )))
}

/// A generated rendition, ready to be recorded in `image_variants`.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedVariant {
    pub size: String,
    pub format: String,
    /// Path relative to the variants directory
    pub path: String,
    pub width: i64,
    pub height: i64,
    pub file_size: i64,
}

fn encode_format(format: &str) -> Result<image::ImageFormat> {
    match format {
        "jpeg" => Ok(image::ImageFormat::Jpeg),
        "webp" => Ok(image::ImageFormat::WebP),
        "png" => Ok(image::ImageFormat::Png),
        other => Err(Error::InvalidInput(format!("unknown variant format {other}"))),
    }
}

/// Generate every configured variant for an original file.
///
/// Blocking (image decode/encode); callers on the async runtime should
/// wrap this in `spawn_blocking`.
pub fn generate_variants(
    original: &Path,
    variants_dir: &Path,
    image_id: &str,
) -> Result<Vec<GeneratedVariant>> {
    let img = image::open(original)
        .map_err(|e| Error::InvalidInput(format!("cannot decode {}: {e}", original.display())))?;

    std::fs::create_dir_all(variants_dir)?;

    let mut generated = Vec::new();
    for (size_label, edge) in VARIANT_SIZES {
        let (orig_w, orig_h) = img.dimensions();
        // Never upscale
        let resized = if orig_w <= *edge && orig_h <= *edge {
            img.clone()
        } else {
            img.thumbnail(*edge, *edge)
        };

        for format in VARIANT_FORMATS {
            let file_name = format!("{image_id}-{size_label}.{format}");
            let out_path = variants_dir.join(&file_name);
            let fmt = encode_format(format)?;

            // JPEG cannot carry an alpha channel
            if fmt == image::ImageFormat::Jpeg {
                resized
                    .to_rgb8()
                    .save_with_format(&out_path, fmt)
                    .map_err(|e| Error::Internal(format!("variant encode failed: {e}")))?;
            } else {
                resized
                    .save_with_format(&out_path, fmt)
                    .map_err(|e| Error::Internal(format!("variant encode failed: {e}")))?;
            }

            let file_size = std::fs::metadata(&out_path)?.len() as i64;
            generated.push(GeneratedVariant {
                size: size_label.to_string(),
                format: format.to_string(),
                path: file_name,
                width: resized.width() as i64,
                height: resized.height() as i64,
                file_size,
            });
        }
    }

    Ok(generated)
}

/// Decode dimensions of an uploaded original.
pub fn read_dimensions(path: &Path) -> Result<(i64, i64)> {
    let img = image::open(path)
        .map_err(|e| Error::InvalidInput(format!("cannot decode {}: {e}", path.display())))?;
    let (w, h) = img.dimensions();
    Ok((w as i64, h as i64))
}

/// Location of an album's original files inside the media directory.
pub fn album_dir(media_dir: &Path, album_id: &str) -> PathBuf {
    media_dir.join(album_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal valid magic numbers
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn sniff_accepts_jpeg_and_png() {
        assert_eq!(sniff_image(JPEG_MAGIC).unwrap().mime, "image/jpeg");
        assert_eq!(sniff_image(PNG_MAGIC).unwrap().extension, "png");
    }

    #[test]
    fn sniff_rejects_non_images() {
        // A PDF header is recognized but not accepted
        let pdf = b"%PDF-1.4 something";
        assert!(sniff_image(pdf).is_err());

        // Plain text is not recognized at all
        assert!(sniff_image(b"hello world").is_err());
    }

    #[test]
    fn sniff_ignores_extension_spoofing() {
        // Content decides: these bytes are a PNG no matter what the
        // client called the file
        let sniffed = sniff_image(PNG_MAGIC).unwrap();
        assert_eq!(sniffed.mime, "image/png");
    }

    #[test]
    fn variants_generated_for_real_image() {
        let tmp = tempfile::tempdir().unwrap();
        let original = tmp.path().join("original.png");

        // 64x48 gradient
        let img = image::RgbImage::from_fn(64, 48, |x, y| image::Rgb([x as u8, y as u8, 0]));
        img.save(&original).unwrap();

        let variants_dir = tmp.path().join("variants");
        let generated = generate_variants(&original, &variants_dir, "img1").unwrap();

        // 3 sizes x 2 formats
        assert_eq!(generated.len(), VARIANT_SIZES.len() * VARIANT_FORMATS.len());
        for v in &generated {
            assert!(variants_dir.join(&v.path).is_file());
            // Source is smaller than every bounding box: no upscaling
            assert_eq!((v.width, v.height), (64, 48));
            assert!(v.file_size > 0);
        }
    }

    #[test]
    fn dimensions_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("img.png");
        image::RgbImage::new(10, 20).save(&path).unwrap();
        assert_eq!(read_dimensions(&path).unwrap(), (10, 20));
    }
}
