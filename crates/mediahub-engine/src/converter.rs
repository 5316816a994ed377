//! Component E — decode an original image and re-encode it as WebP.
//!
//! Quality policy mirrors the original converter exactly: PNG sources are
//! re-encoded at quality 100 (they're usually screenshots/graphics where
//! visible banding is unacceptable), everything else at 75.

use image::{DynamicImage, ImageFormat};
use webp::Encoder;

use crate::error::EngineError;

const PNG_QUALITY: f32 = 100.0;
const DEFAULT_QUALITY: f32 = 75.0;

fn format_for_ext(ext: &str) -> Result<ImageFormat, EngineError> {
    match ext.to_ascii_lowercase().as_str() {
        ".png" | "png" => Ok(ImageFormat::Png),
        ".jpg" | "jpg" | ".jpeg" | "jpeg" => Ok(ImageFormat::Jpeg),
        ".webp" | "webp" => Ok(ImageFormat::WebP),
        other => Err(EngineError::Permanent(format!("unsupported image extension: {other}"))),
    }
}

/// Quality to encode at, keyed off the source extension (spec §4.E).
pub fn quality_for_ext(ext: &str) -> f32 {
    if ext.trim_start_matches('.').eq_ignore_ascii_case("png") {
        PNG_QUALITY
    } else {
        DEFAULT_QUALITY
    }
}

/// Decodes `bytes` using the format implied by `ext`.
pub fn decode_by_ext(bytes: &[u8], ext: &str) -> Result<DynamicImage, EngineError> {
    let format = format_for_ext(ext)?;
    image::load_from_memory_with_format(bytes, format)
        .map_err(|err| EngineError::Permanent(format!("decode image: {err}")))
}

/// Encodes `img` as WebP at `quality` (0.0-100.0).
pub fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, EngineError> {
    let encoder = Encoder::from_image(img)
        .map_err(|err| EngineError::Permanent(format!("build webp encoder: {err}")))?;
    let encoded = encoder.encode(quality);
    Ok(encoded.to_vec())
}

/// Convenience wrapper: decode by extension, then encode WebP at the
/// extension's mandated quality.
pub fn convert_to_webp(bytes: &[u8], ext: &str) -> Result<Vec<u8>, EngineError> {
    let img = decode_by_ext(bytes, ext)?;
    encode_webp(&img, quality_for_ext(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_quality_is_one_hundred() {
        assert_eq!(quality_for_ext(".png"), 100.0);
        assert_eq!(quality_for_ext("PNG"), 100.0);
    }

    #[test]
    fn non_png_quality_is_seventy_five() {
        assert_eq!(quality_for_ext(".jpg"), 75.0);
        assert_eq!(quality_for_ext(".jpeg"), 75.0);
        assert_eq!(quality_for_ext(".webp"), 75.0);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = format_for_ext(".gif").unwrap_err();
        assert!(matches!(err, EngineError::Permanent(_)));
    }

    #[test]
    fn round_trips_a_tiny_generated_png() {
        let img = DynamicImage::new_rgba8(2, 2);
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png).expect("encode png");
        let decoded = decode_by_ext(&buf, ".png").expect("decode");
        let webp = encode_webp(&decoded, quality_for_ext(".png")).expect("encode webp");
        assert!(!webp.is_empty());
    }
}
