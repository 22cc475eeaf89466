//! Content-based format detection and WebP encoding

use std::path::Path;
use crate::config::{ConversionConfig, InputFormat};
use crate::error::{Result, FastConvertError};

/// Detect the input format from the file's magic bytes, ignoring its name
pub fn sniff_format(data: &[u8], path: &Path) -> Result<InputFormat> {
    let kind = infer::get(data).ok_or_else(|| FastConvertError::decode(
        "Unrecognized image content",
        Some(path.to_path_buf()),
    ))?;

    InputFormat::from_mime_type(kind.mime_type()).ok_or_else(|| FastConvertError::decode(
        format!("Unsupported image format: {}", kind.mime_type()),
        Some(path.to_path_buf()),
    ))
}

/// Sniff and decode an image, restricted to the configured input formats
pub fn decode_image(
    data: &[u8],
    path: &Path,
    config: &ConversionConfig,
) -> Result<image::DynamicImage> {
    let format = sniff_format(data, path)?;

    if !config.accepts(format) {
        return Err(FastConvertError::decode(
            format!("Unsupported image format: {}", format.mime_type()),
            Some(path.to_path_buf()),
        ));
    }

    image::load_from_memory_with_format(data, format.into())
        .map_err(|e| FastConvertError::decode(
            format!("Failed to decode image: {}", e),
            Some(path.to_path_buf()),
        ))
}

/// Encode a pixel buffer as lossy WebP
pub fn encode_webp(image: &image::DynamicImage, quality: f32, path: &Path) -> Result<Vec<u8>> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    let encoded = webp::Encoder::from_rgba(rgba.as_raw(), width, height)
        .encode_simple(false, quality)
        .map_err(|e| FastConvertError::encode(
            format!("WebP encoder rejected {}x{} image: {:?}", width, height, e),
            Some(path.to_path_buf()),
        ))?;

    Ok(encoded.to_vec())
}
