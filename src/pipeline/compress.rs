//! Result compression
//!
//! Every result coming back from the image service is re-encoded as JPEG at
//! its native size before it may enter history. History is mirrored into a
//! size-limited store, and services tend to answer with large PNGs.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

use crate::codec::data_url;
use crate::error::{Result, SessionError};
use crate::state::locator::{Locator, LocatorRegistry};

/// Quality used when the caller has no preference
pub const DEFAULT_QUALITY: f32 = 0.9;

/// MIME type of every compressed result
pub const OUTPUT_MIME: &str = "image/jpeg";

/// Map a 0.0-1.0 quality factor onto the JPEG encoder's 1-100 scale
pub fn jpeg_quality(quality: f32) -> u8 {
    if quality.is_nan() {
        return jpeg_quality(DEFAULT_QUALITY);
    }
    ((quality.clamp(0.0, 1.0) * 100.0).round() as u8).max(1)
}

/// Re-encode a decoded image as 3-channel JPEG
pub fn compress_image(img: &DynamicImage, quality: f32) -> Result<Vec<u8>> {
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(SessionError::Surface { width, height });
    }

    let mut buffer = Cursor::new(Vec::new());
    img.to_rgb8()
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(quality)))
        .map_err(|e| SessionError::ImageEncode(e.to_string()))?;

    Ok(buffer.into_inner())
}

/// Decode arbitrary image bytes and re-encode them as JPEG
pub fn compress_bytes(bytes: &[u8], quality: f32) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).map_err(|e| SessionError::ImageDecode(e.to_string()))?;
    let jpeg = compress_image(&img, quality)?;
    debug!(
        "compressed {}x{}: {} -> {} bytes",
        img.width(),
        img.height(),
        bytes.len(),
        jpeg.len()
    );
    Ok(jpeg)
}

/// Compress the image behind `source` and return a self-contained locator
///
/// Decoding runs on the blocking pool. The returned locator is a data URL,
/// so it can be persisted and needs no release.
pub async fn compress_locator(registry: &LocatorRegistry, source: &Locator, quality: f32) -> Result<Locator> {
    let blob = registry.resolve(source)?;

    let jpeg = tokio::task::spawn_blocking(move || compress_bytes(&blob.bytes, quality))
        .await
        .map_err(|e| SessionError::Task(e.to_string()))??;

    Ok(Locator::from_data_url(data_url::encode(OUTPUT_MIME, &jpeg)))
}

/// Compress a batch in order, failing on the first error
pub async fn compress_all(registry: &LocatorRegistry, sources: &[Locator], quality: f32) -> Result<Vec<Locator>> {
    let mut compressed = Vec::with_capacity(sources.len());
    for source in sources {
        compressed.push(compress_locator(registry, source, quality).await?);
    }
    Ok(compressed)
}
