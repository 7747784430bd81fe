//! Data URL encoding for binary images
//!
//! Archives are plain JSON text, so every image travels as
//! `data:<mime>;base64,<payload>`.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::error::{Result, SessionError};

/// Encode bytes as a base64 data URL
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64_STANDARD.encode(bytes))
}

/// Decode a base64 data URL into `(mime, bytes)`
///
/// The header must name a MIME type of the form `type/subtype`; anything else
/// is rejected before the payload is touched.
pub fn decode(url: &str) -> Result<(String, Vec<u8>)> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| invalid(url, "missing ',' separator"))?;

    let header = header
        .strip_prefix("data:")
        .ok_or_else(|| invalid(url, "missing 'data:' prefix"))?;

    let (mime, encoding) = header
        .split_once(';')
        .ok_or_else(|| invalid(url, "missing MIME type"))?;

    if !is_mime(mime) {
        return Err(invalid(url, "unrecognizable MIME type"));
    }

    // Parameters such as charset may precede the encoding marker
    if !encoding.split(';').any(|param| param == "base64") {
        return Err(invalid(url, "payload is not base64"));
    }

    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| invalid(url, &e.to_string()))?;

    Ok((mime.to_string(), bytes))
}

fn is_mime(mime: &str) -> bool {
    match mime.split_once('/') {
        Some((kind, subtype)) => !kind.is_empty() && !subtype.is_empty() && !mime.contains(char::is_whitespace),
        None => false,
    }
}

fn invalid(url: &str, reason: &str) -> SessionError {
    let head: String = url.chars().take(32).collect();
    SessionError::InvalidDataUrl(format!("{} ({})", reason, head))
}
