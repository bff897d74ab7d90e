//! Inbound image payload decoding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::AppError;

/// Decode a base64 image, stripping a data-URI prefix (`data:...;base64,`) when present.
///
/// With a prefix, the segment between the first comma and the next one is the payload.
/// ASCII whitespace inside the payload (MIME line wrapping) is ignored.
pub fn decode_image(image: &str) -> Result<Vec<u8>, AppError> {
    let payload = match image.split_once(',') {
        Some((_, rest)) => rest.split(',').next().unwrap_or(rest),
        None => image,
    };
    let payload: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(BASE64.decode(payload)?)
}
