//! Image encoding: page PNG file → base64 payload for the API request body.
//!
//! The Gemini API accepts images as base64 `inline_data` embedded in the
//! JSON request. Pages are rendered as PNG because it is lossless — text
//! crispness matters far more than file size for layout-transcription
//! accuracy, and JPEG artefacts on rendered text measurably degrade the
//! model's output.

use crate::error::ConvertError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// Read a rendered page PNG and return its base64 encoding.
pub async fn encode_page_base64(path: &Path) -> Result<String, ConvertError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ConvertError::io(path, e))?;
    let b64 = STANDARD.encode(&bytes);
    debug!(file = %path.display(), bytes = b64.len(), "Encoded page image");
    Ok(b64)
}
