use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::Duration;

use crate::fields::{FieldError, FieldExtractor};
use crate::models::ExtractResponse;
use crate::ocr::{OcrError, OcrProvider};

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error(transparent)]
    Fields(#[from] FieldError),
    #[error("OCR extraction timed out after {0}s")]
    Timeout(u64),
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Decode → recognize → extract, bounded by `deadline`.
pub async fn extract_card(
    image_base64: &str,
    ocr: &dyn OcrProvider,
    extractor: &dyn FieldExtractor,
    deadline: Duration,
) -> Result<ExtractResponse, ExtractionError> {
    tokio::time::timeout(deadline, run(image_base64, ocr, extractor))
        .await
        .map_err(|_| ExtractionError::Timeout(deadline.as_secs()))?
}

async fn run(
    image_base64: &str,
    ocr: &dyn OcrProvider,
    extractor: &dyn FieldExtractor,
) -> Result<ExtractResponse, ExtractionError> {
    let image = decode_image(image_base64)?;
    tracing::debug!(bytes = image.len(), provider = ocr.name(), "image decoded");

    let text = ocr.recognize(&image).await?;
    let data = extractor.extract(&text)?;

    Ok(ExtractResponse { text, data })
}

// ── Payload decoding ─────────────────────────────────────────────────────────

/// Accepts bare base64 or a `data:<mime>;base64,` URL, with line wrapping.
pub fn decode_image(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = payload.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .unwrap_or(trimmed),
        None => trimmed,
    };
    let cleaned: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned)
}
