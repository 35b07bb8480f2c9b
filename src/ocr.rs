use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

// ── Constants ────────────────────────────────────────────────────────────────

const USER_AGENT: &str = "card-ocr-api/1.0";
const ERROR_BODY_EXCERPT: usize = 300;

pub const GOOGLE_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR request failed: {0}")]
    Request(String),
    #[error("OCR provider returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("OCR provider error: {0}")]
    Provider(String),
    #[error("OCR response could not be read: {0}")]
    MalformedResponse(String),
}

// ── Capability ───────────────────────────────────────────────────────────────

/// Turns decoded image bytes into recognized text.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError>;

    fn name(&self) -> &str;
}

/// Recognizes nothing. Used when no provider is configured so the endpoint
/// still answers with a well-formed, empty card.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderOcr;

#[async_trait]
impl OcrProvider for PlaceholderOcr {
    async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}

// ── Google Cloud Vision ──────────────────────────────────────────────────────

pub struct GoogleVisionOcr {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    language_hints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    full_text_annotation: Option<FullTextAnnotation>,
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    error: Option<ProviderStatus>,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ProviderStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl GoogleVisionOcr {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        language_hints: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, OcrError> {
        let client = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| OcrError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            language_hints,
        })
    }

    fn request_body(&self, image: &[u8]) -> serde_json::Value {
        let mut request = json!({
            "image": { "content": STANDARD.encode(image) },
            "features": [{ "type": "TEXT_DETECTION" }],
        });
        if !self.language_hints.is_empty() {
            request["imageContext"] = json!({ "languageHints": self.language_hints });
        }
        json!({ "requests": [request] })
    }
}

#[async_trait]
impl OcrProvider for GoogleVisionOcr {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OcrError::Request(format!("TimeoutError: {}", e.without_url()))
                } else if e.is_connect() {
                    OcrError::Request(format!("ConnectError: {}", e.without_url()))
                } else {
                    OcrError::Request(format!("RequestError: {}", e.without_url()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Upstream {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| OcrError::MalformedResponse(e.without_url().to_string()))?;

        let Some(first) = parsed.responses.into_iter().next() else {
            return Ok(String::new());
        };

        if let Some(err) = first.error {
            if err.code != 0 || !err.message.is_empty() {
                let message = if err.message.is_empty() {
                    format!("status code {}", err.code)
                } else {
                    err.message
                };
                return Err(OcrError::Provider(message));
            }
        }

        let text = first
            .full_text_annotation
            .map(|a| a.text)
            .filter(|t| !t.is_empty())
            .or_else(|| first.text_annotations.into_iter().next().map(|a| a.description))
            .unwrap_or_default();

        Ok(text)
    }

    fn name(&self) -> &str {
        "google-vision"
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
