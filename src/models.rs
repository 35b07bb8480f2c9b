use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming body of `POST /ocrExtract`. Parsed loosely so that a missing,
/// `null` or non-string `image_base64` can be answered with our own 400.
#[derive(Debug, Default, Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub image_base64: Option<Value>,
}

impl ExtractRequest {
    /// Anything other than a JSON object parses to an empty request.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// The image payload, if present as a non-blank string.
    pub fn image(&self) -> Option<&str> {
        match &self.image_base64 {
            // Whitespace-only payloads count as missing, unlike a bare truthiness check.
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessType {
    Restaurant,
    Retail,
    Healthcare,
    Legal,
    #[serde(rename = "Real Estate")]
    RealEstate,
    Construction,
    Technology,
    Finance,
    Education,
    Automotive,
    Beauty,
    Consulting,
    #[default]
    Other,
}

/// Contact fields read off a business card. Every field may be empty.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub name: String,
    pub company: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub address: String,
    #[serde(rename = "businessType")]
    pub business_type: BusinessType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub text: String,
    pub data: ContactRecord,
}
