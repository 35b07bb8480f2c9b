use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

use crate::ocr::GOOGLE_VISION_ENDPOINT;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_INSTANCES: usize = 10;
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} is required when OCR_PROVIDER={1}")]
    Missing(&'static str, &'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrConfig {
    Placeholder,
    GoogleVision {
        api_key: String,
        endpoint: Url,
        language_hints: Vec<String>,
    },
}

/// Deployment settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_instances: usize,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub ocr: OcrConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = match get("BIND_ADDR") {
            Some(addr) => parse_var("BIND_ADDR", &addr)?,
            None => {
                let port = match get("PORT") {
                    Some(port) => parse_var::<u16>("PORT", &port)?,
                    None => DEFAULT_PORT,
                };
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        let max_instances = positive("MAX_INSTANCES", get("MAX_INSTANCES"), DEFAULT_MAX_INSTANCES)?;
        let max_body_bytes =
            positive("MAX_BODY_BYTES", get("MAX_BODY_BYTES"), DEFAULT_MAX_BODY_BYTES)?;
        let timeout_secs = positive(
            "REQUEST_TIMEOUT_SECS",
            get("REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS as usize,
        )?;

        let ocr = match get("OCR_PROVIDER").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("none") | Some("placeholder") => OcrConfig::Placeholder,
            Some("google-vision") => {
                let api_key = get("OCR_API_KEY")
                    .ok_or(ConfigError::Missing("OCR_API_KEY", "google-vision"))?;
                let endpoint_raw =
                    get("OCR_ENDPOINT").unwrap_or_else(|| GOOGLE_VISION_ENDPOINT.to_string());
                let endpoint = Url::parse(&endpoint_raw).map_err(|e| ConfigError::Invalid {
                    var: "OCR_ENDPOINT",
                    value: endpoint_raw.clone(),
                    reason: e.to_string(),
                })?;
                if !matches!(endpoint.scheme(), "http" | "https") {
                    return Err(ConfigError::Invalid {
                        var: "OCR_ENDPOINT",
                        value: endpoint_raw,
                        reason: "only http and https URLs are allowed".to_string(),
                    });
                }
                let language_hints = get("OCR_LANGUAGE_HINTS")
                    .map(|hints| {
                        hints
                            .split(',')
                            .map(str::trim)
                            .filter(|h| !h.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                OcrConfig::GoogleVision {
                    api_key,
                    endpoint,
                    language_hints,
                }
            }
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "OCR_PROVIDER",
                    value: other.to_string(),
                    reason: "expected one of: none, google-vision".to_string(),
                })
            }
        };

        Ok(Self {
            bind_addr,
            max_instances,
            max_body_bytes,
            request_timeout: Duration::from_secs(timeout_secs as u64),
            ocr,
        })
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn positive(var: &'static str, value: Option<String>, default: usize) -> Result<usize, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let n: usize = parse_var(var, &value)?;
    if n == 0 {
        return Err(ConfigError::Invalid {
            var,
            value,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(n)
}
