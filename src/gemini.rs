//! Google Gemini `generateContent` REST client.
//!
//! The service delegates all PDF content understanding to Gemini's vision
//! API: each rendered page is sent as an inline base64 PNG together with the
//! analysis prompt, and the model replies with the page's block structure.
//!
//! ## Retry strategy
//!
//! HTTP 429/5xx responses and transport failures are transient and frequent
//! under the free-tier quota. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) avoids hammering a recovering
//! endpoint: with the 500 ms default and 3 retries the wait sequence is
//! 500 ms → 1 s → 2 s. Other 4xx responses (bad key, malformed request) are
//! never retried — they will not get better.

use crate::config::ServiceConfig;
use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Minimal client for `models/{model}:generateContent`.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl GeminiClient {
    /// Build a client from the service configuration.
    ///
    /// Fails with [`ConvertError::ApiKeyMissing`] when no key is configured —
    /// callers check this *before* accepting a normal-mode upload so the user
    /// learns about the misconfiguration at upload time, not minutes into a
    /// background job.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConvertError> {
        let api_key = config
            .gemini_api_key
            .clone()
            .ok_or(ConvertError::ApiKeyMissing)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ConvertError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: config.gemini_model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    /// Override the API base URL (self-hosted proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The configured model id.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `prompt` plus one inline PNG and return the model's text reply.
    ///
    /// Retries transient failures; returns the concatenated text of the
    /// first candidate on success.
    pub async fn generate_from_image(
        &self,
        prompt: &str,
        png_base64: &str,
    ) -> Result<String, ConvertError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: prompt.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png".into(),
                            data: png_base64.to_string(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let mut last_err = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(attempt, max = self.max_retries, backoff_ms = backoff, "Retrying Gemini call");
                sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self.http.post(&url).json(&request).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                last_err = format!("HTTP {status}");
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ConvertError::GeminiApi {
                    status: status.as_u16(),
                    message: truncate(&body, 500),
                });
            }

            let reply: GenerateResponse = response
                .json()
                .await
                .map_err(|e| ConvertError::Internal(format!("Gemini response parse: {e}")))?;

            if let Some(error) = reply.error {
                return Err(ConvertError::GeminiApi {
                    status: error.code.unwrap_or(200),
                    message: error.message,
                });
            }

            let text = reply
                .candidates
                .and_then(|c| c.into_iter().next())
                .map(|c| {
                    c.content
                        .parts
                        .into_iter()
                        .filter_map(|p| p.text)
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();

            if text.is_empty() {
                return Err(ConvertError::GeminiApi {
                    status: status.as_u16(),
                    message: "Gemini returned no candidates".into(),
                });
            }

            debug!(chars = text.len(), "Gemini reply received");
            return Ok(text);
        }

        Err(ConvertError::GeminiTransport {
            retries: self.max_retries,
            detail: last_err,
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<u16>,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(key: Option<&str>) -> ServiceConfig {
        let mut builder = ServiceConfig::builder();
        if let Some(key) = key {
            builder = builder.gemini_api_key(key);
        }
        builder.build().unwrap()
    }

    #[test]
    fn missing_key_is_rejected_at_construction() {
        let err = GeminiClient::from_config(&test_config(None)).unwrap_err();
        assert!(matches!(err, ConvertError::ApiKeyMissing));
    }

    #[test]
    fn request_serializes_to_gemini_wire_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "p".into() },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png".into(),
                            data: "QUJD".into(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 8192,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "p");
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn response_parses_candidate_text() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "{\"replace_all\": true"}, {"text": ", \"blocks\": []}"}]}}
            ]
        }"#;
        let reply: GenerateResponse = serde_json::from_str(body).unwrap();
        let text: String = reply
            .candidates
            .unwrap()
            .remove(0)
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        assert_eq!(text, r#"{"replace_all": true, "blocks": []}"#);
    }

    #[test]
    fn response_parses_api_error() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid"}}"#;
        let reply: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(reply.error.unwrap().message, "API key not valid");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "あいうえお";
        let t = truncate(s, 4);
        assert!(t.starts_with('あ'));
        assert!(t.ends_with('…'));
    }
}
