use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

// Base64 image data paired with its declared media type
#[derive(Clone, Debug, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }
}

// Trait defining the interface for hosted multimodal models
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier requests are addressed to.
    fn model_name(&self) -> &str;

    // Returns the generated text for one prompt + image pair.
    async fn generate(&self, prompt: &str, image: &InlineImage) -> Result<String>;
}

// --- Gemini Provider Implementation ---

#[derive(Serialize, Debug)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize, Debug)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

// Finish reasons that still carry usable text
const TEXT_FINISH_REASONS: &[&str] = &["STOP", "MAX_TOKENS", "FINISH_REASON_UNSPECIFIED"];

/// Pulls the answer out of a `generateContent` body: the text of every part
/// of the first candidate, concatenated.
fn extract_text(body: &str) -> Result<String> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).context("Failed to parse generateContent response")?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(anyhow::anyhow!("Model returned no candidates: {}", reason));
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if !TEXT_FINISH_REASONS.contains(&reason) {
            return Err(anyhow::anyhow!("Candidate was blocked: {}", reason));
        }
    }

    let text: String = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect();
    Ok(text)
}

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.api_key.clone(), config.model.clone(), config.api_base.clone())
    }

    fn request_url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, self.model)
    }
}

#[async_trait]
impl GenerativeModel for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, image: &InlineImage) -> Result<String> {
        log::info!(
            "Sending generateContent request for model {} ({}, {} base64 bytes)",
            self.model,
            image.mime_type,
            image.data.len()
        );

        let request_body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text { text: prompt },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: &image.mime_type,
                            data: &image.data,
                        },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(self.request_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .context("Failed to send generateContent request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read generateContent response body")?;

        if !status.is_success() {
            log::error!("generateContent failed with status {}: {}", status, body);
            return Err(anyhow::anyhow!("API request failed with status {}: {}", status, body));
        }

        extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_image_is_standard_base64() {
        let image = InlineImage::from_bytes(b"\x89PNG", "image/png");
        assert_eq!(image.data, "iVBORw==");
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn request_uses_gemini_wire_names() {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text { text: "What is this?" },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: "AAAA",
                        },
                    },
                ],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [{
                    "parts": [
                        {"text": "What is this?"},
                        {"inline_data": {"mime_type": "image/png", "data": "AAAA"}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn extracts_and_joins_candidate_parts() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "A red "}, {"text": "square."}], "role": "model"},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        assert_eq!(extract_text(body).unwrap(), "A red square.");
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = extract_text(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn blocked_candidate_is_an_error() {
        let body = r#"{"candidates": [{"finishReason": "RECITATION"}]}"#;
        assert!(extract_text(body).is_err());
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(extract_text("<html>oops</html>").is_err());
    }

    #[test]
    fn url_targets_model() {
        let provider = GeminiProvider::new("k", "gemini-1.5-flash", "http://localhost:1/");
        assert_eq!(
            provider.request_url(),
            "http://localhost:1/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(provider.model_name(), "gemini-1.5-flash");
    }
}
