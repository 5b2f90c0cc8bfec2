use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::types::{
    ImageSynthesizer, SynthesisError, SynthesisRequest, SynthesizedImage, DEFAULT_RESULT_MIME_TYPE,
};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    InlineData {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: GeminiInlineData,
    },
    Text {
        text: String,
    },
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    #[serde(default, alias = "mime_type")]
    mime_type: String,
    data: String,
}

/// Gemini `generateContent` client for reference-guided image synthesis.
#[derive(Debug, Clone)]
pub struct GeminiImageClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    safety_profile: String,
}

impl GeminiImageClient {
    pub fn new(
        http: Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        safety_profile: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
            safety_profile: safety_profile.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            get_http_client().clone(),
            config.gemini_api_key.clone(),
            config.gemini_image_model.clone(),
            config.gemini_api_base_url.clone(),
            config.gemini_safety_settings.clone(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    async fn call_generate_content(&self, payload: &Value) -> Result<GeminiResponse, SynthesisError> {
        // Single attempt: failures are reported to the user, never retried here.
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status()
                );
                SynthesisError::Service(format!("Gemini request failed: {}", err_text))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = self.redact(&error_detail(&body));
            warn!("Gemini API error: status={}, detail={}", status, detail);
            return Err(SynthesisError::Service(format!(
                "Gemini request failed with status {}: {}",
                status, detail
            )));
        }

        let body = response.text().await.map_err(|err| {
            SynthesisError::Service(format!(
                "Failed to read Gemini response: {}",
                self.redact(&err.to_string())
            ))
        })?;
        let value = serde_json::from_str::<GeminiResponse>(&body).map_err(|err| {
            SynthesisError::Service(format!("Malformed Gemini response: {}", err))
        })?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = %self.model, response = %summarize_response(&value));
        }
        Ok(value)
    }
}

#[async_trait]
impl ImageSynthesizer for GeminiImageClient {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedImage, SynthesisError> {
        let payload = build_generation_payload(request, &self.safety_profile);
        if tracing::enabled!(tracing::Level::DEBUG) {
            let summary = summarize_request(request, &self.safety_profile);
            debug!(target: "llm.gemini", model = %self.model, request = %summary);
        }
        let metadata = json!({
            "images": request.images().count(),
            "aspectRatio": request.aspect_ratio.as_str(),
            "promptChars": request.prompt.chars().count(),
        });

        log_llm_timing("gemini", &self.model, "synthesize", Some(metadata), || async {
            let response = self.call_generate_content(&payload).await?;
            extract_first_image(response)
        })
        .await
    }
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using permissive defaults.",
                profile
            );
            "OFF"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_CIVIC_INTEGRITY", "threshold": threshold }),
    ]
}

/// Parts go out as identity, outfit, optional product, then the prompt text.
fn build_generation_payload(request: &SynthesisRequest, safety_profile: &str) -> Value {
    let mut parts = request
        .images()
        .map(|image| {
            json!({
                "inlineData": {
                    "mimeType": image.mime_type(),
                    "data": image.to_base64()
                }
            })
        })
        .collect::<Vec<_>>();
    parts.push(json!({ "text": request.prompt }));

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": { "aspectRatio": request.aspect_ratio.as_str() }
        },
        "safetySettings": build_safety_settings(safety_profile),
    })
}

fn is_image_inline_data(inline_data: &GeminiInlineData) -> bool {
    let mime = inline_data.mime_type.trim();
    !inline_data.data.is_empty() && (mime.is_empty() || mime.starts_with("image/"))
}

/// Takes the first inline image of the first candidate; all other parts are discarded.
fn extract_first_image(response: GeminiResponse) -> Result<SynthesizedImage, SynthesisError> {
    let parts = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts)
        .unwrap_or_default();

    for part in parts {
        if let GeminiPart::InlineData { inline_data } = part {
            if !is_image_inline_data(&inline_data) {
                continue;
            }
            let bytes = general_purpose::STANDARD
                .decode(inline_data.data.trim())
                .map_err(|err| {
                    SynthesisError::Service(format!("Gemini returned undecodable image data: {err}"))
                })?;
            let mime_type = if inline_data.mime_type.trim().is_empty() {
                DEFAULT_RESULT_MIME_TYPE.to_string()
            } else {
                inline_data.mime_type
            };
            return Ok(SynthesizedImage::new(bytes, mime_type));
        }
    }

    Err(SynthesisError::EmptyResult)
}

const PROMPT_LOG_CHARS: usize = 200;
const ERROR_BODY_LOG_CHARS: usize = 2000;

fn log_preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

/// Mirrors `build_generation_payload` with image sizes in place of base64 data.
fn summarize_request(request: &SynthesisRequest, safety_profile: &str) -> Value {
    let images = request
        .images()
        .map(|image| json!({ "mimeType": image.mime_type(), "bytes": image.bytes().len() }))
        .collect::<Vec<_>>();
    json!({
        "images": images,
        "aspectRatio": request.aspect_ratio.as_str(),
        "safety": safety_profile,
        "prompt": log_preview(&request.prompt, PROMPT_LOG_CHARS),
    })
}

fn summarize_response(response: &GeminiResponse) -> Value {
    let candidates = response.candidates.as_deref().unwrap_or_default();
    let parts = candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref()?.parts.as_deref())
        .flatten();
    let image_parts = parts
        .clone()
        .filter(|part| {
            matches!(part, GeminiPart::InlineData { inline_data } if is_image_inline_data(inline_data))
        })
        .count();
    let text = parts
        .filter_map(|part| match part {
            GeminiPart::Text { text } => Some(text.trim()),
            _ => None,
        })
        .find(|text| !text.is_empty())
        .map(|text| log_preview(text, PROMPT_LOG_CHARS));

    json!({
        "candidates": candidates.len(),
        "imageParts": image_parts,
        "text": text,
    })
}

/// The service's `error.message`, else the raw body clipped for logging.
fn error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    serde_json::from_str::<GeminiErrorBody>(trimmed)
        .ok()
        .and_then(|body| body.error)
        .and_then(|error| error.message)
        .unwrap_or_else(|| log_preview(trimmed, ERROR_BODY_LOG_CHARS))
}
