use crate::error::CompletionError;
use crate::types::{GenerationConfig, ModelId, PromptSegments};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// One blocking completion call. No retries.
pub trait CompletionService: Send + Sync {
    fn complete(
        &self,
        model: ModelId,
        generation: &GenerationConfig,
        prompt: &PromptSegments,
    ) -> Result<String, CompletionError>;
}

/// Completion client chosen once at startup.
pub enum CompletionClient {
    Gemini(GeminiBackend),
    /// No credential: every call fails fast without touching the network.
    Unavailable,
}

impl CompletionClient {
    pub fn from_credential(api_key: Option<&str>, endpoint: &str) -> Self {
        let Some(key) = api_key else {
            return CompletionClient::Unavailable;
        };
        match GeminiBackend::new(key, endpoint) {
            Ok(b) => CompletionClient::Gemini(b),
            Err(e) => {
                warn!("completion client init failed, AI disabled: {}", e);
                CompletionClient::Unavailable
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, CompletionClient::Gemini(_))
    }
}

impl CompletionService for CompletionClient {
    fn complete(
        &self,
        model: ModelId,
        generation: &GenerationConfig,
        prompt: &PromptSegments,
    ) -> Result<String, CompletionError> {
        match self {
            CompletionClient::Gemini(b) => b.generate(model, generation, prompt),
            CompletionClient::Unavailable => Err(CompletionError::Unavailable),
        }
    }
}

/* =========================
   Wire types
   ========================= */

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Default)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

fn build_request<'a>(generation: &GenerationConfig, prompt: &'a PromptSegments) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: prompt.as_array().into_iter().map(|text| Part { text }).collect(),
        }],
        generation_config: WireGenerationConfig {
            temperature: generation.temperature,
            top_p: generation.top_p,
            top_k: generation.top_k,
            max_output_tokens: generation.max_output_tokens,
            response_mime_type: "text/plain",
        },
    }
}

/// Text of the first candidate, parts joined, trimmed.
fn response_text(body: GenerateResponse) -> String {
    body.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn classify_status(status: u16, message: String, timeout_secs: u64) -> CompletionError {
    match status {
        401 | 403 => CompletionError::PermissionDenied(message),
        408 | 504 => CompletionError::DeadlineExceeded { timeout_secs },
        _ => CompletionError::Transport(format!("HTTP {}: {}", status, message)),
    }
}

fn classify_transport(e: reqwest::Error, timeout_secs: u64) -> CompletionError {
    if e.is_timeout() {
        CompletionError::DeadlineExceeded { timeout_secs }
    } else {
        CompletionError::Transport(e.to_string())
    }
}

/* =========================
   HTTP backend
   ========================= */

pub struct GeminiBackend {
    client: HttpClient,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: &str, base_url: &str) -> reqwest::Result<Self> {
        // per-request timeout comes from GenerationConfig
        let client = HttpClient::builder().timeout(None::<Duration>).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn generate(
        &self,
        model: ModelId,
        generation: &GenerationConfig,
        prompt: &PromptSegments,
    ) -> Result<String, CompletionError> {
        let timeout_secs = generation.timeout_secs;
        let url = format!("{}/models/{}:generateContent", self.base_url, model.as_str());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| CompletionError::PermissionDenied("credential is not a valid header value".into()))?;
        headers.insert("x-goog-api-key", key);

        info!("sending request to model {}", model);
        let response = self
            .client
            .post(url)
            .headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .json(&build_request(generation, prompt))
            .send()
            .map_err(|e| classify_transport(e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .map(|b| b.error.message)
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("model {} answered {}: {}", model, status, message);
            return Err(classify_status(status.as_u16(), message, timeout_secs));
        }

        let body: GenerateResponse = response
            .json()
            .map_err(|e| classify_transport(e, timeout_secs))?;
        let text = response_text(body);
        if text.is_empty() {
            warn!("model {} returned an empty response", model);
            return Err(CompletionError::EmptyResponse);
        }

        info!("response received ({} chars)", text.chars().count());
        Ok(text)
    }
}
