use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// --- Request types ---

// One piece of multi-part content: either plain text or inline binary data.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// An inline JPEG payload, base64-encoded.
    pub fn inline_jpeg(data: impl Into<String>) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/jpeg".to_string(),
                data: data.into(),
            },
        }
    }
}

#[derive(Serialize, Debug)]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
}

#[derive(Serialize, Debug)]
pub struct Content {
    pub parts: Vec<Part>,
}

// --- Response types ---

// Every level is optional: a structurally incomplete body is not an error,
// the caller substitutes a fixed fallback instead.
#[derive(Deserialize, Debug, Default)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
pub struct CandidatePart {
    pub text: Option<String>,
}

impl GenerateResponse {
    /// The first candidate's first text part, if the response carries one.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(|content| content.parts.first())
            .and_then(|part| part.text.as_deref())
    }
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("provider returned {status}")]
    Api {
        status: StatusCode,
        message: Option<String>,
    },
    /// The request never completed or the body could not be decoded.
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

// Trait defining the interface to the generative-AI provider.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    async fn generate_content(&self, parts: Vec<Part>) -> Result<GenerateResponse, ProviderError>;
}

// --- Gemini implementation ---

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Result<Self, anyhow::Error> {
        if api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key is required");
        }

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
        })
    }
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    async fn generate_content(&self, parts: Vec<Part>) -> Result<GenerateResponse, ProviderError> {
        let url = format!("{}/{}:generateContent", GEMINI_ENDPOINT, self.model);
        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        log::info!("Sending generateContent request using model: {}", self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&error_body)
                .ok()
                .and_then(|body| body.error)
                .map(|detail| detail.message);
            log::error!("Gemini request failed with status {}", status);
            return Err(ProviderError::Api { status, message });
        }

        Ok(response.json::<GenerateResponse>().await?)
    }
}
