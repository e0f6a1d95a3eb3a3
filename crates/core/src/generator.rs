//! Interleaved text and image generation through the Gemini REST API.

use crate::page::{DEFAULT_IMAGE_MIME_TYPE, Image, PageFragment};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request to generation service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation service returned no content")]
    Empty,
    #[error("generation operation failed: {0}")]
    Operation(String),
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Produces the ordered text and image fragments a page is assembled from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_interleaved(
        &self,
        prompt: &str,
        aspect_ratio: &str,
    ) -> Result<Vec<PageFragment>, GenerationError>;
}

/// HTTP client for the Gemini generation endpoints.
#[derive(Clone)]
pub struct GeminiClient {
    pub(crate) http: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) image_model: String,
    pub(crate) video_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, image_model: String, video_model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: GEMINI_API_BASE.to_string(),
            image_model,
            video_model,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sends a request with the API key attached and maps non-success
    /// statuses to [`GenerationError::Status`].
    pub(crate) async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GenerationError> {
        let response = request.header("x-goog-api-key", &self.api_key).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[derive(Deserialize, Debug, Default)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

/// Flattens the first candidate into fragments, skipping thinking parts.
fn parse_fragments(
    response: GenerateContentResponse,
) -> Result<Vec<PageFragment>, GenerationError> {
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .ok_or(GenerationError::Empty)?;

    let mut fragments = Vec::with_capacity(parts.len());
    for part in parts.into_iter().filter(|p| !p.thought) {
        if let Some(text) = part.text {
            fragments.push(PageFragment::Text(text));
        } else if let Some(inline) = part.inline_data {
            let data = base64::engine::general_purpose::STANDARD.decode(inline.data)?;
            fragments.push(PageFragment::Image(Image {
                data,
                mime_type: inline
                    .mime_type
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_IMAGE_MIME_TYPE.to_string()),
            }));
        }
    }
    Ok(fragments)
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate_interleaved(
        &self,
        prompt: &str,
        aspect_ratio: &str,
    ) -> Result<Vec<PageFragment>, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.image_model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": { "aspectRatio": aspect_ratio },
            },
        });

        debug!(model = %self.image_model, "Requesting interleaved generation");
        let response: GenerateContentResponse =
            self.send(self.http.post(url).json(&body)).await?.json().await?;
        let fragments = parse_fragments(response)?;
        info!(fragments = fragments.len(), "Interleaved generation complete");
        Ok(fragments)
    }
}
