//! Axum Handlers for the REST API
//!
//! Health check, on-demand page generation and image-to-video animation.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use encyclopedia_core::{
    page::Image,
    prompts::{self, DEFAULT_FOCUS},
    tools,
    video::{self, VIDEO_MAX_WAIT, VIDEO_MIME_TYPE, VIDEO_POLL_INTERVAL, VideoOutcome},
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    models::{
        ErrorResponse, GenerateRequest, HealthResponse, PageResponse, VideoRequest, VideoResponse,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    GatewayTimeout(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::GatewayTimeout(message) => {
                (StatusCode::GATEWAY_TIMEOUT, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(format!("{:#}", err))),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Generate an illustrated encyclopedia page.
///
/// When `session_id` is given the page is also pushed to that session's
/// content viewers.
#[utoipa::path(
    post,
    path = "/api/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Page generated", body = PageResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Generation failed", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(topic = %payload.topic))]
pub async fn generate_page(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<PageResponse>, ApiError> {
    let topic = payload.topic.trim();
    if topic.is_empty() {
        return Err(ApiError::BadRequest("topic must not be empty".to_string()));
    }
    let focus = payload
        .focus
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_FOCUS);

    let page = tools::generate_page(state.generator.as_ref(), topic, focus).await?;
    let response = PageResponse::from(&page);

    if let Some(session_id) = payload.session_id.filter(|id| !id.is_empty()) {
        let delivered = state.content_store.publish(&session_id, page);
        info!(%session_id, delivered, "Published generated page.");
    }

    Ok(Json(response))
}

/// Animate a page illustration into a short video clip.
#[utoipa::path(
    post,
    path = "/api/generate-video",
    request_body = VideoRequest,
    responses(
        (status = 200, description = "Video generated", body = VideoResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Generation failed or produced no video", body = ErrorResponse),
        (status = 504, description = "Generation did not finish in time", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(topic = %payload.topic))]
pub async fn generate_video(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VideoRequest>,
) -> Result<Json<VideoResponse>, ApiError> {
    let data = base64::engine::general_purpose::STANDARD
        .decode(payload.image_data.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("image_data is not valid base64: {}", e)))?;
    let image = Image {
        data,
        mime_type: payload.mime_type,
    };

    let prompt = prompts::animation_prompt(&payload.topic);
    let operation = state.video.start_video(&prompt, &image).await?;
    let outcome = video::wait_for_video(
        state.video.as_ref(),
        &operation,
        VIDEO_POLL_INTERVAL,
        VIDEO_MAX_WAIT,
    )
    .await?;

    match outcome {
        VideoOutcome::Ready(bytes) => {
            info!(bytes = bytes.len(), "Video generated.");
            Ok(Json(VideoResponse {
                status: "success".to_string(),
                video_data: base64::engine::general_purpose::STANDARD.encode(bytes),
                video_mime_type: VIDEO_MIME_TYPE.to_string(),
            }))
        }
        VideoOutcome::TimedOut => Err(ApiError::GatewayTimeout(
            "Video generation timed out".to_string(),
        )),
        VideoOutcome::NoVideo => Err(ApiError::InternalServerError(anyhow::anyhow!(
            "No video was generated"
        ))),
    }
}
