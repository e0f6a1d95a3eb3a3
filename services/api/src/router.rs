//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the WebSocket endpoints, the static frontend and
//! the OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ErrorResponse, GenerateRequest, HealthResponse, ImageBody, PageResponse, SectionBody,
        VideoRequest, VideoResponse,
    },
    state::AppState,
    ws::{content_ws_handler, voice_ws_handler},
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::generate_page,
        handlers::generate_video,
    ),
    components(
        schemas(HealthResponse, GenerateRequest, PageResponse, SectionBody, ImageBody, VideoRequest, VideoResponse, ErrorResponse)
    ),
    tags(
        (name = "Encyclopedia API", description = "Illustrated page and video generation for the voice encyclopedia")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let frontend_dir = app_state.config.frontend_dir.clone();

    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/generate", post(handlers::generate_page))
        .route("/api/generate-video", post(handlers::generate_video))
        .route("/ws/voice/{session_id}", get(voice_ws_handler))
        .route("/ws/content/{session_id}", get(content_ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .route_service("/", ServeFile::new(frontend_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(frontend_dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_rest_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/generate"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/generate-video"));
    }
}
