//! Main Entrypoint for the Encyclopedia API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the session registry, content store and Gemini clients.
//! 3. Wiring the live agent with the encyclopedia page tool.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use encyclopedia_api::{config::Config, router::create_router, state::AppState};
use encyclopedia_core::{
    content_store::ContentStore,
    generator::GeminiClient,
    live::{GeminiLiveAgent, LiveAgentConfig},
    prompts,
    session::InMemorySessionService,
    tools::EncyclopediaPageTool,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");
    gemini_realtime::install_crypto_provider();

    // --- 3. Initialize Shared Services ---
    let gemini = Arc::new(GeminiClient::new(
        config.google_api_key.clone(),
        config.image_model.clone(),
        config.video_model.clone(),
    ));
    let content_store = Arc::new(ContentStore::new());

    let sessions = Arc::new(InMemorySessionService::new(config.max_sessions));
    let _sweeper = sessions.spawn_eviction_sweeper(config.session_idle_timeout);

    let page_tool = Arc::new(EncyclopediaPageTool::new(
        gemini.clone(),
        content_store.clone(),
    ));
    let agent = Arc::new(
        GeminiLiveAgent::new(LiveAgentConfig {
            api_key: config.google_api_key.clone(),
            model: config.live_model.clone(),
            system_instruction: prompts::system_instruction(),
        })
        .with_tool(page_tool),
    );

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        sessions,
        agent,
        content_store,
        generator: gemini.clone(),
        video: gemini,
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        live_model = %config.live_model,
        image_model = %config.image_model,
        video_model = %config.video_model,
        frontend_dir = %config.frontend_dir.display(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
