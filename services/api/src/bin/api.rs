//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OllamaAmountAdapter, SystemClock},
    config::Config,
    error::ApiError,
    scanner::DueDateScanner,
    web::{
        broadcast::NotificationBroadcaster,
        health_handler, list_invoices_handler, list_notifications_handler,
        mark_notification_read_handler, mark_paid_handler,
        rest::ApiDoc,
        state::AppState,
        upload_invoice_handler, ws_handler,
    },
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use invoice_core::notify::NotificationEngine;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| ApiError::Internal(format!("Invalid DATABASE_URL: {}", e)))?
        .create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let clock = Arc::new(SystemClock::new(config.utc_offset));
    let amount_estimator = Arc::new(OllamaAmountAdapter::new(
        reqwest::Client::new(),
        config.ollama_base_url.clone(),
        config.amount_model.clone(),
    ));
    let broadcaster = Arc::new(NotificationBroadcaster::new());
    let engine = NotificationEngine::new(db_adapter.clone());

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store: db_adapter.clone(),
        clock: clock.clone(),
        amount_estimator,
        engine,
        broadcaster: broadcaster.clone(),
        config: config.clone(),
    });

    // --- 5. Start the Daily Due-Date Scanner ---
    let scanner = Arc::new(DueDateScanner::new(
        db_adapter,
        clock,
        broadcaster,
        config.scan_time,
        config.utc_offset,
        config.scan_invoice_timeout,
    ));
    let scanner_handle = scanner.start();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let api_router = Router::new()
        .route("/health", get(health_handler))
        .route("/invoices", post(upload_invoice_handler).get(list_invoices_handler))
        .route("/invoices/{id}/pay", post(mark_paid_handler))
        .route("/notifications", get(list_notifications_handler))
        .route("/notifications/{id}/read", post(mark_notification_read_handler))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Stop the scanner last so an in-flight scan finishes its transaction.
    scanner.shutdown();
    let _ = scanner_handle.await;

    Ok(())
}
