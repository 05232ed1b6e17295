//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Opens the embedded database (with startup retries)
//! - Starts the HTTP server with graceful shutdown support

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use byteurl::config::AppConfig;
use byteurl::database::{connect, RedbStore};
use byteurl::route::create_app;
use byteurl::state::AppState;

const DB_CONNECT_ATTEMPTS: u32 = 3;
const DB_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Application entry point
///
/// 1. Loads environment variables from the .env file
/// 2. Builds the configuration (see [`AppConfig::from_env`])
/// 3. Opens the embedded database
/// 4. Creates the application state and router
/// 5. Serves until SIGINT or SIGTERM
#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("byteurl=debug,tower_http=debug")),
        )
        .init();

    let config = AppConfig::from_env().expect("Invalid configuration");
    let port = config.port;
    let db_path = config.database_path.clone();

    let db = connect(&db_path, DB_CONNECT_ATTEMPTS, DB_RETRY_DELAY)
        .await
        .expect("Failed to initialize database");

    let state = AppState::new(config, Arc::new(RedbStore::new(db)));
    let app = create_app(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    tracing::info!(port, database = %db_path, "🚀 server running at http://localhost:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM
///
/// In-flight requests are allowed to finish and open write transactions
/// commit before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("🛑 shutdown signal received, stopping server");
}
