// Ticketing API Server
// Entry point for the auth and log REST API

mod config;
mod cookies;
mod error;
mod handlers;
mod middleware;
mod response;
mod routes;

use anyhow::Context;
use config::Config;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use ticketing_auth::{
    AppUrls, AuthService, EmailComposer, EmailQueue, EmailQueueConfig, EmailTemplates,
    SmtpConfig, SmtpMailer, TemplateConfig,
};
use ticketing_cache::Cache;
use ticketing_database::{Database, PgAuthRepository, PgLogRepository};
use ticketing_logging::{LogPipelineConfig, LogService, LogSink};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

pub struct AppState {
    pub auth: AuthService,
    pub logs: LogService,
    pub log_sink: LogSink,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ticketing_api=debug,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    init_tracing();

    tracing::info!("Starting Ticketing API Server");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    tracing::info!(environment = %config.environment, address = %config.bind_address(), "Configuration loaded");

    // Initialize database
    let database = Database::new(config.database.clone())
        .await
        .context("Failed to connect to database")?;
    database.ping().await.context("Database ping failed")?;
    tracing::info!("Database connected");

    // Initialize cache
    let cache = Cache::new(config.cache.clone())
        .await
        .context("Failed to connect to Redis")?;
    cache.ping().await.context("Redis ping failed")?;
    tracing::info!("Redis connected");

    // Log pipeline
    let logs = LogService::start(
        Arc::new(PgLogRepository::new(database.pool().clone())),
        LogPipelineConfig::from_env(),
    );
    tracing::info!("Log pipeline started");

    // Email queue
    let mailer = SmtpMailer::new(SmtpConfig::from_env()).context("Failed to configure SMTP")?;
    let composer = EmailComposer::new(
        EmailTemplates::load(&TemplateConfig::from_env()),
        AppUrls::from_env(),
    );
    let email = EmailQueue::start(
        EmailQueueConfig::from_env(),
        Arc::new(mailer),
        Arc::new(composer),
        Some(logs.sink()),
    );

    // Auth service
    let auth = AuthService::new(
        Arc::new(PgAuthRepository::new(database.pool().clone())),
        Arc::new(cache),
        email.clone(),
    );
    tracing::info!("Auth service initialized");

    let state = Arc::new(AppState {
        auth,
        log_sink: logs.sink(),
        logs,
    });

    let app = routes::create_router(state.clone()).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address()))?;
    tracing::info!("Server ready at http://{}", config.bind_address());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server stopped accepting connections, cleaning up");

    email.shutdown().await;
    state.logs.shutdown().await;
    database.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
