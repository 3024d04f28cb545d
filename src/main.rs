use cicd_failure_predictor::{
    api::{build_router, AppState},
    config::{Config, ObservabilityConfig},
    ml::Predictor,
    notifications::NotificationService,
};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cicd-failure-predictor")]
#[command(about = "CI/CD pipeline failure prediction service", version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config/local.toml")]
    config: String,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration; a bad override must not silently reset the others
    let mut config = Config::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_tracing(&config.observability);

    tracing::info!(
        "Starting CI/CD Failure Predictor v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load model artifacts
    let predictor = Arc::new(Predictor::load(&config.model));
    if !predictor.is_ready() {
        tracing::warn!("⚠️  ML processor not available, prediction endpoints will return 500");
    }

    // Initialize notification service
    let notifications = Arc::new(NotificationService::new(
        config.notifications.clone(),
        &config.logging,
    ));
    tracing::info!(
        threshold = config.notifications.threshold,
        "✅ Notification service initialized"
    );

    let app_state = AppState::new(predictor, notifications, config.server.clone());
    let app = build_router(app_state);

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("🚀 HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   File prediction: http://{}/predict-file", http_addr);
    tracing::info!("   Form prediction: http://{}/predict-form", http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "cicd_failure_predictor={level},tower_http={level}",
            level = observability.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
