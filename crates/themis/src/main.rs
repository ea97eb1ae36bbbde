//! Themis - Grading Worker for Agon
//!
//! Reads grading jobs as JSON lines on stdin, grades each one in an isolated
//! Python worker, and writes one JSON reply line per job to stdout. Logs go
//! to stderr.

use anyhow::Result;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use themis::config::Config;
use themis::consumer::JobConsumer;
use themis::grading::Grader;
use themis::metrics::{self, MetricsServer};
use themis::sandbox::PythonSandbox;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "themis=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!("Starting Themis Grading Worker");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!(
        python = %config.sandbox.python_bin,
        timeout_secs = config.sandbox.timeout.as_secs_f64(),
        memory_limit_bytes = config.sandbox.memory_limit_bytes,
        max_workers = config.sandbox.max_workers,
        "Sandbox configured"
    );

    metrics::init_metrics();

    // Start metrics server
    if let Some(port) = config.metrics_port {
        tokio::spawn(async move {
            if let Err(e) = MetricsServer::run(port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    }

    let sandbox = PythonSandbox::new(config.sandbox.clone());
    let grader = Grader::new(sandbox, config.sandbox.denylist.clone());
    let consumer = JobConsumer::new(grader);

    tracing::info!("Themis ready, reading jobs from stdin");

    let stdin = BufReader::new(tokio::io::stdin());
    let (jobs, _) = consumer
        .run(stdin, tokio::io::stdout(), shutdown_signal())
        .await?;

    tracing::info!(jobs, "Themis shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
