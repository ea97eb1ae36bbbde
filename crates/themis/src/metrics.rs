//! Prometheus metrics for Themis

use std::sync::{LazyLock, Once};

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Batch duration histogram
pub static BATCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        "grader_batch_duration_seconds",
        "Time spent grading one batch of testcases",
    )
    .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);

    Histogram::with_opts(opts).expect("Failed to create histogram")
});

/// Testcase outcomes by result
pub static OUTCOME_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("grader_testcase_outcome_total", "Testcase outcomes by result");
    IntCounterVec::new(opts, &["result"]).expect("Failed to create counter")
});

/// Batches graded
pub static BATCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("grader_batches_total", "Total grading batches run")
        .expect("Failed to create counter")
});

/// Snippets that hit the time budget
pub static SNIPPET_TIMEOUTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "grader_snippet_timeouts_total",
        "Snippets that exceeded the execution budget",
    )
    .expect("Failed to create counter")
});

/// Worker processes replaced after a timeout or crash
pub static WORKER_RESPAWNS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "grader_worker_respawns_total",
        "Sandbox workers replaced mid-session",
    )
    .expect("Failed to create counter")
});

/// Currently open sandbox sessions
pub static ACTIVE_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("grader_active_sessions", "Currently open sandbox sessions")
        .expect("Failed to create gauge")
});

static INIT: Once = Once::new();

/// Initialize and register all metrics. Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(BATCH_DURATION.clone()),
            Box::new(OUTCOME_TOTAL.clone()),
            Box::new(BATCHES_TOTAL.clone()),
            Box::new(SNIPPET_TIMEOUTS.clone()),
            Box::new(WORKER_RESPAWNS.clone()),
            Box::new(ACTIVE_SESSIONS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!("Failed to register metric: {}", e);
            }
        }
    });
}

/// Record one testcase outcome: `pass`, `fail` or `error`
pub fn record_outcome(result: &str) {
    OUTCOME_TOTAL.with_label_values(&[result]).inc();
}

/// HTTP server for Prometheus metrics endpoint
pub struct MetricsServer;

impl MetricsServer {
    /// Run the metrics server
    pub async fn run(port: u16) -> anyhow::Result<()> {
        use axum::{Router, routing::get};
        use std::net::SocketAddr;

        init_metrics();

        let app = Router::new()
            .route("/metrics", get(Self::metrics_handler))
            .route("/health", get(|| async { "OK" }));

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        tracing::info!("Metrics server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    async fn metrics_handler() -> String {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
