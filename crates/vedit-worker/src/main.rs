//! Render worker binary.
//!
//! Environment: `LOG_FORMAT=json` for structured logs, `METRICS_PORT` to
//! serve Prometheus metrics, plus the queue, storage and Firestore settings
//! read by the individual `from_env` constructors.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vedit_queue::{JobQueue, ProgressChannel};
use vedit_worker::{JobExecutor, ProcessingContext, WorkerConfig};

/// Crates whose logs default to `info` when `RUST_LOG` names nothing finer.
const LOG_TARGETS: [&str; 5] = [
    "vedit_worker",
    "vedit_queue",
    "vedit_firestore",
    "vedit_storage",
    "vedit_media",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // reqwest and the S3 SDK both need a process-wide rustls provider.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("rustls crypto provider already installed"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;
    install_metrics()?;

    let config = WorkerConfig::from_env();
    info!(?config, "starting vedit-worker");

    let queue = JobQueue::from_env().context("queue configuration")?;
    let progress = ProgressChannel::new(&queue.config().redis_url).context("progress channel")?;
    let ctx = ProcessingContext::from_env(config)
        .await
        .context("connecting storage and metadata backends")?;

    let executor = Arc::new(JobExecutor::new(ctx, queue, progress));

    tokio::spawn({
        let executor = Arc::clone(&executor);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                executor.shutdown();
            }
        }
    });

    executor.run().await.context("executor stopped")?;
    info!("worker stopped");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        filter = filter.add_directive(format!("{}=info", target).parse()?);
    }

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
    Ok(())
}

fn install_metrics() -> anyhow::Result<()> {
    let port = match std::env::var("METRICS_PORT") {
        Ok(port) if !port.is_empty() => port,
        _ => return Ok(()),
    };
    let port: u16 = port
        .parse()
        .with_context(|| format!("METRICS_PORT={:?} is not a port", port))?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus exporter")?;
    info!(%addr, "serving metrics");
    Ok(())
}
