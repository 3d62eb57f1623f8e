//! Startup probe for worker containers.
//!
//! Verifies the scratch directory, the ffmpeg toolchain, and that Redis and
//! the bucket answer with the configured credentials. Set
//! `SELFCHECK_OFFLINE=1` to skip the network checks.

use std::path::Path;

use anyhow::Context;
use vedit_media::{check_ffmpeg, check_ffprobe};
use vedit_queue::JobQueue;
use vedit_storage::S3Client;
use vedit_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    check_scratch_dir(Path::new(&config.work_dir)).await?;
    report("work_dir", &config.work_dir);

    let ffmpeg = check_ffmpeg().context("ffmpeg")?;
    let ffprobe = check_ffprobe().context("ffprobe")?;
    report("ffmpeg", ffmpeg.display());
    report("ffprobe", ffprobe.display());

    if std::env::var("GCP_PROJECT_ID").or_else(|_| std::env::var("FIREBASE_PROJECT_ID")).is_err() {
        anyhow::bail!("neither GCP_PROJECT_ID nor FIREBASE_PROJECT_ID is set");
    }

    if std::env::var("SELFCHECK_OFFLINE").is_ok_and(|v| v == "1") {
        report("network", "skipped");
    } else {
        let queue = JobQueue::from_env().context("redis config")?;
        queue.ping().await.context("redis ping")?;
        report("redis", &queue.config().redis_url);

        let storage = S3Client::from_env().await.context("storage config")?;
        storage.check_connectivity().await.context("bucket access")?;
        report("bucket", storage.bucket());
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

/// Create the scratch root and make sure it is writable.
async fn check_scratch_dir(root: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("create {}", root.display()))?;
    let probe = root.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .with_context(|| format!("{} is not writable", root.display()))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn report(what: &str, value: impl std::fmt::Display) {
    println!("worker-selfcheck: {}={}", what, value);
}
