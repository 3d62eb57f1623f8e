//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vedit_queue::{Delivery, JobQueue, ProgressChannel, QueueJob};

use crate::adapters::RedisJobHandle;
use crate::config::WorkerConfig;
use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics::{self, JobOutcome};
use crate::render_job::{fail_render, process_render_job};

/// Handles shared by every spawned job task.
#[derive(Clone)]
struct JobDeps {
    ctx: Arc<ProcessingContext>,
    queue: Arc<JobQueue>,
    progress: ProgressChannel,
    job_timeout: Duration,
}

/// Job executor that processes render jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    deps: JobDeps,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(ctx: ProcessingContext, queue: JobQueue, progress: ProgressChannel) -> Self {
        let config = ctx.config.clone();
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            deps: JobDeps {
                ctx: Arc::new(ctx),
                queue: Arc::new(queue),
                progress,
                job_timeout: config.job_timeout,
            },
            config,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`shutdown`](Self::shutdown) is signalled, then drain
    /// in-flight jobs for at most the shutdown timeout.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Starting job executor"
        );

        self.deps.queue.init().await?;

        let claim_task = self.spawn_claim_task();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.in_flight(),
                "Shutdown timeout elapsed with jobs still running"
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically claim deliveries abandoned by crashed workers.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let deps = self.deps.clone();
        let consumer_name = self.consumer_name.clone();
        let semaphore = Arc::clone(&self.job_semaphore);
        let interval = self.config.claim_interval;
        let min_idle = self.config.reclaim_idle_after();
        let max_jobs = self.config.max_concurrent_jobs;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let available = semaphore.available_permits();
                        if available == 0 {
                            continue;
                        }
                        match deps.queue.reclaim_idle(&consumer_name, min_idle, available).await {
                            Ok(deliveries) if !deliveries.is_empty() => {
                                info!("Reclaimed {} idle deliveries", deliveries.len());
                                metrics::record_claimed(deliveries.len());
                                for delivery in deliveries {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let deps = deps.clone();
                                    let semaphore = Arc::clone(&semaphore);
                                    tokio::spawn(async move {
                                        Self::execute_job(deps, delivery).await;
                                        drop(permit);
                                        metrics::set_in_flight(max_jobs.saturating_sub(semaphore.available_permits()));
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to reclaim idle deliveries: {}", e);
                            }
                        }
                    }
                }
            }
        })
    }

    /// Read new deliveries up to the number of free job slots.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .deps
            .queue
            .read_new(&self.consumer_name, 1000, available.min(5))
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Read {} new deliveries", deliveries.len());

        for delivery in deliveries {
            let Ok(permit) = Arc::clone(&self.job_semaphore).acquire_owned().await else {
                break;
            };
            let deps = self.deps.clone();
            let semaphore = Arc::clone(&self.job_semaphore);
            let max_jobs = self.config.max_concurrent_jobs;
            metrics::set_in_flight(self.in_flight());

            tokio::spawn(async move {
                Self::execute_job(deps, delivery).await;
                drop(permit);
                metrics::set_in_flight(max_jobs.saturating_sub(semaphore.available_permits()));
            });
        }

        Ok(())
    }

    /// Execute one delivery and settle it with the queue.
    async fn execute_job(deps: JobDeps, delivery: Delivery) {
        let job_id = delivery.job.job_id().to_string();
        let started = Instant::now();
        info!(job_id = %job_id, message_id = %delivery.message_id, "Executing job");

        let outcome = match Self::process_job(&deps, &delivery.job).await {
            Ok(()) => {
                info!(job_id = %job_id, "Job completed successfully");
                if let Err(e) = deps.queue.ack(&delivery.message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
                Self::clear_dedup(&deps.queue, &delivery.job).await;
                JobOutcome::Completed
            }
            Err(e) => {
                error!(job_id = %job_id, error_kind = e.kind().as_str(), "Job failed: {}", e);
                Self::settle_failure(&deps, &delivery, &e).await
            }
        };

        metrics::record_job(outcome, started.elapsed().as_secs_f64());
    }

    async fn settle_failure(deps: &JobDeps, delivery: &Delivery, error: &WorkerError) -> JobOutcome {
        let job_id = delivery.job.job_id();
        let max_retries = deps.queue.max_retries();

        let retry_count = if error.is_permanent() {
            0
        } else {
            match deps.queue.increment_retry(&delivery.message_id).await {
                Ok(count) => count,
                Err(e) => {
                    warn!("Failed to count retry for job {}: {}", job_id, e);
                    max_retries
                }
            }
        };

        let outcome = disposition(error, retry_count, max_retries);
        match outcome {
            JobOutcome::DeadLettered => {
                warn!(
                    job_id = %job_id,
                    permanent = error.is_permanent(),
                    retry_count,
                    "Moving job to DLQ"
                );
                if let Err(e) = deps.queue.dead_letter(delivery, &error.to_string()).await {
                    error!("Failed to move job {} to DLQ: {}", job_id, e);
                }
                Self::clear_dedup(&deps.queue, &delivery.job).await;
            }
            _ => {
                // Left pending; the claim task redelivers it once idle.
                info!(
                    "Job {} will be retried (attempt {}/{})",
                    job_id, retry_count, max_retries
                );
            }
        }
        outcome
    }

    async fn clear_dedup(queue: &JobQueue, job: &QueueJob) {
        if let Err(e) = queue.clear_dedup(job).await {
            warn!("Failed to clear dedup key for job {}: {}", job.job_id(), e);
        }
    }

    async fn process_job(deps: &JobDeps, job: &QueueJob) -> WorkerResult<()> {
        match job {
            QueueJob::Render(render) => {
                let handle = RedisJobHandle::new(deps.progress.clone(), job.job_id());
                let run = process_render_job(&deps.ctx, render, &handle);

                match tokio::time::timeout(deps.job_timeout, run).await {
                    Ok(result) => result.map(|_| ()),
                    Err(_) => {
                        // The pipeline was dropped mid-stage, so it never recorded the failure.
                        let error = WorkerError::Timeout(deps.job_timeout.as_secs());
                        if let Err(e) = fail_render(&deps.ctx, &render.render_id, &error).await {
                            warn!("Failed to mark render {} FAILED: {}", render.render_id, e);
                        }
                        Err(error)
                    }
                }
            }
        }
    }

    fn in_flight(&self) -> usize {
        self.config
            .max_concurrent_jobs
            .saturating_sub(self.job_semaphore.available_permits())
    }

    async fn wait_for_jobs(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Permanent failures skip retries entirely.
fn disposition(error: &WorkerError, retry_count: u32, max_retries: u32) -> JobOutcome {
    if error.is_permanent() || retry_count >= max_retries {
        JobOutcome::DeadLettered
    } else {
        JobOutcome::Retried
    }
}
