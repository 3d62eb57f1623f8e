//! Render job queue on Redis Streams.
//!
//! Producers append to the job stream after claiming the job's idempotency
//! key. Workers read through a consumer group and settle every
//! [`Delivery`] with [`JobQueue::ack`] or [`JobQueue::dead_letter`].
//! Deliveries left pending by a crashed worker are taken over with
//! `XAUTOCLAIM` once they have been idle long enough.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;

/// How long an idempotency key blocks re-enqueueing the same render.
const DEDUP_TTL_SECS: u64 = 3600;
/// Retry counters expire after a day.
const RETRY_TTL_SECS: i64 = 86400;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    /// Stream holding pending render jobs
    pub stream_name: String,
    pub consumer_group: String,
    /// Stream receiving jobs that will not be retried
    pub dlq_stream_name: String,
    /// Deliveries of a transiently failing job before it is dead-lettered
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vedit:renders".to_string(),
            consumer_group: "vedit:workers".to_string(),
            dlq_stream_name: "vedit:dlq".to_string(),
            max_retries: 3,
        }
    }
}

impl QueueConfig {
    /// Read overrides from the environment, keeping defaults for the rest.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            stream_name: env_or("QUEUE_STREAM", defaults.stream_name),
            consumer_group: env_or("QUEUE_CONSUMER_GROUP", defaults.consumer_group),
            dlq_stream_name: env_or("QUEUE_DLQ_STREAM", defaults.dlq_stream_name),
            max_retries: env_parsed("QUEUE_MAX_RETRIES").unwrap_or(defaults.max_retries),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

/// A job read from the stream, together with the entry id that settles it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: String,
    pub job: QueueJob,
}

/// Job queue client.
#[derive(Clone)]
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Create the consumer group, and the stream with it, unless present.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.config.stream_name, &self.config.consumer_group, "$")
            .await;

        match created {
            Ok(()) => info!(group = %self.config.consumer_group, "Created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(group = %self.config.consumer_group, "Consumer group exists");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Append a job to the stream and return its entry id.
    ///
    /// Fails with [`QueueError::Duplicate`] while an earlier enqueue of the
    /// same render still holds the idempotency key.
    pub async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let payload = serde_json::to_string(&job)?;
        let idempotency_key = job.idempotency_key();
        let guard = dedup_key(&idempotency_key);
        let mut conn = self.conn().await?;

        // SET NX: of two racing producers only one gets past this point.
        let claimed: Option<String> = redis::cmd("SET")
            .arg(&guard)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        if claimed.is_none() {
            warn!(key = %idempotency_key, "Rejected duplicate job");
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let appended: redis::RedisResult<String> = conn
            .xadd(
                &self.config.stream_name,
                "*",
                &[("job", payload.as_str()), ("key", idempotency_key.as_str())],
            )
            .await;

        match appended {
            Ok(message_id) => {
                info!(job_id = job.job_id(), message_id = %message_id, "Enqueued job");
                Ok(message_id)
            }
            Err(e) => {
                // Give the key back so the producer can try again.
                let _: redis::RedisResult<()> = conn.del(&guard).await;
                Err(QueueError::Append(e))
            }
        }
    }

    /// Release a job's idempotency key so the render can be queued again.
    pub async fn clear_dedup(&self, job: &QueueJob) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(dedup_key(&job.idempotency_key())).await?;
        Ok(())
    }

    /// Settle a delivery that finished.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        self.push_settle(&mut pipe, message_id);
        pipe.query_async::<()>(&mut self.conn().await?).await?;

        debug!(message_id, "Acknowledged delivery");
        Ok(())
    }

    /// Copy a delivery to the dead letter stream and settle it.
    pub async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> QueueResult<()> {
        let payload = serde_json::to_string(&delivery.job)?;
        self.dead_letter_raw(&delivery.message_id, &payload, reason)
            .await?;
        warn!(job_id = delivery.job.job_id(), reason, "Moved job to DLQ");
        Ok(())
    }

    async fn dead_letter_raw(&self, message_id: &str, payload: &str, reason: &str) -> QueueResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic().xadd(
            &self.config.dlq_stream_name,
            "*",
            &[("job", payload), ("error", reason), ("original_id", message_id)],
        );
        self.push_settle(&mut pipe, message_id);
        pipe.query_async::<()>(&mut self.conn().await?).await?;
        Ok(())
    }

    /// XACK + XDEL the entry and drop its retry counter.
    fn push_settle(&self, pipe: &mut redis::Pipeline, message_id: &str) {
        pipe.xack(
            &self.config.stream_name,
            &self.config.consumer_group,
            &[message_id],
        )
        .xdel(&self.config.stream_name, &[message_id])
        .del(retry_key(message_id));
    }

    /// Entries still in the job stream, delivered or not.
    pub async fn backlog(&self) -> QueueResult<u64> {
        let len: u64 = self.conn().await?.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    pub async fn dead_letter_count(&self) -> QueueResult<u64> {
        let len: u64 = self.conn().await?.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Read up to `count` never-delivered jobs, blocking up to `block_ms`.
    ///
    /// Entries whose payload does not decode are dead-lettered and skipped.
    pub async fn read_new(
        &self,
        consumer: &str,
        block_ms: usize,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let options = StreamReadOptions::default()
            .group(&self.config.consumer_group, consumer)
            .count(count)
            .block(block_ms);

        let reply: Option<StreamReadReply> = self
            .conn()
            .await?
            .xread_options(&[&self.config.stream_name], &[">"], &options)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();
        self.decode_deliveries(entries).await
    }

    /// Take over deliveries that another consumer left idle for `min_idle`.
    pub async fn reclaim_idle(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn().await?)
            .await?;

        let deliveries = self.decode_deliveries(reply.claimed).await?;
        for d in &deliveries {
            info!(job_id = d.job.job_id(), message_id = %d.message_id, "Reclaimed idle delivery");
        }
        Ok(deliveries)
    }

    async fn decode_deliveries(&self, entries: Vec<StreamId>) -> QueueResult<Vec<Delivery>> {
        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in entries {
            match decode_entry(&entry.map) {
                Ok(job) => deliveries.push(Delivery {
                    message_id: entry.id,
                    job,
                }),
                Err(QueueError::MalformedPayload(reason)) => {
                    warn!(message_id = %entry.id, "Dead-lettering malformed entry: {}", reason);
                    let raw = payload_text(&entry.map).unwrap_or_default();
                    if let Err(e) = self.dead_letter_raw(&entry.id, &raw, &reason).await {
                        warn!(message_id = %entry.id, "Failed to dead-letter entry: {}", e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(deliveries)
    }

    /// Failed deliveries recorded so far for an entry.
    pub async fn retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let count: Option<u32> = self.conn().await?.get(retry_key(message_id)).await?;
        Ok(count.unwrap_or(0))
    }

    /// Record one more failed delivery and return the new count.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let key = retry_key(message_id);
        let (count,): (u32,) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .expire(&key, RETRY_TTL_SECS)
            .ignore()
            .query_async(&mut self.conn().await?)
            .await?;
        Ok(count)
    }

    pub async fn ping(&self) -> QueueResult<()> {
        redis::cmd("PING")
            .query_async::<()>(&mut self.conn().await?)
            .await?;
        Ok(())
    }
}

fn dedup_key(idempotency_key: &str) -> String {
    format!("vedit:dedup:{}", idempotency_key)
}

fn retry_key(message_id: &str) -> String {
    format!("vedit:retry:{}", message_id)
}

fn payload_text(map: &HashMap<String, redis::Value>) -> Option<String> {
    match map.get("job")? {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn decode_entry(map: &HashMap<String, redis::Value>) -> QueueResult<QueueJob> {
    let payload = payload_text(map)
        .ok_or_else(|| QueueError::MalformedPayload("no job field".to_string()))?;
    QueueJob::from_payload(&payload).map_err(|e| QueueError::MalformedPayload(e.to_string()))
}
