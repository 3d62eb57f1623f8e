//! Shared handles for job processing.

use std::sync::Arc;

use vedit_firestore::FirestoreClient;
use vedit_media::FfmpegRunner;
use vedit_storage::S3Client;

use crate::adapters::{FfmpegCodec, FirestoreMetadataStore};
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::ports::{BlobStore, Codec, MetadataStore};

/// Handles passed to every job. Built once in `main` (or by a test) and
/// shared across concurrent jobs; jobs keep no other shared state.
#[derive(Clone)]
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn MetadataStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub codec: Arc<dyn Codec>,
}

impl ProcessingContext {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            config,
            store,
            blobs,
            codec,
        }
    }

    /// Connect the production adapters from environment configuration.
    pub async fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let storage = S3Client::from_env().await?;
        let firestore = FirestoreClient::from_env().await?;
        let runner = FfmpegRunner::new().with_timeout(config.job_timeout.as_secs());

        Ok(Self::new(
            config,
            Arc::new(FirestoreMetadataStore::new(firestore)),
            Arc::new(storage),
            Arc::new(FfmpegCodec::new(runner)),
        ))
    }
}
