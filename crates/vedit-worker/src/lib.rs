//! Render worker and video edit services.
//!
//! [`JobExecutor`] pulls render jobs off the queue and runs
//! [`process_render_job`] for each, settling failures through retries or the
//! dead-letter stream. [`EditService`] holds the request-side operations
//! (register uploads, trim, subtitle, request a render). Both talk to the
//! outside world only through the traits in [`ports`].

pub mod adapters;
pub mod config;
pub mod context;
pub mod edit;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod ports;
pub mod progress;
pub mod render_job;
pub mod staging;

pub use adapters::{FfmpegCodec, FirestoreMetadataStore, RedisJobHandle};
pub use config::WorkerConfig;
pub use context::ProcessingContext;
pub use edit::EditService;
pub use error::{ErrorKind, WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use ports::{BlobStore, Codec, JobHandle, JobSink, MediaInfo, MetadataStore};
pub use progress::{ProgressReporter, ProgressTracker};
pub use render_job::{fail_render, process_render_job, RenderOutcome};
pub use staging::StagingArea;
