//! Firestore REST API client.
//!
//! Repositories for the `videos`, `trims` and `renders` collections sit on
//! top of a small REST client that authenticates with a service account (or
//! talks to the emulator) and retries transient failures.

pub mod client;
pub mod error;
pub mod metrics;
pub mod repos;
pub mod retry;
mod token_cache;
pub mod types;


pub use client::{FirestoreClient, FirestoreConfig, Precondition};
pub use error::{FirestoreError, FirestoreResult};
pub use repos::{RenderRepository, SubtitleRepository, TrimRepository, VideoRepository};
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
