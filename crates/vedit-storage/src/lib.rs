//! S3-compatible blob storage client.
//!
//! This crate provides:
//! - File upload/download against S3, R2 or MinIO
//! - Mapping between object keys and their public URLs
//! - Key layout for uploads, trimmed clips and renders

pub mod client;
pub mod error;
pub mod keys;

pub use client::{S3Client, StorageConfig};
pub use error::{ObjectOp, StorageError, StorageResult};
pub use keys::{render_key, sanitize_filename, trimmed_key, upload_key, UrlMapper};
