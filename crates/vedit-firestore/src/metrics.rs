//! Firestore request metrics.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::error::{FirestoreError, FirestoreResult};

pub const REQUESTS_TOTAL: &str = "vedit_firestore_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "vedit_firestore_request_duration_seconds";
pub const RETRIES_TOTAL: &str = "vedit_firestore_retries_total";
pub const DOCUMENTS_READ_TOTAL: &str = "vedit_firestore_documents_read_total";

/// `outcome` label: `ok`, the HTTP status, or the failure class.
pub fn outcome<T>(result: &FirestoreResult<T>) -> String {
    let err = match result {
        Ok(_) => return "ok".to_string(),
        Err(e) => e,
    };
    if let Some(status) = err.status() {
        return status.to_string();
    }
    match err {
        FirestoreError::Credentials(_) => "credentials",
        FirestoreError::Decode(_) | FirestoreError::Json(_) => "decode",
        FirestoreError::Contended { .. } => "contended",
        FirestoreError::InvalidTransition(_) => "invalid_transition",
        _ => "transport",
    }
    .to_string()
}

pub fn record_request(operation: &'static str, outcome: String, elapsed: Duration) {
    counter!(REQUESTS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "operation" => operation).record(elapsed.as_secs_f64());
}

pub fn record_retry(operation: &'static str) {
    counter!(RETRIES_TOTAL, "operation" => operation).increment(1);
}

pub fn record_documents_read(operation: &'static str, count: usize) {
    counter!(DOCUMENTS_READ_TOTAL, "operation" => operation).increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome(&Ok(())), "ok");
        assert_eq!(
            outcome::<()>(&Err(FirestoreError::from_status(503, "down"))),
            "503"
        );
        assert_eq!(
            outcome::<()>(&Err(FirestoreError::decode("truncated body"))),
            "decode"
        );
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("get_document", "ok".to_string(), Duration::from_millis(12));
        record_retry("get_document");
        record_documents_read("batch_get_documents", 3);
    }
}
