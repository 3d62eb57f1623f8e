//! Firestore REST client.
//!
//! Every call goes through one attempt closure that [`with_retry`] re-runs
//! on transient failures, inside a `firestore_request` span and with request
//! metrics recorded once per call. A 401 reporting an expired token is
//! answered by refreshing the token and resending within the same attempt.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics;
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::{TokenCache, EMULATOR_TOKEN};
use crate::types::{
    BatchGetDocumentsRequest, BatchGetDocumentsResponse, Document, RunQueryRequest,
    RunQueryResponse, StructuredQuery, Value,
};

/// Documents per batchGet call.
const BATCH_GET_LIMIT: usize = 100;
/// Response bytes quoted in error messages.
const BODY_EXCERPT: usize = 200;

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Usually `(default)`
    pub database_id: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
    /// `host:port` of a Firestore emulator; disables service-account auth
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    /// Project from `GCP_PROJECT_ID`, falling back to `FIREBASE_PROJECT_ID`.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = ["GCP_PROJECT_ID", "FIREBASE_PROJECT_ID"]
            .into_iter()
            .find_map(|name| std::env::var(name).ok())
            .ok_or_else(|| {
                FirestoreError::Credentials(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set".to_string(),
                )
            })?;
        if project_id.is_empty() {
            return Err(FirestoreError::Credentials("project id is empty".to_string()));
        }

        let connect_timeout_secs = non_empty_env("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: non_empty_env("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
            emulator_host: non_empty_env("FIRESTORE_EMULATOR_HOST"),
        })
    }

    /// Resource name prefix shared by every document.
    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }

    fn endpoint(&self) -> String {
        let origin = self
            .emulator_host
            .as_ref()
            .map_or_else(|| "https://firestore.googleapis.com".to_string(), |h| format!("http://{}", h));
        format!("{}/v1/{}", origin, self.documents_root())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Write precondition for updates.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    None,
    /// Fail with NotFound unless the document exists.
    Exists,
    /// Fail unless the document was last written at this time.
    UpdateTime(String),
}

impl Precondition {
    fn query_pair(&self) -> Option<(&'static str, String)> {
        match self {
            Precondition::None => None,
            Precondition::Exists => Some(("currentDocument.exists", "true".to_string())),
            Precondition::UpdateTime(ts) => Some(("currentDocument.updateTime", ts.clone())),
        }
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    endpoint: String,
    tokens: Arc<TokenCache>,
}

impl FirestoreClient {
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let tokens = match &config.emulator_host {
            Some(_) => TokenCache::fixed(EMULATOR_TOKEN),
            None => TokenCache::new(service_account()?),
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("vedit-firestore/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            config,
            tokens: Arc::new(tokens),
        })
    }

    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.endpoint, collection, doc_id)
    }

    /// Full resource name as used by batchGet.
    pub fn document_name(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.config.documents_root(), collection, doc_id)
    }

    /// Read a document; `None` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = &self.document_url(collection, doc_id);

        self.call("get_document", collection, Some(doc_id), || async move {
            let (status, body) = self.send(|token| self.http.get(url).bearer_auth(token)).await?;
            match status {
                StatusCode::OK => Ok(Some(serde_json::from_str(&body)?)),
                StatusCode::NOT_FOUND => Ok(None),
                _ => Err(rejection(status, url, &body)),
            }
        })
        .await
    }

    /// Create a document, failing with `AlreadyExists` if the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = &format!("{}/{}", self.endpoint, collection);
        let doc = &Document::new(fields);

        self.call("create_document", collection, Some(doc_id), || async move {
            let (status, body) = self
                .send(|token| {
                    self.http
                        .post(url)
                        .query(&[("documentId", doc_id)])
                        .bearer_auth(token)
                        .json(doc)
                })
                .await?;
            match status {
                StatusCode::OK => Ok(serde_json::from_str(&body)?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                _ => Err(rejection(status, url, &body)),
            }
        })
        .await
    }

    /// Replace every field of a document, creating it when missing.
    pub async fn set_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = &self.document_url(collection, doc_id);
        let doc = &Document::new(fields);

        self.call("set_document", collection, Some(doc_id), || async move {
            let (status, body) = self
                .send(|token| self.http.patch(url).bearer_auth(token).json(doc))
                .await?;
            match status {
                StatusCode::OK => Ok(serde_json::from_str(&body)?),
                _ => Err(rejection(status, url, &body)),
            }
        })
        .await
    }

    /// Write only the fields named in `update_mask`.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: &[&str],
        precondition: Precondition,
    ) -> FirestoreResult<Document> {
        let url = &self.document_url(collection, doc_id);
        let doc = &Document::new(fields);
        let query: &Vec<(&str, String)> = &update_mask
            .iter()
            .map(|field| ("updateMask.fieldPaths", field.to_string()))
            .chain(precondition.query_pair())
            .collect();

        self.call("update_document", collection, Some(doc_id), || async move {
            let (status, body) = self
                .send(|token| {
                    self.http
                        .patch(url)
                        .query(query)
                        .bearer_auth(token)
                        .json(doc)
                })
                .await?;
            match status {
                StatusCode::OK => Ok(serde_json::from_str(&body)?),
                StatusCode::NOT_FOUND => Err(FirestoreError::NotFound(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    Err(FirestoreError::PreconditionFailed(body))
                }
                _ => Err(rejection(status, url, &body)),
            }
        })
        .await
    }

    /// Fetch several documents of one collection.
    ///
    /// Missing documents are left out and the order is unspecified.
    pub async fn batch_get_documents(
        &self,
        collection: &str,
        doc_ids: &[&str],
    ) -> FirestoreResult<Vec<Document>> {
        let url = &format!("{}:batchGet", self.endpoint);
        let mut docs = Vec::with_capacity(doc_ids.len());

        for chunk in doc_ids.chunks(BATCH_GET_LIMIT) {
            let request = &BatchGetDocumentsRequest {
                documents: chunk
                    .iter()
                    .map(|id| self.document_name(collection, id))
                    .collect(),
            };

            let responses: Vec<BatchGetDocumentsResponse> = self
                .call("batch_get_documents", collection, None, || async move {
                    let (status, body) = self
                        .send(|token| self.http.post(url).bearer_auth(token).json(request))
                        .await?;
                    match status {
                        StatusCode::OK => decode_array("batchGet", &body),
                        _ => Err(rejection(status, url, &body)),
                    }
                })
                .await?;

            docs.extend(responses.into_iter().filter_map(|r| r.found));
        }

        metrics::record_documents_read("batch_get_documents", docs.len());
        Ok(docs)
    }

    /// Run a structured query over a root collection.
    pub async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = &format!("{}:runQuery", self.endpoint);
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let request = &RunQueryRequest {
            structured_query: query,
        };

        let responses: Vec<RunQueryResponse> = self
            .call("run_query", &collection, None, || async move {
                let (status, body) = self
                    .send(|token| self.http.post(url).bearer_auth(token).json(request))
                    .await?;
                match status {
                    StatusCode::OK => decode_array("runQuery", &body),
                    _ => Err(rejection(status, url, &body)),
                }
            })
            .await?;

        let docs: Vec<Document> = responses.into_iter().filter_map(|r| r.document).collect();
        metrics::record_documents_read("run_query", docs.len());
        Ok(docs)
    }

    /// Send one request, refreshing the token once if it expired mid-flight.
    async fn send<B>(&self, build: B) -> FirestoreResult<(StatusCode, String)>
    where
        B: Fn(&str) -> RequestBuilder,
    {
        let response = build(&self.tokens.token().await?).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::UNAUTHORIZED || !token_expired(&body) {
            return Ok((status, body));
        }

        self.tokens.invalidate().await;
        let response = build(&self.tokens.token().await?).send().await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }

    /// Run `attempt` under retry, with a span and request metrics.
    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        collection: &str,
        doc_id: Option<&str>,
        attempt: F,
    ) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation,
            collection,
            doc_id = doc_id.unwrap_or("")
        );

        let started = Instant::now();
        let result = with_retry(&self.config.retry, operation, attempt)
            .instrument(span)
            .await;
        metrics::record_request(operation, metrics::outcome(&result), started.elapsed());
        result
    }
}

fn service_account() -> FirestoreResult<Arc<dyn TokenProvider>> {
    match CustomServiceAccount::from_env() {
        Ok(Some(account)) => Ok(Arc::new(account)),
        Ok(None) => Err(FirestoreError::Credentials(
            "GOOGLE_APPLICATION_CREDENTIALS is not set".to_string(),
        )),
        Err(e) => Err(FirestoreError::Credentials(format!(
            "cannot load service account: {}",
            e
        ))),
    }
}

fn token_expired(body: &str) -> bool {
    body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
}

fn rejection(status: StatusCode, url: &str, body: &str) -> FirestoreError {
    FirestoreError::from_status(status.as_u16(), format!("{}: {}", url, excerpt(body)))
}

/// batchGet and runQuery answer with a JSON array of per-item results.
fn decode_array<T: DeserializeOwned>(what: &str, body: &str) -> FirestoreResult<Vec<T>> {
    serde_json::from_str(body).map_err(|e| {
        FirestoreError::decode(format!("{}: {} (body starts {:?})", what, e, excerpt(body)))
    })
}

fn excerpt(body: &str) -> &str {
    let mut end = body.len().min(BODY_EXCERPT);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
