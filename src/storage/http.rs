//! HTTP storage backend for the ReadsAI storage gateway.
//!
//! The gateway exposes a Supabase-style object REST API, flattened to plain
//! key prefixes:
//!
//! ```text
//! POST {base}/object/list/{bucket}     body {"prefix": "..."} → JSON entries
//! GET  {base}/object/{bucket}/{key}    → object bytes | 404
//! POST {base}/object/{bucket}/{key}    body = bytes, x-upsert header | 409
//! ```
//!
//! Error mapping follows the facade contract: 404 on `get` is `NotFound`,
//! 409 on `put` is `AlreadyExists`, and every transport failure or unexpected
//! status — including auth rejections — is `Unavailable`, which the tracker
//! treats as transient and retries on the next tick.

use crate::error::{StorageError, SyncError};
use crate::storage::{ObjectEntry, StorageProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A [`StorageProvider`] speaking the ReadsAI storage gateway API.
pub struct HttpStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: Option<String>,
}

impl HttpStorage {
    /// Create a backend for `bucket` behind `base_url`
    /// (e.g. `https://xyz.supabase.co/storage/v1`).
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Result<Self, SyncError> {
        Self::with_timeout(base_url, bucket, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Same as [`HttpStorage::new`] with an explicit per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key: None,
        })
    }

    /// Attach the gateway API key, sent as both `Authorization: Bearer` and
    /// `apikey` headers.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req
                .bearer_auth(key)
                .header("apikey", key.as_str()),
            None => req,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, key)
    }

    fn list_url(&self) -> String {
        format!("{}/object/list/{}", self.base_url, self.bucket)
    }
}

impl fmt::Debug for HttpStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStorage")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Wire shape of one listing entry as the gateway returns it.
#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    size: Option<u64>,
    updated_at: Option<String>,
}

fn transport(err: reqwest::Error) -> StorageError {
    StorageError::unavailable(err.to_string())
}

fn unexpected_status(status: reqwest::StatusCode) -> StorageError {
    StorageError::unavailable(format!("unexpected HTTP status {status}"))
}

#[async_trait]
impl StorageProvider for HttpStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        let response = self
            .authed(self.client.post(self.list_url()))
            .json(&serde_json::json!({ "prefix": prefix }))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(unexpected_status(response.status()));
        }

        let raw: Vec<RawEntry> = response.json().await.map_err(transport)?;
        Ok(raw
            .into_iter()
            .map(|e| ObjectEntry {
                key: e.name,
                size: e.size,
                updated_at: e.updated_at,
            })
            .collect())
    }

    async fn put(&self, key: &str, bytes: &[u8], overwrite: bool) -> Result<(), StorageError> {
        let response = self
            .authed(self.client.post(self.object_url(key)))
            .header("x-upsert", if overwrite { "true" } else { "false" })
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::CONFLICT => Err(StorageError::AlreadyExists {
                key: key.to_string(),
            }),
            s => Err(unexpected_status(s)),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .authed(self.client.get(self.object_url(key)))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            s if s.is_success() => {
                let bytes = response.bytes().await.map_err(transport)?;
                Ok(bytes.to_vec())
            }
            reqwest::StatusCode::NOT_FOUND => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            s => Err(unexpected_status(s)),
        }
    }
}
