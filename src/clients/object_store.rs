//! Durable object storage for launch assets.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("object store transport error: {0}")]
    Transport(String),

    #[error("object store refused {key}: {status}")]
    Refused { key: String, status: u16 },
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, returning the public URL.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ObjectStoreError>;

    /// The URL `key` will be served from. Deterministic, valid before the
    /// object exists; lets metadata reference an image still uploading.
    fn public_url(&self, key: &str) -> String;
}

/// Bucket-per-platform HTTP object store (S3-style PUT semantics).
pub struct HttpObjectStore {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    call_timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(
        base_url: String,
        bucket: String,
        call_timeout: Duration,
    ) -> Result<Self, ObjectStoreError> {
        let http = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| ObjectStoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket,
            call_timeout,
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        let url = self.public_url(key);
        let response = self
            .http
            .put(&url)
            .timeout(self.call_timeout)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ObjectStoreError::Refused {
                key: key.to_string(),
                status: response.status().as_u16(),
            });
        }

        debug!(key, "stored object");
        Ok(url)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.bucket, key)
    }
}
