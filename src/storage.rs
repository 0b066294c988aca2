//! Storage collaborator: durable writes for rendered assessments.
//!
//! The engine depends on the `Storage` trait only; `HttpObjectStore` talks
//! to an S3-compatible gateway. Each write goes to a distinct key (level +
//! timestamp), so no two units ever contend for the same object.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tracing::{info, instrument};

use crate::error::CollabError;
use crate::retrieval::classify_status;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Write one object; returns its locator on success. Transient vs
    /// permanent classification is the implementation's responsibility.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, CollabError>;
}

#[derive(Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn from_env() -> Self {
        let base_url = std::env::var("STORAGE_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:9000".into());
        let bucket = std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "assessments".into());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        info!(target: "calibra_backend", %base_url, %bucket, "Object store client configured");
        Self { client, base_url: base_url.trim_end_matches('/').to_string(), bucket }
    }
}

#[async_trait]
impl Storage for HttpObjectStore {
    #[instrument(level = "info", skip(self, bytes), fields(%key, size = bytes.len(), %content_type))]
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, CollabError> {
        let url = format!("{}/{}/{}", self.base_url, self.bucket, key);
        let res = self
            .client
            .put(&url)
            .header(USER_AGENT, "calibra-backend/0.1")
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    CollabError::Transient(format!("storage transport: {}", e))
                } else {
                    CollabError::Permanent(format!("storage transport: {}", e))
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let locator = format!("s3://{}/{}", self.bucket, key);
        info!(target: "engine", %locator, "Object stored");
        Ok(locator)
    }
}
