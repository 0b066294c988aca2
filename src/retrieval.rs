//! Retrieval collaborator: ranked curriculum passages per content source.
//!
//! The engine only depends on the `Retrieval` trait; `HttpRetrieval` is the
//! production client talking to the retrieval service over JSON.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::Passage;
use crate::error::CollabError;

#[async_trait]
pub trait Retrieval: Send + Sync {
    /// Query one content source for ranked passages. Classification into
    /// transient vs permanent is the implementation's responsibility.
    async fn query(
        &self,
        source_id: &str,
        text: &str,
        max_results: usize,
    ) -> Result<Vec<Passage>, CollabError>;
}

#[derive(Clone)]
pub struct HttpRetrieval {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    text: &'a str,
    #[serde(rename = "maxResults")]
    max_results: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<PassageDto>,
}

#[derive(Deserialize)]
struct PassageDto {
    text: String,
    #[serde(default, rename = "relevanceScore")]
    relevance_score: f32,
    #[serde(rename = "moduleLabel")]
    module_label: String,
    citation: String,
}

impl HttpRetrieval {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl Retrieval for HttpRetrieval {
    #[instrument(level = "info", skip(self, text), fields(%source_id, text_len = text.len(), max_results))]
    async fn query(
        &self,
        source_id: &str,
        text: &str,
        max_results: usize,
    ) -> Result<Vec<Passage>, CollabError> {
        let url = format!("{}/collections/{}/query", self.base_url, source_id);
        let res = self
            .client
            .post(&url)
            .header(USER_AGENT, "calibra-backend/0.1")
            .header(CONTENT_TYPE, "application/json")
            .json(&QueryRequest { text, max_results })
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: QueryResponse = res
            .json()
            .await
            .map_err(|e| CollabError::Permanent(format!("malformed retrieval response: {}", e)))?;

        let passages: Vec<Passage> = body
            .results
            .into_iter()
            .filter(|p| !p.text.trim().is_empty())
            .map(|p| Passage {
                text: p.text,
                relevance_score: p.relevance_score,
                module_label: p.module_label,
                citation: p.citation,
            })
            .collect();

        info!(target: "engine", %source_id, count = passages.len(), "Retrieval query returned");
        Ok(passages)
    }
}

fn classify_transport_error(e: &reqwest::Error) -> CollabError {
    if e.is_timeout() || e.is_connect() {
        CollabError::Transient(format!("retrieval transport: {}", e))
    } else {
        CollabError::Permanent(format!("retrieval transport: {}", e))
    }
}

/// 429/408/5xx are service hiccups worth retrying; 403/404 mean the source
/// id or credentials are wrong and retrying cannot help.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> CollabError {
    let msg = format!("HTTP {}: {}", status, crate::util::trunc_for_log(body, 200));
    match status.as_u16() {
        408 | 429 => CollabError::Transient(msg),
        s if s >= 500 => CollabError::Transient(msg),
        403 | 404 => CollabError::Permanent(msg),
        _ => CollabError::Permanent(msg),
    }
}
