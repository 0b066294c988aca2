//! Persistence Client: dual-representation writes with bounded retry.
//!
//! A validated assessment is rendered twice — structured JSON and
//! human-readable markdown — sharing one timestamp, and written under
//! `{prefix}/level_{n}/level_{n}_{YYYYMMDD_HHMMSS}.{json|md}`.
//!
//! Retry policy: transient storage errors retried up to the backoff
//! schedule (1s/2s/4s); permanent errors fail immediately. Both locators
//! are returned only if both writes succeed; either failure surfaces as a
//! single PersistenceError with no partial locators.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::config::retry_backoff;
use crate::domain::{Assessment, PersistenceOutcome};
use crate::error::{CollabError, EngineError};
use crate::storage::Storage;

pub struct PersistClient {
    storage: Arc<dyn Storage>,
    prefix: String,
    backoff: Vec<Duration>,
}

impl PersistClient {
    pub fn new(storage: Arc<dyn Storage>, prefix: &str) -> Self {
        Self { storage, prefix: prefix.trim_matches('/').to_string(), backoff: retry_backoff() }
    }

    #[cfg(test)]
    pub fn with_backoff(storage: Arc<dyn Storage>, prefix: &str, backoff: Vec<Duration>) -> Self {
        Self { storage, prefix: prefix.trim_matches('/').to_string(), backoff }
    }

    #[instrument(level = "info", skip(self, assessment), fields(level = assessment.level, id = %assessment.id))]
    pub async fn persist(&self, assessment: &Assessment) -> Result<PersistenceOutcome, EngineError> {
        let timestamp = Utc::now();

        let json = serde_json::to_vec_pretty(assessment)
            .map_err(|e| EngineError::Persistence(format!("serialize: {}", e)))?;
        let markdown = render_markdown(assessment).into_bytes();

        let json_key = self.object_key(assessment.level, &timestamp, "json");
        let md_key = self.object_key(assessment.level, &timestamp, "md");

        let primary_locator = self.put_with_retry(&json_key, json, "application/json").await?;
        let secondary_locator = self.put_with_retry(&md_key, markdown, "text/markdown").await?;

        info!(target: "engine", %primary_locator, %secondary_locator, "Assessment persisted");
        Ok(PersistenceOutcome { primary_locator, secondary_locator, timestamp })
    }

    fn object_key(&self, level: u8, timestamp: &DateTime<Utc>, ext: &str) -> String {
        let ts = timestamp.format("%Y%m%d_%H%M%S");
        format!("{}/level_{}/level_{}_{}.{}", self.prefix, level, level, ts, ext)
    }

    async fn put_with_retry(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, EngineError> {
        let attempts = self.backoff.len();
        let mut last_err = String::new();
        for attempt in 0..attempts {
            match self.storage.put(key, bytes.clone(), content_type).await {
                Ok(locator) => return Ok(locator),
                Err(CollabError::Permanent(msg)) => {
                    return Err(EngineError::Persistence(msg));
                }
                Err(CollabError::Transient(msg)) => {
                    warn!(target: "engine", %key, attempt = attempt + 1, error = %msg, "Transient storage error");
                    last_err = msg;
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.backoff[attempt]).await;
                    }
                }
            }
        }
        Err(EngineError::Persistence(format!(
            "storage retry budget exhausted: {}",
            last_err
        )))
    }
}

/// Render the human-readable secondary representation.
pub fn render_markdown(a: &Assessment) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("# Level {} Assessment", a.level));
    lines.push(String::new());
    lines.push(format!("**Assessment ID**: {}", a.id));
    lines.push(format!("**Generated**: {}", a.generated_at));
    lines.push(format!("**Background**: {}", a.background_text));
    lines.push(format!(
        "**Modules Covered**: {} ({} modules)",
        a.modules_covered.join(", "),
        a.modules_covered.len()
    ));
    lines.push("\n---\n".into());

    lines.push(format!("## Multiple Choice Questions ({})\n", a.choice_questions.len()));
    for (i, q) in a.choice_questions.iter().enumerate() {
        lines.push(format!("### Question {} (MC) - {}", i + 1, q.difficulty.as_str()));
        lines.push(format!("**Module**: {}\n", q.module_label));
        lines.push(format!("{}\n", q.prompt));
        for (j, option) in q.options.iter().enumerate() {
            let letter = (b'A' + j as u8) as char;
            let marker = if j == q.correct_index { " ✓ correct" } else { "" };
            lines.push(format!("{}. {}{}", letter, option, marker));
        }
        lines.push(format!("\n**Rationale**: {}\n", q.rationale));
        lines.push("---\n".into());
    }

    lines.push(format!("## Open-Ended Questions ({})\n", a.open_questions.len()));
    for (i, q) in a.open_questions.iter().enumerate() {
        lines.push(format!(
            "### Question {} (OE) - {}",
            a.choice_questions.len() + i + 1,
            q.difficulty.as_str()
        ));
        lines.push(format!("**Module**: {}\n", q.module_label));
        lines.push(format!("{}\n", q.prompt));
        lines.push("**Key Points to Address**:".into());
        for point in &q.key_points {
            lines.push(format!("- {}", point));
        }
        lines.push(format!("\n**Evaluation Guidance**: {}\n", q.evaluation_guidance));
        lines.push("---\n".into());
    }

    lines.join("\n")
}
