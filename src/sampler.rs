//! Content Diversity Sampler.
//!
//! Flow:
//! 1) One overview query discovers the level's module/course names.
//! 2) One detail query per discovered module (shuffled order) merges into a
//!    passage pool spanning as many modules as the source offers.
//!
//! The sampler targets 6 modules to leave margin above the 5-module
//! invariant, but a thin pool is not an error here: the validator owns
//! coverage and will send the draft back through the retry loop instead.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{info, instrument, warn};

use crate::config::{retry_backoff, Prompts};
use crate::domain::Passage;
use crate::error::{CollabError, EngineError};
use crate::retrieval::Retrieval;
use crate::util::fill_template;

/// Modules queried per level: one above the validator's minimum of 5.
pub const TARGET_MODULES: usize = 6;

const OVERVIEW_MAX_RESULTS: usize = 8;
const MODULE_MAX_RESULTS: usize = 3;

/// Merged retrieval output for one level: the passages plus the module
/// names that were actually queried.
#[derive(Clone, Debug, Default)]
pub struct PassagePool {
    pub passages: Vec<Passage>,
    pub modules_queried: Vec<String>,
}

impl PassagePool {
    pub fn distinct_modules(&self) -> usize {
        self.passages
            .iter()
            .map(|p| p.module_label.to_lowercase())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn contains_citation(&self, locator: &str) -> bool {
        self.passages.iter().any(|p| p.citation == locator)
    }
}

pub struct DiversitySampler {
    retrieval: Arc<dyn Retrieval>,
    prompts: Prompts,
    /// Hard cap on results per query, on top of the per-query defaults.
    max_results: usize,
    backoff: Vec<Duration>,
}

impl DiversitySampler {
    pub fn new(retrieval: Arc<dyn Retrieval>, prompts: Prompts, max_results: usize) -> Self {
        Self { retrieval, prompts, max_results, backoff: retry_backoff() }
    }

    #[cfg(test)]
    pub fn with_backoff(
        retrieval: Arc<dyn Retrieval>,
        prompts: Prompts,
        backoff: Vec<Duration>,
    ) -> Self {
        Self { retrieval, prompts, max_results: 10, backoff }
    }

    /// Assemble the passage pool for one level. Read-only side effects.
    #[instrument(level = "info", skip(self), fields(%source_id, level))]
    pub async fn sample(&self, source_id: &str, level: u8) -> Result<PassagePool, EngineError> {
        let level_str = level.to_string();
        let overview_query =
            fill_template(&self.prompts.overview_query_template, &[("level", &level_str)]);
        let overview = self
            .query_with_retry(source_id, &overview_query, OVERVIEW_MAX_RESULTS.min(self.max_results))
            .await?;

        let mut modules = extract_module_names(&overview, level);
        modules.shuffle(&mut rand::thread_rng());

        let mut pool = PassagePool::default();
        for module in modules.into_iter().take(TARGET_MODULES) {
            let query = fill_template(
                &self.prompts.module_query_template,
                &[("module", &module), ("level", &level_str)],
            );
            let passages = self
                .query_with_retry(source_id, &query, MODULE_MAX_RESULTS.min(self.max_results))
                .await?;
            if !passages.is_empty() {
                pool.passages.extend(passages);
                pool.modules_queried.push(module);
            }
        }

        let distinct = pool.distinct_modules();
        if distinct < TARGET_MODULES {
            // Proceed anyway; the validator decides whether coverage suffices.
            warn!(target: "engine", %source_id, level, distinct, "Thin module coverage after full query budget");
        }
        info!(
            target: "engine",
            %source_id,
            level,
            passages = pool.passages.len(),
            modules = pool.modules_queried.len(),
            "Passage pool assembled"
        );
        Ok(pool)
    }

    /// Shared transient-retry policy: permanent errors fail immediately,
    /// transient ones are retried on the backoff schedule, and only the
    /// exhausted form escapes as ContentUnavailable.
    async fn query_with_retry(
        &self,
        source_id: &str,
        text: &str,
        max_results: usize,
    ) -> Result<Vec<Passage>, EngineError> {
        let attempts = self.backoff.len();
        let mut last_err = String::new();
        for attempt in 0..attempts {
            match self.retrieval.query(source_id, text, max_results).await {
                Ok(passages) => return Ok(passages),
                Err(CollabError::Permanent(msg)) => {
                    return Err(EngineError::ContentUnavailable(msg));
                }
                Err(CollabError::Transient(msg)) => {
                    warn!(target: "engine", %source_id, attempt = attempt + 1, error = %msg, "Transient retrieval error");
                    last_err = msg;
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.backoff[attempt]).await;
                    }
                }
            }
        }
        Err(EngineError::ContentUnavailable(format!(
            "retrieval retry budget exhausted: {}",
            last_err
        )))
    }
}

/// Parse module/course names from the overview passages. Lines mentioning
/// module/course/unit/chapter are cut at the first ':' or '.'; the list is
/// deduplicated case-insensitively and padded with generic names so the
/// detail queries always have TARGET_MODULES topics to work with.
pub fn extract_module_names(overview: &[Passage], level: u8) -> Vec<String> {
    const KEYWORDS: [&str; 4] = ["module", "course", "unit", "chapter"];

    let mut seen = HashSet::new();
    let mut modules = Vec::new();
    for passage in overview {
        for line in passage.text.lines() {
            let line = line.trim();
            let lower = line.to_lowercase();
            if !KEYWORDS.iter().any(|k| lower.contains(k)) {
                continue;
            }
            let name = line
                .split(':')
                .next()
                .and_then(|s| s.split('.').next())
                .unwrap_or("")
                .trim()
                .trim_start_matches(['-', '*', '•'])
                .trim();
            if name.is_empty() || name.len() >= 100 {
                continue;
            }
            if seen.insert(name.to_lowercase()) {
                modules.push(name.to_string());
            }
        }
    }

    let mut i = modules.len();
    while modules.len() < TARGET_MODULES {
        i += 1;
        modules.push(format!("Level {} Module {}", level, i));
    }
    modules
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn passage(text: &str, module: &str, citation: &str) -> Passage {
        Passage {
            text: text.to_string(),
            relevance_score: 0.9,
            module_label: module.to_string(),
            citation: citation.to_string(),
        }
    }

    #[test]
    fn extracts_named_modules_from_overview() {
        let overview = vec![passage(
            "The curriculum covers:\nModule 1 - Prompt Basics: writing clear instructions\nModule 2 - Tool Selection: choosing the right assistant\nUnit 3 - Data Handling\nIntro text without keywords",
            "Overview",
            "s3://kb/overview.pdf",
        )];
        let modules = extract_module_names(&overview, 1);
        assert!(modules.iter().any(|m| m.contains("Module 1 - Prompt Basics")));
        assert!(modules.iter().any(|m| m.contains("Unit 3 - Data Handling")));
        // Padded up to the target.
        assert_eq!(modules.len(), TARGET_MODULES);
    }

    #[test]
    fn pads_with_generic_names_when_overview_is_sparse() {
        let modules = extract_module_names(&[], 3);
        assert_eq!(modules.len(), TARGET_MODULES);
        assert_eq!(modules[0], "Level 3 Module 1");
        assert_eq!(modules[5], "Level 3 Module 6");
    }

    #[test]
    fn dedupes_case_insensitively() {
        let overview = vec![passage(
            "Module A: one\nMODULE A: again\nmodule a: and again",
            "Overview",
            "s3://kb/o.pdf",
        )];
        let modules = extract_module_names(&overview, 2);
        let named: Vec<_> = modules.iter().filter(|m| !m.starts_with("Level")).collect();
        assert_eq!(named.len(), 1);
    }

    struct FlakyRetrieval {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl Retrieval for FlakyRetrieval {
        async fn query(
            &self,
            _source_id: &str,
            text: &str,
            _max_results: usize,
        ) -> Result<Vec<Passage>, crate::error::CollabError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(crate::error::CollabError::Transient("throttled".into()));
            }
            if text.starts_with("List the main modules") {
                Ok(vec![passage("Module 1: a\nModule 2: b", "Overview", "s3://kb/o.pdf")])
            } else {
                Ok(vec![passage("content", "Module 1", "s3://kb/m1.pdf")])
            }
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_then_succeed() {
        let retrieval = Arc::new(FlakyRetrieval { calls: AtomicUsize::new(0), fail_first: 2 });
        let sampler = DiversitySampler::with_backoff(
            retrieval,
            Prompts::default(),
            vec![Duration::ZERO; 3],
        );
        let pool = sampler.sample("src-1", 1).await.expect("pool");
        assert!(!pool.passages.is_empty());
    }

    struct DeniedRetrieval;

    #[async_trait]
    impl Retrieval for DeniedRetrieval {
        async fn query(
            &self,
            _source_id: &str,
            _text: &str,
            _max_results: usize,
        ) -> Result<Vec<Passage>, crate::error::CollabError> {
            Err(crate::error::CollabError::Permanent("HTTP 403".into()))
        }
    }

    #[tokio::test]
    async fn permanent_error_fails_without_retry() {
        let sampler = DiversitySampler::with_backoff(
            Arc::new(DeniedRetrieval),
            Prompts::default(),
            vec![Duration::ZERO; 3],
        );
        let err = sampler.sample("src-1", 1).await.unwrap_err();
        assert_eq!(err.kind(), "content_unavailable");
    }
}
