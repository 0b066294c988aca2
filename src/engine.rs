//! Request parsing and the concurrency coordinator.
//!
//! `parse_request` normalizes the inbound payload into an
//! `AssessmentRequest` (unique in-range levels, one calibration profile).
//! `Engine::run` fans the levels out as independent units under a
//! semaphore, imposes the per-unit timeout, collects outcomes in level
//! order, and reports the measured speedup of the run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use crate::config::{EngineConfig, Prompts, SUPPORTED_LEVELS};
use crate::domain::{AggregateResponse, AssessmentRequest, LevelOutcome, LevelRequest};
use crate::error::EngineError;
use crate::generation::Generator;
use crate::persist::PersistClient;
use crate::profile::parse_profile;
use crate::retrieval::Retrieval;
use crate::sampler::DiversitySampler;
use crate::storage::Storage;
use crate::unit::LevelUnit;

pub struct Engine {
  pub config: EngineConfig,
  pub prompts: Prompts,
  pub retrieval: Arc<dyn Retrieval>,
  pub generator: Arc<dyn Generator>,
  pub storage: Arc<dyn Storage>,
}

impl Engine {
  /// Normalize the inbound payload. Duplicate levels collapse to their
  /// first occurrence; any out-of-range level rejects the whole request.
  pub fn parse_request(
    &self,
    levels: &[u8],
    background_text: &str,
  ) -> Result<AssessmentRequest, EngineError> {
    if levels.is_empty() {
      return Err(EngineError::EmptyRequest);
    }

    let mut seen = std::collections::HashSet::new();
    let mut requests = Vec::new();
    for &level in levels {
      if !SUPPORTED_LEVELS.contains(&level) {
        return Err(EngineError::InvalidLevel(level));
      }
      if !seen.insert(level) {
        continue;
      }
      // Every supported level has a configured source id (defaulted).
      let content_source_id = self
        .config
        .content_source_id(level)
        .ok_or(EngineError::InvalidLevel(level))?
        .to_string();
      requests.push(LevelRequest { level, content_source_id });
    }

    Ok(AssessmentRequest { levels: requests, profile: parse_profile(background_text) })
  }

  /// Run every requested level concurrently and aggregate the outcomes.
  /// Always returns a complete per-level report; partial failure is a
  /// property of individual entries, never of the run.
  #[instrument(level = "info", skip(self, request), fields(levels = request.levels.len()))]
  pub async fn run(&self, request: AssessmentRequest) -> AggregateResponse {
    let started = Instant::now();
    let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
    let unit_timeout = self.config.unit_timeout;

    let mut set: JoinSet<(u8, LevelOutcome, Duration)> = JoinSet::new();
    let mut level_of_task: HashMap<tokio::task::Id, u8> = HashMap::new();

    for req in &request.levels {
      let level = req.level;
      let unit = self.build_unit(req.clone(), &request);
      let semaphore = semaphore.clone();
      let handle = set.spawn(async move {
        // Held until the unit finishes; timing starts after acquisition so
        // queueing under the concurrency cap never counts against the unit.
        let _permit = semaphore.acquire_owned().await.ok();
        let unit_started = Instant::now();
        let outcome = match tokio::time::timeout(unit_timeout, unit.run()).await {
          Ok(outcome) => outcome,
          Err(_) => LevelOutcome::Failed {
            error: EngineError::Timeout(unit_timeout.as_secs()),
            attempts: 0,
          },
        };
        (level, outcome, unit_started.elapsed())
      });
      level_of_task.insert(handle.id(), level);
    }

    let mut results: Vec<(u8, LevelOutcome)> = Vec::new();
    let mut unit_total = Duration::ZERO;
    while let Some(joined) = set.join_next_with_id().await {
      match joined {
        Ok((_, (level, outcome, elapsed))) => {
          unit_total += elapsed;
          results.push((level, outcome));
        }
        Err(e) => {
          // A panicked unit is reported like any other failed level.
          let level = level_of_task.get(&e.id()).copied().unwrap_or(0);
          error!(target: "engine", level, error = %e, "Level unit task failed");
          results.push((
            level,
            LevelOutcome::Failed {
              error: EngineError::Generation(format!("internal task failure: {}", e)),
              attempts: 0,
            },
          ));
        }
      }
    }
    results.sort_by_key(|(level, _)| *level);

    let total_duration = started.elapsed();
    let speedup_percent = if results.len() > 1 && unit_total > Duration::ZERO {
      ((1.0 - total_duration.as_secs_f64() / unit_total.as_secs_f64()) * 100.0).max(0.0)
    } else {
      0.0
    };

    let succeeded = results.iter().filter(|(_, o)| o.is_success()).count();
    info!(
      target: "engine",
      succeeded,
      failed = results.len() - succeeded,
      total_ms = total_duration.as_millis() as u64,
      speedup_percent = format!("{:.1}", speedup_percent).as_str(),
      "Assessment run finished"
    );

    AggregateResponse { results, total_duration, speedup_percent }
  }

  fn build_unit(&self, req: LevelRequest, request: &AssessmentRequest) -> LevelUnit {
    LevelUnit {
      request: req,
      profile: request.profile.clone(),
      sampler: Arc::new(DiversitySampler::new(
        self.retrieval.clone(),
        self.prompts.clone(),
        self.config.max_results_per_query,
      )),
      generator: self.generator.clone(),
      persist: Arc::new(PersistClient::new(self.storage.clone(), &self.config.storage_prefix)),
      prompts: self.prompts.clone(),
      min_modules: self.config.min_modules,
      draft_retries: self.config.draft_retry_budget,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, Passage};
  use crate::error::CollabError;
  use async_trait::async_trait;

  struct StaticRetrieval;

  #[async_trait]
  impl Retrieval for StaticRetrieval {
    async fn query(
      &self,
      _source_id: &str,
      text: &str,
      _max_results: usize,
    ) -> Result<Vec<Passage>, CollabError> {
      if text.starts_with("List the main modules") {
        Ok(vec![Passage {
          text: "Module 1: a\nModule 2: b\nModule 3: c".into(),
          relevance_score: 0.9,
          module_label: "Overview".into(),
          citation: "s3://kb/overview.pdf".into(),
        }])
      } else {
        Ok(vec![Passage {
          text: "detail".into(),
          relevance_score: 0.8,
          module_label: "Module 1".into(),
          citation: "s3://kb/m1.pdf".into(),
        }])
      }
    }
  }

  /// Sleeps a fixed interval per call, then returns a clean draft. The
  /// sleep dominates the unit's runtime, making speedup measurable.
  struct SleepyGenerator {
    delay: Duration,
  }

  #[async_trait]
  impl Generator for SleepyGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, String> {
      tokio::time::sleep(self.delay).await;
      Ok(clean_draft_json())
    }
  }

  fn clean_draft_json() -> String {
    let choice: Vec<serde_json::Value> = (0..7)
      .map(|i| {
        serde_json::json!({
          "prompt": format!("choice q{}", i),
          "options": ["a", "b", "c", "d"],
          "correct_index": i % 4,
          "rationale": "because",
          "difficulty": Difficulty::Intermediate.as_str(),
          "module_label": format!("M{}", (i % 5) + 1),
          "citations": ["s3://kb/m1.pdf"],
        })
      })
      .collect();
    let open: Vec<serde_json::Value> = (0..3)
      .map(|i| {
        serde_json::json!({
          "prompt": format!("open q{}", i),
          "key_points": ["x", "y"],
          "evaluation_guidance": "both",
          "difficulty": Difficulty::Advanced.as_str(),
          "module_label": format!("M{}", i + 1),
          "citations": ["s3://kb/m1.pdf"],
        })
      })
      .collect();
    serde_json::json!({
      "multiple_choice_questions": choice,
      "open_ended_questions": open,
    })
    .to_string()
  }

  struct OkStorage;

  #[async_trait]
  impl crate::storage::Storage for OkStorage {
    async fn put(
      &self,
      key: &str,
      _bytes: Vec<u8>,
      _content_type: &str,
    ) -> Result<String, CollabError> {
      Ok(format!("s3://bucket/{}", key))
    }
  }

  /// Denies writes for one level only.
  struct LevelTwoDenied;

  #[async_trait]
  impl crate::storage::Storage for LevelTwoDenied {
    async fn put(
      &self,
      key: &str,
      _bytes: Vec<u8>,
      _content_type: &str,
    ) -> Result<String, CollabError> {
      if key.contains("level_2") {
        Err(CollabError::Permanent("access denied".into()))
      } else {
        Ok(format!("s3://bucket/{}", key))
      }
    }
  }

  fn engine(storage: Arc<dyn Storage>, delay_ms: u64) -> Engine {
    let mut config = EngineConfig {
      retrieval_base_url: "http://localhost:8081".into(),
      content_sources: HashMap::new(),
      storage_prefix: "learning_path/assessments".into(),
      unit_timeout: Duration::from_secs(10),
      max_in_flight: 4,
      max_results_per_query: 10,
      min_modules: 5,
      draft_retry_budget: 2,
    };
    for level in SUPPORTED_LEVELS {
      config.content_sources.insert(level, format!("level-{}-curriculum", level));
    }
    Engine {
      config,
      prompts: Prompts::default(),
      retrieval: Arc::new(StaticRetrieval),
      generator: Arc::new(SleepyGenerator { delay: Duration::from_millis(delay_ms) }),
      storage,
    }
  }

  #[test]
  fn parse_rejects_out_of_range_level() {
    let engine = engine(Arc::new(OkStorage), 0);
    let err = engine.parse_request(&[1, 5], "finance analyst, 2 years").unwrap_err();
    assert_eq!(err.kind(), "invalid_level");
  }

  #[test]
  fn parse_rejects_empty_level_list() {
    let engine = engine(Arc::new(OkStorage), 0);
    let err = engine.parse_request(&[], "finance analyst, 2 years").unwrap_err();
    assert_eq!(err.kind(), "empty_request");
  }

  #[test]
  fn parse_dedupes_and_keeps_first_occurrence_order() {
    let engine = engine(Arc::new(OkStorage), 0);
    let req = engine.parse_request(&[2, 2, 1], "finance analyst, 2 years").unwrap();
    let levels: Vec<u8> = req.levels.iter().map(|r| r.level).collect();
    assert_eq!(levels, vec![2, 1]);
    assert_eq!(req.levels[0].content_source_id, "level-2-curriculum");
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_run_beats_sequential_sum() {
    let engine = engine(Arc::new(OkStorage), 150);
    let req = engine.parse_request(&[1, 2], "finance analyst, 2 years").unwrap();
    let out = engine.run(req).await;
    assert_eq!(out.results.len(), 2);
    assert!(out.results.iter().all(|(_, o)| o.is_success()));
    // Two ~150ms units overlapped: wall clock well under the 300ms sum.
    assert!(out.total_duration < Duration::from_millis(280), "wall = {:?}", out.total_duration);
    assert!(out.speedup_percent > 0.0);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn failing_level_does_not_disturb_its_sibling() {
    let engine = engine(Arc::new(LevelTwoDenied), 10);
    let req = engine.parse_request(&[2, 1], "finance analyst, 2 years").unwrap();
    let out = engine.run(req).await;
    // Results come back sorted by level regardless of completion order.
    assert_eq!(out.results[0].0, 1);
    assert_eq!(out.results[1].0, 2);
    assert!(out.results[0].1.is_success());
    match &out.results[1].1 {
      LevelOutcome::Failed { error, .. } => assert_eq!(error.kind(), "persistence_failed"),
      LevelOutcome::Succeeded { .. } => panic!("level 2 persistence should fail"),
    }
  }

  #[tokio::test]
  async fn single_level_reports_zero_speedup() {
    let engine = engine(Arc::new(OkStorage), 10);
    let req = engine.parse_request(&[3], "finance analyst, 2 years").unwrap();
    let out = engine.run(req).await;
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.speedup_percent, 0.0);
  }

  #[tokio::test]
  async fn unit_exceeding_its_budget_times_out() {
    let mut engine = engine(Arc::new(OkStorage), 0);
    engine.config.unit_timeout = Duration::from_millis(50);
    engine.generator = Arc::new(SleepyGenerator { delay: Duration::from_secs(600) });
    let req = engine.parse_request(&[1], "finance analyst, 2 years").unwrap();
    let out = engine.run(req).await;
    match &out.results[0].1 {
      LevelOutcome::Failed { error, .. } => assert_eq!(error.kind(), "timeout"),
      LevelOutcome::Succeeded { .. } => panic!("expected timeout"),
    }
  }
}
