//! Wire protocol DTOs (JSON, camelCase) and the mapping from engine
//! aggregates to the outbound report.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AggregateResponse, LevelOutcome};

/// Inbound assessment request body.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentIn {
  #[serde(default)]
  pub levels: Vec<u8>,
  #[serde(default)]
  pub background_text: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRunOut {
  pub results: Vec<LevelResultOut>,
  pub total_duration_ms: u64,
  pub speedup_percent: f64,
}

/// One per requested level; `status` is `succeeded` or `failed` and decides
/// which optional fields are present.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelResultOut {
  pub level: u8,
  pub status: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assessment_id: Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub locators: Option<LocatorsOut>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub module_count: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<ErrorOut>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorsOut {
  pub primary: String,
  pub secondary: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOut {
  pub kind: &'static str,
  pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthOut {
  pub ok: bool,
}

/// Body for a request rejected before any unit ran (HTTP 400).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestErrorOut {
  pub error: ErrorOut,
}

pub fn to_run_out(aggregate: &AggregateResponse) -> AssessmentRunOut {
  let results = aggregate
    .results
    .iter()
    .map(|(level, outcome)| match outcome {
      LevelOutcome::Succeeded { assessment, persisted } => LevelResultOut {
        level: *level,
        status: "succeeded",
        assessment_id: Some(assessment.id),
        locators: Some(LocatorsOut {
          primary: persisted.primary_locator.clone(),
          secondary: persisted.secondary_locator.clone(),
        }),
        module_count: Some(assessment.modules_covered.len()),
        error: None,
      },
      LevelOutcome::Failed { error, .. } => LevelResultOut {
        level: *level,
        status: "failed",
        assessment_id: None,
        locators: None,
        module_count: None,
        error: Some(ErrorOut { kind: error.kind(), message: error.to_string() }),
      },
    })
    .collect();

  AssessmentRunOut {
    results,
    total_duration_ms: aggregate.total_duration.as_millis() as u64,
    speedup_percent: aggregate.speedup_percent,
  }
}
