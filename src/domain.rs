//! Domain models used by the backend: calibration profile, level requests,
//! passages, question variants, and the assessment aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Professional category derived from the free-text background.
/// Changes *what* a question is about, never how hard it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
  It,
  Finance,
  Hr,
  Marketing,
  Operations,
  General,
}

impl Domain {
  pub fn as_str(&self) -> &'static str {
    match self {
      Domain::It => "it",
      Domain::Finance => "finance",
      Domain::Hr => "hr",
      Domain::Marketing => "marketing",
      Domain::Operations => "operations",
      Domain::General => "general",
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceTier {
  Beginner,
  Intermediate,
  Advanced,
  Expert,
}

impl ExperienceTier {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExperienceTier::Beginner => "beginner",
      ExperienceTier::Intermediate => "intermediate",
      ExperienceTier::Advanced => "advanced",
      ExperienceTier::Expert => "expert",
    }
  }
}

/// Per-question difficulty tag as emitted by the generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Beginner,
  Intermediate,
  Advanced,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Beginner => "beginner",
      Difficulty::Intermediate => "intermediate",
      Difficulty::Advanced => "advanced",
    }
  }
}

/// Derived calibration context. Immutable once parsed; advisory only
/// (used to frame scenarios, never enforced as a structural invariant).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationProfile {
  pub background_text: String,
  pub domain: Domain,
  pub tier: ExperienceTier,
  #[serde(default)]
  pub years_experience: Option<u32>,
}

/// One requested level plus the content source to query for it.
/// The source id is configured per level and never shared implicitly.
#[derive(Clone, Debug)]
pub struct LevelRequest {
  pub level: u8,
  pub content_source_id: String,
}

/// Parsed inbound request: unique in-range levels and one profile.
#[derive(Clone, Debug)]
pub struct AssessmentRequest {
  pub levels: Vec<LevelRequest>,
  pub profile: CalibrationProfile,
}

/// Retrieved content fragment. Read-only; the citation is an opaque
/// locator sufficient to prove provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Passage {
  pub text: String,
  pub relevance_score: f32,
  pub module_label: String,
  pub citation: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoiceQuestion {
  pub prompt: String,
  pub options: Vec<String>,
  pub correct_index: usize,
  pub rationale: String,
  pub difficulty: Difficulty,
  pub module_label: String,
  pub citations: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenQuestion {
  pub prompt: String,
  pub key_points: Vec<String>,
  pub evaluation_guidance: String,
  pub difficulty: Difficulty,
  pub module_label: String,
  pub citations: Vec<String>,
}

/// Tagged union over the two question variants, used where the validator
/// walks all ten questions uniformly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
  Choice(ChoiceQuestion),
  Open(OpenQuestion),
}

impl Question {
  pub fn prompt(&self) -> &str {
    match self {
      Question::Choice(q) => &q.prompt,
      Question::Open(q) => &q.prompt,
    }
  }

  pub fn module_label(&self) -> &str {
    match self {
      Question::Choice(q) => &q.module_label,
      Question::Open(q) => &q.module_label,
    }
  }

  pub fn citations(&self) -> &[String] {
    match self {
      Question::Choice(q) => &q.citations,
      Question::Open(q) => &q.citations,
    }
  }
}

/// Validated assessment aggregate: exactly 7 choice + 3 open questions
/// covering at least 5 distinct modules. Constructed only through
/// `validator::build_assessment`, immutable thereafter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
  pub id: Uuid,
  pub level: u8,
  pub choice_questions: Vec<ChoiceQuestion>,
  pub open_questions: Vec<OpenQuestion>,
  pub generated_at: String,
  pub background_text: String,
  pub modules_covered: Vec<String>,
}

/// Both locators produced by a successful dual write, plus the timestamp
/// shared by the two keys.
#[derive(Clone, Debug, Serialize)]
pub struct PersistenceOutcome {
  pub primary_locator: String,
  pub secondary_locator: String,
  pub timestamp: DateTime<Utc>,
}

/// Terminal state of one level generator unit.
#[derive(Clone, Debug)]
pub enum LevelOutcome {
  Succeeded {
    assessment: Assessment,
    persisted: PersistenceOutcome,
  },
  Failed {
    error: EngineError,
    attempts: u32,
  },
}

impl LevelOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, LevelOutcome::Succeeded { .. })
  }
}

/// Aggregated result of a multi-level run, ordered by level number.
#[derive(Clone, Debug)]
pub struct AggregateResponse {
  pub results: Vec<(u8, LevelOutcome)>,
  pub total_duration: std::time::Duration,
  pub speedup_percent: f64,
}
