//! Engine configuration from environment variables, plus optional TOML
//! prompt overrides (AGENT_CONFIG_PATH).
//!
//! See `EngineConfig` for the env schema and `Prompts` for the template set.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

/// Supported proficiency levels. Each one maps to its own content source id,
/// independently configurable (two levels sharing an id is a deployment
/// choice, never an engine assumption).
pub const SUPPORTED_LEVELS: std::ops::RangeInclusive<u8> = 1..=4;

/// Shared transient-retry schedule (sampler and persistence client).
pub fn retry_backoff() -> Vec<Duration> {
  vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
  pub retrieval_base_url: String,
  pub content_sources: HashMap<u8, String>,
  pub storage_prefix: String,
  pub unit_timeout: Duration,
  pub max_in_flight: usize,
  pub max_results_per_query: usize,
  pub min_modules: usize,
  /// Redrafts allowed after a validator rejection (attempts = budget + 1).
  pub draft_retry_budget: u32,
}

fn env_or(key: &str, default: &str) -> String {
  std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
  std::env::var(key).ok().and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

impl EngineConfig {
  pub fn from_env() -> Self {
    let mut content_sources = HashMap::new();
    for level in SUPPORTED_LEVELS {
      let key = format!("CONTENT_SOURCE_LEVEL_{}_ID", level);
      let default = format!("level-{}-curriculum", level);
      content_sources.insert(level, env_or(&key, &default));
    }

    let cfg = Self {
      retrieval_base_url: env_or("RETRIEVAL_BASE_URL", "http://localhost:8081"),
      content_sources,
      storage_prefix: env_or("STORAGE_PREFIX", "learning_path/assessments"),
      unit_timeout: Duration::from_secs(env_parse("UNIT_TIMEOUT_SECS", 60u64)),
      max_in_flight: env_parse("MAX_IN_FLIGHT", 4usize).max(1),
      max_results_per_query: env_parse("KB_MAX_RESULTS", 10usize),
      min_modules: env_parse("MIN_MODULES", 5usize),
      draft_retry_budget: env_parse("DRAFT_RETRIES", 2u32),
    };

    info!(
      target: "calibra_backend",
      retrieval = %cfg.retrieval_base_url,
      prefix = %cfg.storage_prefix,
      timeout_secs = cfg.unit_timeout.as_secs(),
      max_in_flight = cfg.max_in_flight,
      "Engine configuration loaded"
    );
    cfg
  }

  pub fn content_source_id(&self, level: u8) -> Option<&str> {
    self.content_sources.get(&level).map(|s| s.as_str())
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompt templates used by the sampler and the drafting step. Defaults are
/// sensible for curriculum assessment generation; override them in TOML if
/// you need to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub overview_query_template: String,
  pub module_query_template: String,
  pub draft_system: String,
  pub draft_user_template: String,
  pub feedback_header: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      overview_query_template:
        "List the main modules, courses, and topics in Level {level} curriculum".into(),
      module_query_template:
        "Detailed content, concepts, and examples for {module} in Level {level} curriculum".into(),
      draft_system: "You are a knowledge assessment item writer. Respond ONLY with strict JSON, no prose.\n\
        The JSON object has exactly two keys:\n\
        - multiple_choice_questions: exactly 7 items, each {\"prompt\": string, \"options\": [4 distinct strings], \"correct_index\": 0-3, \"rationale\": string, \"difficulty\": \"beginner\"|\"intermediate\"|\"advanced\", \"module_label\": string, \"citations\": [strings]}\n\
        - open_ended_questions: exactly 3 items, each {\"prompt\": string, \"key_points\": [2-5 strings], \"evaluation_guidance\": string, \"difficulty\": ..., \"module_label\": ..., \"citations\": [strings]}\n\
        Rules:\n\
        - No two prompts may repeat.\n\
        - Cover at least 5 distinct module_label values across all 10 questions.\n\
        - Every citation MUST be copied verbatim from the provided passages; never invent one.\n\
        - All four options must be plausible; force trade-off decisions.".into(),
      draft_user_template: "Level: {level} ({complexity})\n\
        Audience domain: {domain} — frame scenarios accordingly: {scenario}\n\
        Target difficulty tag: {difficulty}\n\
        Candidate background: {background}\n\n\
        Curriculum passages (module / citation / excerpt):\n{passages}\n\n\
        {feedback}Generate the assessment JSON now.".into(),
      feedback_header:
        "The previous draft was rejected. Fix ALL of the following before answering:\n".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO
/// error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "calibra_backend", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "calibra_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "calibra_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
