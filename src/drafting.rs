//! Drafting: prompt construction and model output parsing.
//!
//! Flow:
//! 1) App renders a strict JSON-only prompt from the passage pool, the
//!    calibration profile, and (on retries) the previous violation list.
//! 2) Model returns `multiple_choice_questions` + `open_ended_questions`.
//! 3) App parses the reply deterministically before validation.
//!
//! The domain-to-scenario lookup changes *what* a question is about; the
//! level-to-complexity mapping changes *how hard* it is. The two are
//! independent by design.

use serde::Deserialize;

use crate::config::Prompts;
use crate::domain::{CalibrationProfile, ChoiceQuestion, Difficulty, Domain, ExperienceTier, OpenQuestion};
use crate::sampler::PassagePool;
use crate::util::{fill_template, truncate_chars};

/// Max bytes of passage text embedded per pool entry.
const PASSAGE_EXCERPT_BYTES: usize = 400;

/// Parsed but not yet validated questions.
#[derive(Clone, Debug)]
pub struct DraftQuestions {
  pub choice: Vec<ChoiceQuestion>,
  pub open: Vec<OpenQuestion>,
}

#[derive(Deserialize)]
struct DraftDoc {
  #[serde(default)]
  multiple_choice_questions: Vec<ChoiceQuestion>,
  #[serde(default)]
  open_ended_questions: Vec<OpenQuestion>,
}

/// Fixed domain → scenario framing lookup.
pub fn scenario_frame(domain: Domain) -> &'static str {
  match domain {
    Domain::It => "technical scenarios: APIs, system performance, data pipelines, tooling workflows",
    Domain::Finance => "business scenarios: budgeting, forecasting, reporting, compliance, ROI analysis",
    Domain::Hr => "people scenarios: recruitment, training, performance reviews, employee communications",
    Domain::Marketing => "content scenarios: campaigns, copywriting, personalization, brand consistency",
    Domain::Operations => "process scenarios: workflow automation, documentation, customer service, quality",
    Domain::General => "everyday workplace scenarios: communication, task management, documentation",
  }
}

/// Fixed level → complexity framing lookup, independent of domain.
pub fn complexity_frame(level: u8) -> &'static str {
  match level {
    1 => "foundational: practical tool usage with realistic constraints",
    2 => "intermediate: multi-step workflows and nuanced trade-offs",
    3 => "advanced: system and strategy design under complex constraints",
    _ => "expert: enterprise-scale leadership decisions and governance",
  }
}

/// Tier → per-question difficulty target. Experts get advanced questions
/// within the level; the level itself never changes.
pub fn target_difficulty(tier: ExperienceTier) -> Difficulty {
  match tier {
    ExperienceTier::Beginner => Difficulty::Beginner,
    ExperienceTier::Intermediate => Difficulty::Intermediate,
    ExperienceTier::Advanced | ExperienceTier::Expert => Difficulty::Advanced,
  }
}

/// Render the (system, user) prompt pair for one drafting attempt.
/// `feedback` carries the previous attempt's violations, empty on the first.
pub fn build_draft_prompt(
  prompts: &Prompts,
  level: u8,
  profile: &CalibrationProfile,
  pool: &PassagePool,
  feedback: &[String],
) -> (String, String) {
  let mut passages = String::new();
  for p in &pool.passages {
    passages.push_str(&format!(
      "- [{}] ({}) {}\n",
      p.module_label,
      p.citation,
      truncate_chars(&p.text, PASSAGE_EXCERPT_BYTES)
    ));
  }

  let feedback_block = if feedback.is_empty() {
    String::new()
  } else {
    let mut block = prompts.feedback_header.clone();
    for v in feedback {
      block.push_str(&format!("- {}\n", v));
    }
    block.push('\n');
    block
  };

  let level_str = level.to_string();
  let system = fill_template(
    &prompts.draft_system,
    &[("level", &level_str), ("complexity", complexity_frame(level))],
  );
  let user = fill_template(
    &prompts.draft_user_template,
    &[
      ("level", &level_str),
      ("complexity", complexity_frame(level)),
      ("domain", profile.domain.as_str()),
      ("scenario", scenario_frame(profile.domain)),
      ("difficulty", target_difficulty(profile.tier).as_str()),
      ("background", &profile.background_text),
      ("passages", &passages),
      ("feedback", &feedback_block),
    ],
  );
  (system, user)
}

/// Parse the model reply into draft questions. A parse failure is reported
/// as a plain message so the unit treats it exactly like a validator
/// rejection (it consumes a drafting retry, never a crash).
pub fn parse_draft(text: &str) -> Result<DraftQuestions, String> {
  let doc: DraftDoc = serde_json::from_str(text.trim())
    .map_err(|e| format!("model output was not parseable as the assessment schema: {}", e))?;
  Ok(DraftQuestions { choice: doc.multiple_choice_questions, open: doc.open_ended_questions })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Passage;

  fn profile(domain: Domain, tier: ExperienceTier) -> CalibrationProfile {
    CalibrationProfile {
      background_text: "finance analyst, 2 years".into(),
      domain,
      tier,
      years_experience: Some(2),
    }
  }

  fn pool() -> PassagePool {
    PassagePool {
      passages: vec![Passage {
        text: "Budgeting basics".into(),
        relevance_score: 0.8,
        module_label: "Module 1".into(),
        citation: "s3://kb/m1.pdf".into(),
      }],
      modules_queried: vec!["Module 1".into()],
    }
  }

  #[test]
  fn prompt_carries_scenario_complexity_and_citations() {
    let (system, user) = build_draft_prompt(
      &Prompts::default(),
      3,
      &profile(Domain::Finance, ExperienceTier::Intermediate),
      &pool(),
      &[],
    );
    assert!(system.contains("strict JSON"));
    assert!(user.contains("budgeting"));
    assert!(user.contains("advanced: system and strategy design"));
    assert!(user.contains("s3://kb/m1.pdf"));
    assert!(!user.contains("previous draft"));
  }

  #[test]
  fn feedback_is_embedded_on_retry() {
    let violations = vec!["only 4 distinct module labels (need 5)".to_string()];
    let (_, user) = build_draft_prompt(
      &Prompts::default(),
      1,
      &profile(Domain::It, ExperienceTier::Beginner),
      &pool(),
      &violations,
    );
    assert!(user.contains("rejected"));
    assert!(user.contains("only 4 distinct module labels"));
  }

  #[test]
  fn expert_tier_caps_at_advanced_difficulty() {
    assert_eq!(target_difficulty(ExperienceTier::Expert), Difficulty::Advanced);
    assert_eq!(target_difficulty(ExperienceTier::Beginner), Difficulty::Beginner);
  }

  #[test]
  fn parses_well_formed_draft() {
    let text = r#"{
      "multiple_choice_questions": [{
        "prompt": "Which approach fits?",
        "options": ["a", "b", "c", "d"],
        "correct_index": 1,
        "rationale": "because",
        "difficulty": "beginner",
        "module_label": "Module 1",
        "citations": ["s3://kb/m1.pdf"]
      }],
      "open_ended_questions": [{
        "prompt": "Explain the trade-off.",
        "key_points": ["x", "y"],
        "evaluation_guidance": "look for both points",
        "difficulty": "intermediate",
        "module_label": "Module 2",
        "citations": ["s3://kb/m2.pdf"]
      }]
    }"#;
    let draft = parse_draft(text).expect("draft");
    assert_eq!(draft.choice.len(), 1);
    assert_eq!(draft.open.len(), 1);
    assert_eq!(draft.choice[0].correct_index, 1);
  }

  #[test]
  fn parse_failure_reports_a_message() {
    let err = parse_draft("here are your questions:").unwrap_err();
    assert!(err.contains("not parseable"));
  }
}
