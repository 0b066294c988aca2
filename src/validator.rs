//! Structural and diversity validation for drafted assessments.
//!
//! Checks run in a fixed order and short-circuit on the first failing
//! class, but collect every violation within that class so the corrective
//! redraft prompt can fix them all at once:
//! 1. exactly 7 choice + 3 open questions;
//! 2. per-question structure: non-blank prompts, 4 distinct options with an
//!    in-range answer, 2-5 non-blank key points per open question;
//! 3. no duplicate prompt text across all 10;
//! 4. at least `min_modules` distinct module labels;
//! 5. every question cites at least one passage actually sampled.
//!
//! `build_assessment` is the only construction path for `Assessment`, so an
//! accepted aggregate is valid by construction.

use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{Assessment, Question};
use crate::drafting::DraftQuestions;
use crate::sampler::PassagePool;

pub const CHOICE_COUNT: usize = 7;
pub const OPEN_COUNT: usize = 3;

pub fn validate_draft(
    draft: &DraftQuestions,
    pool: &PassagePool,
    min_modules: usize,
) -> Result<(), Vec<String>> {
    // Class 1: question mix.
    let mut violations = Vec::new();
    if draft.choice.len() != CHOICE_COUNT {
        violations.push(format!(
            "expected exactly {} multiple choice questions, got {}",
            CHOICE_COUNT,
            draft.choice.len()
        ));
    }
    if draft.open.len() != OPEN_COUNT {
        violations.push(format!(
            "expected exactly {} open-ended questions, got {}",
            OPEN_COUNT,
            draft.open.len()
        ));
    }
    if !violations.is_empty() {
        return Err(violations);
    }

    // Class 2: per-question structure.
    for (i, prompt) in draft
        .choice
        .iter()
        .map(|q| q.prompt.as_str())
        .chain(draft.open.iter().map(|q| q.prompt.as_str()))
        .enumerate()
    {
        if prompt.trim().is_empty() {
            violations.push(format!("question {} has a blank prompt", i + 1));
        }
    }
    for (i, q) in draft.choice.iter().enumerate() {
        let distinct: HashSet<&str> = q.options.iter().map(|o| o.trim()).collect();
        if q.options.len() != 4 || distinct.len() != 4 {
            violations.push(format!(
                "choice question {} must have exactly 4 distinct options, got {} ({} distinct)",
                i + 1,
                q.options.len(),
                distinct.len()
            ));
        }
        if q.correct_index >= q.options.len() {
            violations.push(format!(
                "choice question {} has correct_index {} out of range",
                i + 1,
                q.correct_index
            ));
        }
    }
    for (i, q) in draft.open.iter().enumerate() {
        let blank = q.key_points.iter().any(|p| p.trim().is_empty());
        if !(2..=5).contains(&q.key_points.len()) || blank {
            violations.push(format!(
                "open question {} must have 2-5 non-blank key points, got {}",
                i + 1,
                q.key_points.len()
            ));
        }
    }
    if !violations.is_empty() {
        return Err(violations);
    }

    let all: Vec<Question> = draft
        .choice
        .iter()
        .cloned()
        .map(Question::Choice)
        .chain(draft.open.iter().cloned().map(Question::Open))
        .collect();

    // Class 3: duplicate prompts (case-insensitive).
    let mut seen = HashSet::new();
    for q in &all {
        let key = q.prompt().trim().to_lowercase();
        if !seen.insert(key) {
            violations.push(format!("duplicate prompt text: {:?}", q.prompt()));
        }
    }
    if !violations.is_empty() {
        return Err(violations);
    }

    // Class 4: module diversity.
    let modules: HashSet<String> = all
        .iter()
        .map(|q| q.module_label().trim().to_lowercase())
        .collect();
    if modules.len() < min_modules {
        return Err(vec![format!(
            "only {} distinct module labels across questions (need {})",
            modules.len(),
            min_modules
        )]);
    }

    // Class 5: provenance. Each question needs one citation that matches a
    // passage actually retrieved for this level.
    for (i, q) in all.iter().enumerate() {
        let traceable = q.citations().iter().any(|c| pool.contains_citation(c));
        if !traceable {
            violations.push(format!(
                "question {} has no citation matching a sampled passage (got {:?})",
                i + 1,
                q.citations()
            ));
        }
    }
    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(())
}

/// Validate and, on acceptance, assemble the immutable aggregate.
pub fn build_assessment(
    level: u8,
    background_text: &str,
    draft: DraftQuestions,
    pool: &PassagePool,
    min_modules: usize,
) -> Result<Assessment, Vec<String>> {
    validate_draft(&draft, pool, min_modules)?;

    let mut modules: Vec<String> = draft
        .choice
        .iter()
        .map(|q| q.module_label.clone())
        .chain(draft.open.iter().map(|q| q.module_label.clone()))
        .collect();
    modules.sort();
    modules.dedup();

    Ok(Assessment {
        id: Uuid::new_v4(),
        level,
        choice_questions: draft.choice,
        open_questions: draft.open,
        generated_at: Utc::now().to_rfc3339(),
        background_text: background_text.to_string(),
        modules_covered: modules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChoiceQuestion, Difficulty, OpenQuestion, Passage};

    fn pool_with(citations: &[&str]) -> PassagePool {
        PassagePool {
            passages: citations
                .iter()
                .enumerate()
                .map(|(i, c)| Passage {
                    text: format!("passage {}", i),
                    relevance_score: 0.5,
                    module_label: format!("Module {}", i + 1),
                    citation: c.to_string(),
                })
                .collect(),
            modules_queried: vec![],
        }
    }

    fn choice(prompt: &str, module: &str, citation: &str) -> ChoiceQuestion {
        ChoiceQuestion {
            prompt: prompt.to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: 2,
            rationale: "because".into(),
            difficulty: Difficulty::Intermediate,
            module_label: module.to_string(),
            citations: vec![citation.to_string()],
        }
    }

    fn open(prompt: &str, module: &str, citation: &str) -> OpenQuestion {
        OpenQuestion {
            prompt: prompt.to_string(),
            key_points: vec!["x".into(), "y".into()],
            evaluation_guidance: "look for both".into(),
            difficulty: Difficulty::Intermediate,
            module_label: module.to_string(),
            citations: vec![citation.to_string()],
        }
    }

    fn valid_draft(citation: &str) -> DraftQuestions {
        let modules = ["M1", "M2", "M3", "M4", "M5"];
        DraftQuestions {
            choice: (0..7)
                .map(|i| choice(&format!("choice q{}", i), modules[i % 5], citation))
                .collect(),
            open: (0..3)
                .map(|i| open(&format!("open q{}", i), modules[i % 5], citation))
                .collect(),
        }
    }

    #[test]
    fn accepts_well_formed_draft() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        assert!(validate_draft(&valid_draft("s3://kb/a.pdf"), &pool, 5).is_ok());
    }

    #[test]
    fn rejects_wrong_question_mix() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        let mut draft = valid_draft("s3://kb/a.pdf");
        draft.open.pop();
        let violations = validate_draft(&draft, &pool, 5).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("open-ended"));
    }

    #[test]
    fn rejects_duplicate_options_and_bad_index_together() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        let mut draft = valid_draft("s3://kb/a.pdf");
        draft.choice[0].options = vec!["a".into(), "a".into(), "b".into(), "c".into()];
        draft.choice[1].correct_index = 9;
        let violations = validate_draft(&draft, &pool, 5).unwrap_err();
        // Both violations of the structure class are collected.
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn rejects_open_questions_without_key_points() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        let mut draft = valid_draft("s3://kb/a.pdf");
        for q in &mut draft.open {
            q.key_points.clear();
        }
        let violations = validate_draft(&draft, &pool, 5).unwrap_err();
        assert_eq!(violations.len(), 3);
        assert!(violations[0].contains("2-5 non-blank key points"));
        assert!(build_assessment(1, "bg", draft, &pool, 5).is_err());
    }

    #[test]
    fn rejects_too_many_or_blank_key_points() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        let mut draft = valid_draft("s3://kb/a.pdf");
        draft.open[0].key_points = vec!["a".into(); 6];
        draft.open[1].key_points = vec!["a".into(), "  ".into()];
        let violations = validate_draft(&draft, &pool, 5).unwrap_err();
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn rejects_blank_prompts() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        let mut draft = valid_draft("s3://kb/a.pdf");
        draft.choice[2].prompt = "   ".into();
        let violations = validate_draft(&draft, &pool, 5).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("blank prompt"));
    }

    #[test]
    fn rejects_duplicate_prompt_across_variants() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        let mut draft = valid_draft("s3://kb/a.pdf");
        draft.open[0].prompt = "Choice Q0".into(); // case-insensitive clash
        draft.choice[0].prompt = "choice q0".into();
        let violations = validate_draft(&draft, &pool, 5).unwrap_err();
        assert!(violations[0].contains("duplicate prompt"));
    }

    #[test]
    fn rejects_insufficient_module_diversity() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        let mut draft = valid_draft("s3://kb/a.pdf");
        for q in &mut draft.choice {
            q.module_label = "M1".into();
        }
        for q in &mut draft.open {
            q.module_label = "M2".into();
        }
        let violations = validate_draft(&draft, &pool, 5).unwrap_err();
        assert!(violations[0].contains("distinct module labels"));
    }

    #[test]
    fn rejects_fabricated_citations() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        let mut draft = valid_draft("s3://kb/a.pdf");
        draft.choice[3].citations = vec!["s3://kb/invented.pdf".into()];
        let violations = validate_draft(&draft, &pool, 5).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("no citation matching"));
    }

    #[test]
    fn build_assessment_collects_distinct_modules() {
        let pool = pool_with(&["s3://kb/a.pdf"]);
        let assessment =
            build_assessment(2, "finance analyst", valid_draft("s3://kb/a.pdf"), &pool, 5)
                .expect("assessment");
        assert_eq!(assessment.level, 2);
        assert_eq!(assessment.choice_questions.len(), 7);
        assert_eq!(assessment.open_questions.len(), 3);
        assert_eq!(assessment.modules_covered.len(), 5);
    }
}
