//! Level Generator Unit: the sequential pipeline for one requested level.
//!
//! Sampling → Drafting → Validating (with a bounded corrective-redraft
//! loop) → Persisting. A rejected draft feeds its full violation list back
//! into the next prompt; a malformed model reply consumes a retry through
//! the same path. Units never touch each other's state, so one failing
//! level leaves its siblings untouched.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{CalibrationProfile, LevelOutcome, LevelRequest};
use crate::drafting::{build_draft_prompt, parse_draft};
use crate::error::EngineError;
use crate::generation::Generator;
use crate::persist::PersistClient;
use crate::sampler::DiversitySampler;
use crate::validator::build_assessment;

pub struct LevelUnit {
    pub request: LevelRequest,
    pub profile: CalibrationProfile,
    pub sampler: Arc<DiversitySampler>,
    pub generator: Arc<dyn Generator>,
    pub persist: Arc<PersistClient>,
    pub prompts: Prompts,
    pub min_modules: usize,
    /// Redrafts allowed after a rejection (attempts = budget + 1).
    pub draft_retries: u32,
}

impl LevelUnit {
    #[instrument(level = "info", skip(self), fields(level = self.request.level, source = %self.request.content_source_id))]
    pub async fn run(self) -> LevelOutcome {
        let level = self.request.level;

        let pool = match self.sampler.sample(&self.request.content_source_id, level).await {
            Ok(pool) => pool,
            Err(error) => {
                warn!(target: "engine", level, error = %error, "Sampling failed, unit aborted");
                return LevelOutcome::Failed { error, attempts: 0 };
            }
        };

        let mut feedback: Vec<String> = Vec::new();
        let mut attempts = 0u32;
        for attempt in 0..=self.draft_retries {
            attempts = attempt + 1;
            let (system, user) =
                build_draft_prompt(&self.prompts, level, &self.profile, &pool, &feedback);

            let reply = match self.generator.generate(&system, &user).await {
                Ok(reply) => reply,
                Err(msg) => {
                    warn!(target: "engine", level, attempt = attempts, error = %msg, "Generation call failed");
                    return LevelOutcome::Failed {
                        error: EngineError::Generation(msg),
                        attempts,
                    };
                }
            };

            let draft = match parse_draft(&reply) {
                Ok(draft) => draft,
                Err(msg) => {
                    warn!(target: "engine", level, attempt = attempts, error = %msg, "Draft not parseable, redrafting");
                    feedback = vec![msg];
                    continue;
                }
            };

            match build_assessment(
                level,
                &self.profile.background_text,
                draft,
                &pool,
                self.min_modules,
            ) {
                Ok(assessment) => {
                    info!(
                        target: "engine",
                        level,
                        attempt = attempts,
                        modules = assessment.modules_covered.len(),
                        "Draft accepted"
                    );
                    return match self.persist.persist(&assessment).await {
                        Ok(persisted) => LevelOutcome::Succeeded { assessment, persisted },
                        Err(error) => LevelOutcome::Failed { error, attempts },
                    };
                }
                Err(violations) => {
                    warn!(
                        target: "engine",
                        level,
                        attempt = attempts,
                        violations = violations.len(),
                        "Draft rejected, redrafting with feedback"
                    );
                    feedback = violations;
                }
            }
        }

        LevelOutcome::Failed {
            error: EngineError::ValidationExhausted(feedback.join("; ")),
            attempts,
        }
    }
}
