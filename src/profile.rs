//! Free-text calibration parsing: a small keyword classifier that derives
//! a domain and an experience tier from the background description.
//!
//! Parsing is inherently fuzzy, so the output is advisory context for
//! prompt construction only. Unrecognized input falls back to
//! general/beginner explicitly instead of failing.

use tracing::debug;

use crate::domain::{CalibrationProfile, Domain, ExperienceTier};

/// Backgrounds shorter than this are treated as absent and get the
/// forgiving default profile (general/beginner). Not an error.
pub const MIN_BACKGROUND_CHARS: usize = 12;

const BEGINNER_KEYS: &[&str] = &["beginner", "new to", "no experience", "just starting"];
const EXPERT_KEYS: &[&str] = &["expert", "senior", "10+ years", "principal", "cto", "head of"];
const ADVANCED_KEYS: &[&str] = &["advanced", "proficient", "5+ years", "lead"];

pub fn parse_profile(background_text: &str) -> CalibrationProfile {
    let text = background_text.trim();
    let profile = if text.chars().count() < MIN_BACKGROUND_CHARS {
        CalibrationProfile {
            background_text: text.to_string(),
            domain: Domain::General,
            tier: ExperienceTier::Beginner,
            years_experience: None,
        }
    } else {
        let lower = text.to_lowercase();
        CalibrationProfile {
            background_text: text.to_string(),
            domain: detect_domain(&lower),
            tier: detect_tier(&lower),
            years_experience: detect_years(&lower),
        }
    };
    debug!(
        target: "engine",
        domain = profile.domain.as_str(),
        tier = profile.tier.as_str(),
        years = ?profile.years_experience,
        "Calibration profile parsed"
    );
    profile
}

fn detect_tier(lower: &str) -> ExperienceTier {
    if BEGINNER_KEYS.iter().any(|k| lower.contains(k)) {
        ExperienceTier::Beginner
    } else if EXPERT_KEYS.iter().any(|k| lower.contains(k)) {
        ExperienceTier::Expert
    } else if ADVANCED_KEYS.iter().any(|k| lower.contains(k)) {
        ExperienceTier::Advanced
    } else {
        ExperienceTier::Intermediate
    }
}

fn detect_domain(lower: &str) -> Domain {
    let table: &[(Domain, &[&str])] = &[
        (
            Domain::Finance,
            &["finance", "financial", "accounting", "accountant", "banking", "budget", "controller"],
        ),
        (
            Domain::It,
            &["software", "developer", "data scientist", "data analyst", "engineer", "devops", "programmer", "sysadmin"],
        ),
        (
            Domain::Hr,
            &["human resources", "recruit", "talent", "people ops", "hr manager", "hr specialist"],
        ),
        (
            Domain::Marketing,
            &["marketing", "brand", "copywrit", "creative director", "content strategist", "social media"],
        ),
        (
            Domain::Operations,
            &["operations", "logistics", "supply chain", "process manager", "customer service", "project manager"],
        ),
    ];

    for (domain, keys) in table {
        if keys.iter().any(|k| lower.contains(k)) {
            return *domain;
        }
    }
    // "hr" alone is too short for substring matching; check it as a token.
    if lower.split_whitespace().any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == "hr") {
        return Domain::Hr;
    }
    if lower.split_whitespace().any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == "it") {
        return Domain::It;
    }
    Domain::General
}

fn detect_years(lower: &str) -> Option<u32> {
    for token in lower.split_whitespace() {
        let t = token.trim_matches(|c: char| !c.is_ascii_digit());
        if t.is_empty() {
            continue;
        }
        if let Ok(n) = t.parse::<u32>() {
            // Years of experience, not dates or headcounts.
            if n <= 60 {
                return Some(n);
            }
        }
    }
    None
}
