//! Error taxonomy for the assessment engine.
//!
//! Two layers:
//! - `CollabError` classifies failures at the collaborator boundary
//!   (retrieval and storage) into transient vs permanent, which drives
//!   the local retry policy of the component owning the call.
//! - `EngineError` is the terminal, caller-visible form. Transient errors
//!   never escape as such; only their exhausted form does.

use thiserror::Error;

/// Failure at a collaborator boundary. Transient errors are retryable
/// within the owning component; permanent errors fail immediately.
#[derive(Debug, Clone, Error)]
pub enum CollabError {
  #[error("transient: {0}")]
  Transient(String),
  #[error("permanent: {0}")]
  Permanent(String),
}

impl CollabError {
  pub fn is_transient(&self) -> bool {
    matches!(self, CollabError::Transient(_))
  }
}

/// Terminal error attached to a level outcome or returned for a malformed
/// request. One of these kinds is reported per failed level; a failure in
/// one level never aborts its siblings.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
  #[error("level {0} is outside the supported range 1-4")]
  InvalidLevel(u8),
  #[error("request contains no levels")]
  EmptyRequest,
  #[error("content source unavailable: {0}")]
  ContentUnavailable(String),
  #[error("validation retry budget exhausted: {0}")]
  ValidationExhausted(String),
  #[error("generation failed: {0}")]
  Generation(String),
  #[error("persistence failed: {0}")]
  Persistence(String),
  #[error("level generation exceeded its {0}s budget")]
  Timeout(u64),
}

impl EngineError {
  /// Stable machine-readable kind string used on the wire.
  pub fn kind(&self) -> &'static str {
    match self {
      EngineError::InvalidLevel(_) => "invalid_level",
      EngineError::EmptyRequest => "empty_request",
      EngineError::ContentUnavailable(_) => "content_unavailable",
      EngineError::ValidationExhausted(_) => "validation_exhausted",
      EngineError::Generation(_) => "generation_failed",
      EngineError::Persistence(_) => "persistence_failed",
      EngineError::Timeout(_) => "timeout",
    }
  }
}
