//! HTTP endpoint handlers. Thin wrappers that forward to the engine.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, instrument, warn};

use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

/// Run a multi-level assessment generation.
/// - 400: malformed request (no levels, out-of-range level)
/// - 200: at least one level produced and persisted an assessment
/// - 502: every requested level failed
#[instrument(level = "info", skip(state, body), fields(levels = ?body.levels, background_len = body.background_text.len()))]
pub async fn http_post_assessments(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AssessmentIn>,
) -> impl IntoResponse {
  let request = match state.engine.parse_request(&body.levels, &body.background_text) {
    Ok(request) => request,
    Err(e) => {
      warn!(target: "engine", error = %e, "Assessment request rejected");
      let out = RequestErrorOut { error: ErrorOut { kind: e.kind(), message: e.to_string() } };
      return (StatusCode::BAD_REQUEST, Json(serde_json::to_value(out).unwrap_or_default()));
    }
  };

  let aggregate = state.engine.run(request).await;
  let succeeded = aggregate.results.iter().filter(|(_, o)| o.is_success()).count();
  let status = if succeeded == 0 { StatusCode::BAD_GATEWAY } else { StatusCode::OK };
  info!(
    target: "engine",
    succeeded,
    total = aggregate.results.len(),
    http_status = status.as_u16(),
    "HTTP assessment run served"
  );
  let out = to_run_out(&aggregate);
  (status, Json(serde_json::to_value(out).unwrap_or_default()))
}
