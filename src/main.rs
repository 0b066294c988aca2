//! Calibra · Assessment Orchestration Backend
//!
//! - Axum HTTP API
//! - Concurrent per-level assessment generation against a retrieval service,
//!   a chat-completion generator, and an S3-compatible object store
//!
//! Important env variables:
//!   PORT            : u16 (default 3000)
//!   RETRIEVAL_BASE_URL   : default "http://localhost:8081"
//!   CONTENT_SOURCE_LEVEL_{1..4}_ID : per-level source ids
//!   GENERATION_API_KEY   : bearer token for the generation endpoint (optional)
//!   GENERATION_BASE_URL  : default "https://api.openai.com/v1"
//!   GENERATION_MODEL     : default "gpt-4o"
//!   STORAGE_BASE_URL     : default "http://localhost:9000"
//!   STORAGE_BUCKET       : default "assessments"
//!   STORAGE_PREFIX       : default "learning_path/assessments"
//!   AGENT_CONFIG_PATH    : path to TOML config (prompt overrides)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod profile;
mod config;
mod retrieval;
mod generation;
mod storage;
mod sampler;
mod drafting;
mod validator;
mod persist;
mod unit;
mod engine;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (config, prompts, collaborator clients).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "calibra_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
