//! Application state: the assembled engine behind an `Arc`.
//!
//! This module owns the wiring only: env config, prompt overrides, and the
//! three HTTP collaborators (retrieval, generation, storage). Everything
//! stateful lives inside the collaborators' clients; the engine itself is
//! immutable after startup.

use std::sync::Arc;

use tracing::instrument;

use crate::config::{load_agent_config_from_env, EngineConfig};
use crate::engine::Engine;
use crate::generation::HttpGenerator;
use crate::retrieval::HttpRetrieval;
use crate::storage::HttpObjectStore;

pub struct AppState {
    pub engine: Engine,
}

impl AppState {
    /// Build state from env: load config, prompt overrides, and collaborators.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = EngineConfig::from_env();
        let prompts = load_agent_config_from_env()
            .map(|c| c.prompts)
            .unwrap_or_default();

        let retrieval = Arc::new(HttpRetrieval::new(&config.retrieval_base_url));
        let generator = Arc::new(HttpGenerator::from_env());
        let storage = Arc::new(HttpObjectStore::from_env());

        Self {
            engine: Engine { config, prompts, retrieval, generator, storage },
        }
    }
}
