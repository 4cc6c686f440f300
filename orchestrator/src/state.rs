//! Application state for the orchestrator.

use std::sync::Arc;

use common::config::AppConfig;

use crate::service::Orchestrator;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
        }
    }
}
