//! Application state for the counting service.

use std::sync::Arc;

use common::config::AppConfig;

use crate::store::CountStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<CountStore>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig, store: CountStore) -> Self {
        Self {
            config,
            store: Arc::new(store),
        }
    }
}
