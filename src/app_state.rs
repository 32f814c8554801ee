use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{inference::InferenceBackend, storage::ObjectStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ObjectStore>,
    pub inference: Arc<dyn InferenceBackend>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        inference: Arc<dyn InferenceBackend>,
        config: AppConfig,
    ) -> Self {
        Self {
            storage,
            inference,
            config: Arc::new(config),
        }
    }
}
