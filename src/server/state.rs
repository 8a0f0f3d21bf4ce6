use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::job::JobStore;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`);
/// background tasks clone it again when they are spawned.
#[derive(Clone)]
pub struct AppState {
    /// Live job records.
    pub store: JobStore,
    /// Service configuration.
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            store: JobStore::new(),
            config: Arc::new(config),
        }
    }
}
