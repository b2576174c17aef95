use std::sync::Arc;

use sidequest_core::QuestService;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Stateless across requests; every call builds its own pipeline context
    pub service: Arc<QuestService>,
}

impl AppState {
    pub fn new(service: QuestService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
