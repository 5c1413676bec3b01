use crate::api::GenerativeModel; // Import trait
use std::sync::Arc;

// Shared by every request handler. Built once at startup and never mutated,
// so concurrent requests need no locking.
#[derive(Clone)]
pub struct AppState {
    pub api_provider: Arc<dyn GenerativeModel>, // Hold the trait object
}

impl AppState {
    pub fn new(api_provider: Arc<dyn GenerativeModel>) -> Self {
        Self { api_provider }
    }

    pub fn model_name(&self) -> &str {
        self.api_provider.model_name()
    }
}
