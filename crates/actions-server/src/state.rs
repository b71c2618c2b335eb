use std::sync::Arc;

use actions_core::config::Settings;
use actions_core::ActionRepository;

/// Shared application state passed to all route handlers.
///
/// The repository and settings are constructed once at startup and injected
/// here; handlers hold no other cross-request state.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn ActionRepository>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(repo: Arc<dyn ActionRepository>, settings: Settings) -> Self {
        Self {
            repo,
            settings: Arc::new(settings),
        }
    }
}
