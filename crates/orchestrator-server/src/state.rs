use orchestrator::agent::Agent;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    /// Process-wide credential for requests that bring none
    pub fallback_token: Option<String>,
    pub cookie_name: String,
    pub request_timeout: Duration,
}
