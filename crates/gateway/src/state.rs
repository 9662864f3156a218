use std::sync::Arc;

use hd_domain::config::Config;
use hd_sessions::SessionRegistry;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Owner of every broadcast session.
    pub registry: Arc<SessionRegistry>,
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        api_token_hash: Option<Vec<u8>>,
    ) -> Self {
        Self {
            config,
            registry,
            api_token_hash,
        }
    }
}
