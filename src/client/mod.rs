//! Session-aware client for the SmartShopper API: token persistence, refresh
//! on 401, the session manager views observe, route guarding and the search
//! and dashboard flows.

use std::sync::Arc;

pub mod api;
pub mod autocomplete;
pub mod dashboard;
pub mod error;
pub mod guard;
pub mod http;
pub mod offers;
pub mod search_view;
pub mod session;
pub mod token_store;

pub use api::SearchQuery;
pub use error::ApiError;
pub use guard::{Decision, Requirement, RouteGuard, RouteTable};
pub use http::{ApiClient, ApiRequest, AuthEvent};
pub use session::{AuthFailure, AuthResult, SessionManager, SessionState};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};

use crate::config::ClientConfig;

/// Client and session backed by the token file named in `config`, with the
/// auth listener already running. Must be called inside a tokio runtime.
pub fn connect(config: &ClientConfig) -> Result<Arc<SessionManager>, ApiError> {
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(&config.token_file));
    let api = Arc::new(ApiClient::new(config, store)?);
    let session = SessionManager::new(api);
    session.spawn_auth_listener();
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_starts_anonymous_from_missing_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            token_file: dir.path().join("tokens.json"),
            ..ClientConfig::default()
        };
        let session = connect(&config).unwrap();
        session.bootstrap().await;
        assert!(!session.state().is_authenticated());
        assert!(!session.state().loading);
    }
}
