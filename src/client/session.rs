use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

use thiserror::Error;
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    client::{
        error::ApiError,
        http::{ApiClient, AuthEvent},
    },
    models::{LoginRequest, PreferencesUpdate, ProfileUpdate, RegisterRequest, UserProfile},
};

/// Snapshot of who is logged in.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user: Option<UserProfile>,
    /// True until the first [`SessionManager::bootstrap`] finishes.
    pub loading: bool,
}

impl SessionState {
    fn booting() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }

    fn anonymous() -> Self {
        Self {
            user: None,
            loading: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Human-readable reason a session operation did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AuthFailure {
    pub message: String,
}

impl AuthFailure {
    fn from_api(err: &ApiError, fallback: &str) -> Self {
        Self {
            message: err.detail().unwrap_or(fallback).to_string(),
        }
    }
}

pub type AuthResult = Result<(), AuthFailure>;

/// Owns the client-side session. Views hold an `Arc` and watch [`SessionState`].
pub struct SessionManager {
    api: Arc<ApiClient>,
    state: watch::Sender<SessionState>,
    bootstrapped: AtomicBool,
}

impl SessionManager {
    pub fn new(api: Arc<ApiClient>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::booting());
        Arc::new(Self {
            api,
            state,
            bootstrapped: AtomicBool::new(false),
        })
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Restores the session from persisted tokens. Only the first call does anything.
    pub async fn bootstrap(&self) {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return;
        }

        if !self.api.has_access_token() {
            debug!("no stored token, starting anonymous");
            self.state.send_replace(SessionState::anonymous());
            return;
        }

        match self.api.me().await {
            Ok(user) => {
                info!(user_id = %user.id, "session restored");
                self.state.send_replace(SessionState {
                    user: Some(user),
                    loading: false,
                });
            }
            Err(e) => {
                warn!(error = %e, "stored session rejected");
                self.logout();
            }
        }
    }

    pub async fn login(&self, credentials: LoginRequest) -> AuthResult {
        let pair = self
            .api
            .login(&credentials)
            .await
            .map_err(|e| {
                warn!(error = %e, "login rejected");
                AuthFailure::from_api(&e, "Login failed")
            })?;
        self.api.store_tokens(&pair);

        match self.api.me().await {
            Ok(user) => {
                info!(user_id = %user.id, "logged in");
                self.state.send_replace(SessionState {
                    user: Some(user),
                    loading: false,
                });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "profile fetch after login failed");
                self.api.clear_tokens();
                Err(AuthFailure::from_api(&e, "Login failed"))
            }
        }
    }

    /// Creates the account, then logs in with the same username and password.
    pub async fn register(&self, data: RegisterRequest) -> AuthResult {
        if let Err(e) = self.api.register(&data).await {
            warn!(error = %e, "registration rejected");
            return Err(AuthFailure::from_api(&e, "Registration failed"));
        }
        self.login(LoginRequest {
            username_or_email: data.username,
            password: data.password,
        })
        .await
    }

    /// Drops the local session. Safe to call any number of times.
    pub fn logout(&self) {
        self.api.clear_tokens();
        self.state.send_replace(SessionState::anonymous());
        debug!("session cleared");
    }

    /// Tells the backend first, ignoring its answer, then logs out locally.
    pub async fn logout_remote(&self) {
        if self.api.has_access_token() {
            if let Err(e) = self.api.logout().await {
                debug!(error = %e, "remote logout ignored");
            }
        }
        self.logout();
    }

    pub async fn refresh_token(&self) -> bool {
        match self.api.refresh_session().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "manual refresh failed");
                self.logout();
                false
            }
        }
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> AuthResult {
        let user = self.api.update_me(&update).await.map_err(|e| {
            warn!(error = %e, "profile update rejected");
            AuthFailure::from_api(&e, "Profile update failed")
        })?;
        self.state.send_modify(|s| s.user = Some(user));
        Ok(())
    }

    pub async fn update_preferences(&self, update: PreferencesUpdate) -> AuthResult {
        self.api
            .update_preferences(&update)
            .await
            .map(|_| ())
            .map_err(|e| AuthFailure::from_api(&e, "Preferences update failed"))
    }

    /// Resets the session whenever the client gives up on recovering it.
    pub fn spawn_auth_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.api.subscribe_events();
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::LoginRequired { login_path }) => {
                        let Some(manager) = manager.upgrade() else { break };
                        info!(%login_path, "login required");
                        manager.logout();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "auth events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
