use std::sync::Arc;

use reqwest::{Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, instrument, warn};

use crate::{
    client::{
        error::ApiError,
        token_store::{StoredTokens, TokenStore},
    },
    config::ClientConfig,
    models::{RefreshRequest, TokenPair},
};

/// Raised when the session cannot be recovered and the user must log in again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoginRequired { login_path: String },
}

/// A request description that can be re-sent after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    recover_auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            recover_auth: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn opt_param<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(
            serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?,
        );
        Ok(self)
    }

    /// A 401 on this request is final; no refresh is attempted.
    pub fn without_auth_recovery(mut self) -> Self {
        self.recover_auth = false;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// HTTP client for the `/api/v1` surface. Attaches the stored bearer token and
/// recovers from an expired access token with one refresh and one retry.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    login_path: String,
    tokens: Arc<dyn TokenStore>,
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            login_path: config.login_path.clone(),
            tokens,
            refresh_lock: Mutex::new(()),
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    // ---- token persistence ----

    fn stored(&self) -> StoredTokens {
        self.tokens.load().unwrap_or_else(|e| {
            warn!(error = %e, "token store unreadable; treating as logged out");
            StoredTokens::default()
        })
    }

    pub fn access_token(&self) -> Option<String> {
        self.stored().access_token
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn store_tokens(&self, pair: &TokenPair) {
        if let Err(e) = self.tokens.save(&StoredTokens::from(pair)) {
            error!(error = %e, "failed to persist tokens");
        }
    }

    pub fn clear_tokens(&self) {
        if let Err(e) = self.tokens.clear() {
            error!(error = %e, "failed to clear tokens");
        }
    }

    // ---- request pipeline ----

    pub async fn send<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        let res = self.execute(&req).await?;
        decode(res).await
    }

    #[instrument(skip(self, req), fields(method = %req.method, path = %req.path))]
    async fn execute(&self, req: &ApiRequest) -> Result<Response, ApiError> {
        let token = self.access_token();
        let res = self.dispatch(req, token.as_deref()).await?;
        if res.status() != StatusCode::UNAUTHORIZED || !req.recover_auth {
            return Ok(res);
        }

        debug!("access token rejected, attempting recovery");
        match self.recover(token.as_deref()).await {
            Some(fresh) => self.dispatch(req, Some(&fresh)).await,
            None => Ok(res),
        }
    }

    async fn dispatch(&self, req: &ApiRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, req.path);
        let mut builder = self.http.request(req.method.clone(), url);
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder.send().await.map_err(|e| {
            warn!(error = %e, "request failed before a response arrived");
            ApiError::from(e)
        })
    }

    /// Single-flight: callers queue on the lock, and whoever finds the token
    /// already rotated reuses it instead of refreshing again.
    async fn recover(&self, stale: Option<&str>) -> Option<String> {
        let _guard = self.refresh_lock.lock().await;

        let stored = self.stored();
        match (stored.access_token.as_deref(), stale) {
            (Some(current), seen) if Some(current) != seen => {
                debug!("token rotated by a concurrent refresh");
                return Some(current.to_string());
            }
            // torn down by an earlier failed recovery or a logout
            (None, Some(_)) => return None,
            _ => {}
        }

        let Some(refresh_token) = stored.refresh_token else {
            self.require_login();
            return None;
        };

        match self.refresh_with(&refresh_token).await {
            Ok(pair) => Some(pair.access_token),
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                self.require_login();
                None
            }
        }
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let req = ApiRequest::post("/auth/refresh")
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            })?
            .without_auth_recovery();
        let res = self.dispatch(&req, None).await?;
        let pair: TokenPair = decode(res).await?;
        self.store_tokens(&pair);
        debug!("tokens refreshed");
        Ok(pair)
    }

    /// Explicit refresh with the stored refresh token, serialized with the
    /// automatic one.
    pub async fn refresh_session(&self) -> Result<TokenPair, ApiError> {
        let _guard = self.refresh_lock.lock().await;
        let refresh_token = self
            .stored()
            .refresh_token
            .ok_or(ApiError::Unauthorized(None))?;
        self.refresh_with(&refresh_token).await
    }

    fn require_login(&self) {
        self.clear_tokens();
        warn!(login_path = %self.login_path, "session unrecoverable");
        // no subscribers is fine
        let _ = self.events.send(AuthEvent::LoginRequired {
            login_path: self.login_path.clone(),
        });
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
    let status = res.status();
    let body = res.text().await.map_err(ApiError::from)?;
    if !status.is_success() {
        return Err(ApiError::from_response(status, &body));
    }
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    use super::test_support::*;
    use super::*;
    use crate::client::token_store::MemoryTokenStore;

    /// Backend whose `/ping` only accepts `new-access`, with a counting
    /// `/auth/refresh` that succeeds when `refresh_ok`.
    fn backend(refreshes: Hits, pings: Hits, refresh_ok: bool, delay: Duration) -> Router {
        Router::new()
            .route(
                "/api/v1/ping",
                get(move |headers: HeaderMap| {
                    let pings = pings.clone();
                    async move {
                        pings.bump();
                        if bearer(&headers).as_deref() == Some("new-access") {
                            (AxumStatus::OK, Json(json!({"message": "pong"})))
                        } else {
                            (
                                AxumStatus::UNAUTHORIZED,
                                Json(json!({"detail": "Could not validate credentials"})),
                            )
                        }
                    }
                }),
            )
            .route(
                "/api/v1/auth/refresh",
                post(move |Json(body): Json<serde_json::Value>| {
                    let refreshes = refreshes.clone();
                    async move {
                        refreshes.bump();
                        tokio::time::sleep(delay).await;
                        if refresh_ok && body["refresh_token"] == "old-refresh" {
                            (AxumStatus::OK, Json(pair("new-access", "new-refresh")))
                        } else {
                            (
                                AxumStatus::UNAUTHORIZED,
                                Json(json!({"detail": "Invalid refresh token"})),
                            )
                        }
                    }
                }),
            )
    }

    #[derive(Debug, serde::Deserialize)]
    struct Pong {
        message: String,
    }

    #[tokio::test]
    async fn expired_token_triggers_one_refresh_and_one_retry() {
        let (refreshes, pings) = (Hits::default(), Hits::default());
        let base = spawn(backend(refreshes.clone(), pings.clone(), true, Duration::ZERO)).await;
        let store = Arc::new(MemoryTokenStore::with_tokens("old-access", "old-refresh"));
        let api = client(&base, store.clone());

        let pong: Pong = api.send(ApiRequest::get("/ping")).await.unwrap();

        assert_eq!(pong.message, "pong");
        assert_eq!(refreshes.get(), 1);
        assert_eq!(pings.get(), 2);
        let stored = store.load().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("new-access"));
        assert_eq!(stored.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[tokio::test]
    async fn failed_refresh_clears_tokens_and_requests_login() {
        let (refreshes, pings) = (Hits::default(), Hits::default());
        let base = spawn(backend(refreshes.clone(), pings.clone(), false, Duration::ZERO)).await;
        let store = Arc::new(MemoryTokenStore::with_tokens("old-access", "old-refresh"));
        let api = client(&base, store.clone());
        let mut events = api.subscribe_events();

        let err = api.send::<Pong>(ApiRequest::get("/ping")).await.unwrap_err();

        assert_eq!(err, ApiError::Unauthorized(Some("Could not validate credentials".into())));
        assert_eq!(refreshes.get(), 1);
        assert_eq!(pings.get(), 1);
        assert_eq!(store.load().unwrap(), StoredTokens::default());
        assert_eq!(
            events.try_recv().unwrap(),
            AuthEvent::LoginRequired {
                login_path: "/login".into()
            }
        );
    }

    #[tokio::test]
    async fn concurrent_401s_share_a_single_refresh() {
        let (refreshes, pings) = (Hits::default(), Hits::default());
        let base = spawn(backend(
            refreshes.clone(),
            pings.clone(),
            true,
            Duration::from_millis(100),
        ))
        .await;
        let store = Arc::new(MemoryTokenStore::with_tokens("old-access", "old-refresh"));
        let api = client(&base, store);

        let calls = (0..4).map(|_| {
            let api = api.clone();
            tokio::spawn(async move { api.send::<Pong>(ApiRequest::get("/ping")).await })
        });
        for handle in calls.collect::<Vec<_>>() {
            assert_eq!(handle.await.unwrap().unwrap().message, "pong");
        }

        assert_eq!(refreshes.get(), 1);
        assert!(pings.get() <= 8);
    }

    #[tokio::test]
    async fn requests_without_recovery_do_not_refresh() {
        let (refreshes, pings) = (Hits::default(), Hits::default());
        let base = spawn(backend(refreshes.clone(), pings.clone(), true, Duration::ZERO)).await;
        let store = Arc::new(MemoryTokenStore::with_tokens("old-access", "old-refresh"));
        let api = client(&base, store.clone());

        let err = api
            .send::<Pong>(ApiRequest::get("/ping").without_auth_recovery())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized(_)));
        assert_eq!(refreshes.get(), 0);
        assert_eq!(store.load().unwrap().access_token.as_deref(), Some("old-access"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let api = client(
            &format!("http://{addr}/api/v1"),
            Arc::new(MemoryTokenStore::new()),
        );
        let err = api.send::<Pong>(ApiRequest::get("/ping")).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[test]
    fn request_builder_collects_params() {
        let req = ApiRequest::get("/search")
            .param("q", "iPhone 15")
            .opt_param("limit", Some(20))
            .opt_param::<String>("brand", None);
        assert_eq!(req.query.len(), 2);
        assert_eq!(req.path(), "/search");
        assert!(req.recover_auth);
    }
}
