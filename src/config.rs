use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: u64,
    pub refresh_ttl_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Base URL of the external sentiment service, if one is deployed.
    pub sentiment_service_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "smartshopper".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "smartshopper-users".into()),
            ttl_minutes: minutes_setting(
                "JWT_TTL_MINUTES",
                std::env::var("JWT_TTL_MINUTES").ok(),
                60 * 24,
            )?,
            refresh_ttl_minutes: minutes_setting(
                "JWT_REFRESH_TTL_MINUTES",
                std::env::var("JWT_REFRESH_TTL_MINUTES").ok(),
                60 * 24 * 30,
            )?,
        };
        let sentiment_service_url = std::env::var("SENTIMENT_SERVICE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Ok(Self {
            database_url,
            jwt,
            sentiment_service_url,
        })
    }
}

/// Settings for [`crate::client::ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Versioned API root, e.g. `http://localhost:8080/api/v1`.
    pub base_url: String,
    pub timeout: Duration,
    /// Where tokens are persisted between runs.
    pub token_file: PathBuf,
    /// Where the user is sent when the session cannot be recovered.
    pub login_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".into(),
            timeout: Duration::from_secs(10),
            token_file: PathBuf::from(".smartshopper/tokens.json"),
            login_path: "/login".into(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("SMARTSHOPPER_API_URL").unwrap_or(defaults.base_url),
            timeout: env_parse::<u64>("SMARTSHOPPER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            token_file: std::env::var("SMARTSHOPPER_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.token_file),
            login_path: std::env::var("SMARTSHOPPER_LOGIN_PATH").unwrap_or(defaults.login_path),
        }
    }
}

/// A positive number of minutes, `default` when unset.
fn minutes_setting(key: &str, raw: Option<String>, default: u64) -> anyhow::Result<u64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let minutes: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive number of minutes, got {raw:?}"))?;
    if minutes == 0 {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(minutes)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifetimes_must_be_positive_minutes() {
        assert_eq!(minutes_setting("JWT_TTL_MINUTES", None, 1440).unwrap(), 1440);
        assert_eq!(
            minutes_setting("JWT_TTL_MINUTES", Some(" 15 ".into()), 1440).unwrap(),
            15
        );

        let negative = minutes_setting("JWT_TTL_MINUTES", Some("-5".into()), 1440).unwrap_err();
        assert!(negative.to_string().contains("JWT_TTL_MINUTES"));
        assert!(minutes_setting("JWT_TTL_MINUTES", Some("0".into()), 1440).is_err());
        assert!(minutes_setting("JWT_TTL_MINUTES", Some("soon".into()), 1440).is_err());
    }
}
