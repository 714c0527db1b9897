use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Failure of a call made through [`super::ApiClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized")]
    Unauthorized(Option<String>),

    #[error("request rejected ({status})")]
    Validation { status: u16, message: Option<String> },

    #[error("server error ({status})")]
    Server { status: u16, message: Option<String> },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("request could not be built: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Maps a non-success response to the matching variant.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = server_message(body);
        if status == StatusCode::UNAUTHORIZED {
            ApiError::Unauthorized(message)
        } else if status.is_server_error() {
            ApiError::Server {
                status: status.as_u16(),
                message,
            }
        } else {
            ApiError::Validation {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Message supplied by the server, if it sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized(m)
            | ApiError::Validation { message: m, .. }
            | ApiError::Server { message: m, .. } => m.as_deref(),
            _ => None,
        }
    }

    /// Text fit for showing to a user.
    pub fn message(&self) -> String {
        if let Some(detail) = self.detail() {
            return detail.to_string();
        }
        match self {
            ApiError::Network(_) => "Unable to reach the server. Check your connection.",
            ApiError::Unauthorized(_) => "Your session has expired. Please log in again.",
            ApiError::Validation { .. } => "The request was rejected.",
            ApiError::Server { .. } => "Something went wrong on our side. Please try again.",
            ApiError::Decode(_) | ApiError::InvalidRequest(_) => {
                "Unexpected response from the server."
            }
        }
        .to_string()
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Validation { status, .. } | ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Pulls `detail` (or `message`) out of an error body. Validation error lists
/// contribute their first `msg`.
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let pick = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Array(items) => items
                .first()
                .and_then(|i| i.get("msg"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    };
    value
        .get("detail")
        .and_then(pick)
        .or_else(|| value.get("message").and_then(pick))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_preferred_over_message() {
        let e = ApiError::from_response(
            StatusCode::BAD_REQUEST,
            r#"{"detail":"Username already registered","message":"ignored"}"#,
        );
        assert_eq!(e.message(), "Username already registered");
        assert_eq!(e.status(), Some(400));
    }

    #[test]
    fn message_field_and_validation_lists_are_understood() {
        let e = ApiError::from_response(StatusCode::NOT_FOUND, r#"{"message":"gone"}"#);
        assert_eq!(e.detail(), Some("gone"));

        let e = ApiError::from_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail":[{"loc":["body","email"],"msg":"value is not a valid email"}]}"#,
        );
        assert_eq!(e.detail(), Some("value is not a valid email"));
    }

    #[test]
    fn generic_text_when_server_is_silent() {
        let e = ApiError::from_response(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert!(matches!(e, ApiError::Server { status: 502, message: None }));
        assert!(e.message().contains("try again"));

        let e = ApiError::from_response(StatusCode::UNAUTHORIZED, "");
        assert_eq!(e, ApiError::Unauthorized(None));
        assert!(e.message().contains("log in"));

        assert!(ApiError::Network("timeout".into()).detail().is_none());
    }
}
