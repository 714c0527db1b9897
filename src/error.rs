use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Error returned by every handler; rendered as `{"detail": "..."}`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Constraint named by a Postgres unique violation, if that is what `err` is.
pub fn unique_violation(err: &anyhow::Error) -> Option<String> {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

impl AppError {
    /// 400 with `detail` when a write lost a race on a unique index, else internal.
    pub fn duplicate(err: anyhow::Error, detail: &str) -> Self {
        match unique_violation(&err) {
            Some(constraint) => {
                warn!(%constraint, "unique constraint rejected write");
                AppError::BadRequest(detail.into())
            }
            None => AppError::Internal(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({ "detail": detail }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{borrow::Cow, error::Error as StdError, fmt};

    use sqlx::error::{DatabaseError, ErrorKind};

    /// Stand-in for a Postgres error on a write.
    #[derive(Debug)]
    pub struct FakeDbError {
        pub unique: bool,
        pub constraint: Option<&'static str>,
    }

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message())
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.unique.then(|| Cow::Borrowed("23505"))
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            if self.unique {
                ErrorKind::UniqueViolation
            } else {
                ErrorKind::Other
            }
        }
    }

    /// A repository error as handlers see it: sqlx error under anyhow context.
    pub fn db_error(unique: bool, constraint: Option<&'static str>) -> anyhow::Error {
        anyhow::Error::new(sqlx::Error::Database(Box::new(FakeDbError { unique, constraint })))
            .context("write row")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::db_error;
    use super::*;

    #[test]
    fn unique_violation_seen_through_context() {
        let err = db_error(true, Some("price_alerts_one_active_idx"));
        assert_eq!(
            unique_violation(&err).as_deref(),
            Some("price_alerts_one_active_idx")
        );
        assert!(unique_violation(&db_error(false, None)).is_none());
        assert!(unique_violation(&anyhow::anyhow!("pool timed out")).is_none());
    }

    #[test]
    fn duplicate_maps_only_unique_violations_to_400() {
        let dup = AppError::duplicate(
            db_error(true, Some("price_alerts_one_active_idx")),
            "Active price alert already exists for this product",
        );
        assert_eq!(dup.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            dup.to_string(),
            "Active price alert already exists for this product"
        );

        let other = AppError::duplicate(db_error(false, None), "unused");
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn statuses_follow_variants() {
        assert_eq!(
            AppError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("db down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let res = AppError::Unauthorized("Invalid or expired token".into()).into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            res.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }
}
