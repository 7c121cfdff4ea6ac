//! Handler-level error type and its mapping onto HTTP responses.
//!
//! Library errors ([`SessionError`], [`StoreError`], ...) convert into
//! [`ApiError`]; [`ApiError::into_response`] is the only place that turns an
//! error category into a status code.

use crate::http::response::{Response, StatusCode};
use crate::profile::model::DraftError;
use crate::profile::store::StoreError;
use crate::session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Validation or session-guard failure, reported as `{"status": ...}`.
    #[error("{0}")]
    Forbidden(String),
    /// The addressed resource does not exist.
    #[error("not found")]
    NotFound,
    /// Anything else; the client gets an empty 500.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn forbidden(status: impl Into<String>) -> Self {
        ApiError::Forbidden(status.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Forbidden(_) => StatusCode::Forbidden,
            ApiError::NotFound => StatusCode::NotFound,
            ApiError::Internal(_) => StatusCode::InternalServerError,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            ApiError::Forbidden(status) => Response::status_json(StatusCode::Forbidden, &status),
            ApiError::NotFound => Response::not_found(),
            ApiError::Internal(e) => {
                tracing::error!(error = %format!("{:#}", e), "Handler failed");
                Response::internal_error()
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Store(store) => store.into(),
            other => ApiError::Forbidden(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(anyhow::Error::new(e))
    }
}

impl From<DraftError> for ApiError {
    fn from(e: DraftError) -> Self {
        ApiError::Forbidden(e.to_string())
    }
}
