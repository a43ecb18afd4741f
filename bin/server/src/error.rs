//! Domain error types for server operations.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rootcause::Report;
use uitid_connect_identity::{ProviderError, StoreError};

/// Errors that stop the server from starting.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration is missing or invalid.
    Configuration { details: String },
    /// The database could not be reached or migrated.
    Database { details: String },
    /// The UiTID client could not be built.
    Provider { details: String },
    /// The listener could not be bound or the server stopped with an error.
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { details } => write!(f, "invalid configuration: {details}"),
            Self::Database { details } => write!(f, "database setup failed: {details}"),
            Self::Provider { details } => write!(f, "uitid client setup failed: {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Errors while answering a request.
///
/// Details are logged; the response only carries a generic message.
#[derive(Debug)]
pub enum RequestError {
    /// Session, token or binding storage failed.
    Store(Report<StoreError>),
    /// A provider call outside the handshake failed.
    Provider(Report<ProviderError>),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(report) => write!(f, "store error: {report}"),
            Self::Provider(report) => write!(f, "provider error: {report}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<Report<StoreError>> for RequestError {
    fn from(report: Report<StoreError>) -> Self {
        Self::Store(report)
    }
}

impl From<Report<ProviderError>> for RequestError {
    fn from(report: Report<ProviderError>) -> Self {
        Self::Provider(report)
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
            Self::Provider(_) => (StatusCode::BAD_GATEWAY, "UiTID is unavailable"),
        };
        tracing::error!(error = %self, "request failed");
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_error_display() {
        let err = StartupError::Configuration {
            details: "missing field `base_url`".to_string(),
        };
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn store_error_hides_details_from_response() {
        let report: Report<StoreError> = StoreError::Unavailable {
            details: "password authentication failed".to_string(),
        }
        .into();
        let response = RequestError::from(report).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn provider_error_maps_to_bad_gateway() {
        let report: Report<ProviderError> = ProviderError::UnexpectedStatus {
            operation: "user".to_string(),
            status: 503,
        }
        .into();
        let response = RequestError::from(report).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
