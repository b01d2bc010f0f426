//! HTTP-facing error types.
//!
//! Internal details are logged with `tracing`; responses carry only
//! user-safe messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keyward_platform_access::{DirectoryError, LinkingError, Provider};
use rootcause::prelude::Report;
use std::fmt;

/// Errors that fail a provider login or callback request.
#[derive(Debug)]
pub enum CallbackError {
    /// The provider's OAuth application is not configured.
    NotConfigured { provider: Provider },
    /// The callback arrived without the state cookie set at login.
    MissingAuthState,
    /// The state cookie could not be decoded.
    InvalidAuthState,
    /// The state parameter does not match the state cookie.
    CsrfMismatch,
    /// The provider reported an error instead of an authorization code.
    Denied { provider: Provider, reason: String },
    /// The authorization code could not be exchanged, or the identity could
    /// not be read from the provider.
    Handshake { provider: Provider, details: String },
    /// Resolving or applying the outcome failed.
    Linking(Report<LinkingError>),
    /// The session store failed.
    Session { details: String },
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured { provider } => write!(f, "{provider} sign-in is not configured"),
            Self::MissingAuthState => write!(f, "missing auth state"),
            Self::InvalidAuthState => write!(f, "invalid auth state"),
            Self::CsrfMismatch => write!(f, "CSRF token mismatch"),
            Self::Denied { provider, reason } => {
                write!(f, "{provider} denied the authorization request: {reason}")
            }
            Self::Handshake { provider, details } => {
                write!(f, "{provider} handshake failed: {details}")
            }
            Self::Linking(report) => write!(f, "{}", report.current_context()),
            Self::Session { details } => write!(f, "session store error: {details}"),
        }
    }
}

impl From<Report<LinkingError>> for CallbackError {
    fn from(report: Report<LinkingError>) -> Self {
        Self::Linking(report)
    }
}

impl CallbackError {
    /// Returns the status code and user-safe message for this error.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::NotConfigured { provider } => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{provider} sign-in is not available"),
            ),
            Self::MissingAuthState => (
                StatusCode::BAD_REQUEST,
                "Missing authentication state".to_string(),
            ),
            Self::InvalidAuthState | Self::CsrfMismatch => {
                (StatusCode::BAD_REQUEST, "Invalid request state".to_string())
            }
            Self::Denied { provider, .. } => (
                StatusCode::FORBIDDEN,
                format!("{provider} sign-in was cancelled"),
            ),
            Self::Handshake { .. } => (
                StatusCode::BAD_GATEWAY,
                "Authentication failed".to_string(),
            ),
            Self::Linking(report) => match report.current_context() {
                LinkingError::ExternalService { provider, .. } => (
                    StatusCode::BAD_GATEWAY,
                    format!("{provider} is temporarily unavailable, please try again"),
                ),
                LinkingError::Directory(DirectoryError::AccountNotFound { .. }) => {
                    (StatusCode::NOT_FOUND, "Account not found".to_string())
                }
                LinkingError::Directory(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                ),
            },
            Self::Session { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(error = %self, "callback failed");
        } else {
            tracing::warn!(error = %self, "callback rejected");
        }

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_platform_access::MembershipError;

    #[test]
    fn external_service_failure_is_bad_gateway() {
        let report = Report::from(LinkingError::ExternalService {
            provider: Provider::GitHub,
            source: MembershipError::Transport {
                details: "connection reset".to_string(),
            },
        });

        let (status, message) = CallbackError::from(report).status_and_message();

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(message, "GitHub is temporarily unavailable, please try again");
    }

    #[test]
    fn directory_failure_hides_details() {
        let report = Report::from(LinkingError::Directory(DirectoryError::Storage {
            details: "connection refused to 10.0.0.5".to_string(),
        }));

        let (status, message) = CallbackError::from(report).status_and_message();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("10.0.0.5"));
    }

    #[test]
    fn csrf_mismatch_is_bad_request() {
        let response = CallbackError::CsrfMismatch.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unconfigured_provider_is_unavailable() {
        let error = CallbackError::NotConfigured {
            provider: Provider::Google,
        };
        let (status, message) = error.status_and_message();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(message, "Google sign-in is not available");
    }
}
