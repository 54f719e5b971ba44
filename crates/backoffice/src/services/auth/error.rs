//! Authentication error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur during sign-in, refresh and sign-out.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity provider rejected the credentials.
    #[error("{0}")]
    InvalidCredentials(String),

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] table1837_core::EmailError),

    /// No session to act on.
    #[error("not signed in")]
    NoSession,

    /// The client's auth context has shut down.
    #[error("auth context closed")]
    ContextClosed,

    /// Identity provider could not be reached or answered unexpectedly.
    #[error("identity provider error: {0}")]
    Backend(#[from] BackendError),
}

impl AuthError {
    /// Message shown inline on the login page.
    #[must_use]
    pub fn login_message(&self) -> String {
        match self {
            Self::InvalidCredentials(message) => message.clone(),
            Self::InvalidEmail(e) => e.to_string(),
            Self::NoSession | Self::ContextClosed => "Please try signing in again".to_string(),
            Self::Backend(_) => "An unexpected error occurred".to_string(),
        }
    }
}

/// Classify a sign-in failure from the identity provider.
pub(crate) fn from_sign_in(error: BackendError) -> AuthError {
    if error.is_auth_rejection() {
        let message = match &error {
            BackendError::Api { message, .. } if !message.is_empty() => message.clone(),
            _ => "Invalid login credentials".to_string(),
        };
        AuthError::InvalidCredentials(message)
    } else {
        AuthError::Backend(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_carries_provider_message() {
        let err = from_sign_in(BackendError::Api {
            status: 400,
            code: Some("invalid_credentials".to_string()),
            message: "Invalid login credentials".to_string(),
        });
        assert!(matches!(err, AuthError::InvalidCredentials(_)));
        assert_eq!(err.login_message(), "Invalid login credentials");
    }

    #[test]
    fn test_server_failure_is_not_a_credential_error() {
        let err = from_sign_in(BackendError::Api {
            status: 503,
            code: None,
            message: "upstream down".to_string(),
        });
        assert!(matches!(err, AuthError::Backend(_)));
        assert_eq!(err.login_message(), "An unexpected error occurred");
    }
}
