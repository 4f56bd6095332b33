//! Error types for credential storage and OAuth operations

use crate::identity::ValidationError;

/// Errors from credential storage and OAuth operations.
///
/// `Http`, `TokenExchange` and `InvalidCredentials` all come from the token
/// endpoint; [`Error::is_exchange`] groups them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether the error came out of a call to the token endpoint.
    pub fn is_exchange(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::TokenExchange(_) | Error::InvalidCredentials(_)
        )
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
