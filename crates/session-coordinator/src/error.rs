//! Session error types.

use thiserror::Error;

/// Session error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Login rejected by the authentication endpoint
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The renewal token was refused; the session is over
    #[error("Authorization rejected (HTTP {status})")]
    AuthorizationRejected { status: u16 },

    /// An outbound call stayed unauthorized after the renewal path ran
    #[error("Request unauthorized (HTTP {status})")]
    RequestUnauthorized { status: u16 },

    /// Non-success status outside the auth taxonomy
    #[error("Unexpected response (HTTP {status}): {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Network-level failure that leaves the session intact
    #[error("Transport error: {0}")]
    Transport(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] credential_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,
}

impl SessionError {
    /// Returns true if this error is transient and the next tick or user
    /// action may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Transport(_) | SessionError::Timeout => true,
            SessionError::UnexpectedStatus { status, .. } => *status >= 500,
            SessionError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Returns true if the renewal token itself was refused.
    pub fn is_authorization_rejected(&self) -> bool {
        matches!(self, SessionError::AuthorizationRejected { .. })
    }

    /// HTTP 401 and 403 mean the credential was refused.
    pub fn is_authorization_status(status: u16) -> bool {
        status == 401 || status == 403
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
