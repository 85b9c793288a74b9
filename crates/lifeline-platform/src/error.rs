use thiserror::Error;

/// Failures surfaced by the platform. Messages are meant to be shown to the
/// user as-is.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("User already registered")]
    DuplicateRegistration,

    #[error("Not signed in")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The platform refused the call and said why.
    #[error("{0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Transport(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

impl From<anyhow::Error> for PlatformError {
    fn from(e: anyhow::Error) -> Self {
        PlatformError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        PlatformError::Transport(e.to_string())
    }
}
