use thiserror::Error;

use lifeline_platform::PlatformError;
use lifeline_types::models::Role;

/// Input problems caught before anything is sent to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password must be at least 6 characters")]
    PasswordTooShort,

    #[error("Full name is required")]
    MissingFullName,

    #[error("Name is required")]
    MissingName,

    #[error("Phone number is required")]
    MissingPhone,

    #[error("Please select an emergency type")]
    MissingEmergencyType,

    #[error("Please provide your location")]
    MissingLocation,

    #[error("Location is out of range")]
    LocationOutOfRange,

    #[error("Photo must be an image")]
    UnsupportedPhoto,
}

#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("This email is already registered. Please sign in instead.")]
    DuplicateRegistration,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Any other rejection, with the platform's own message.
    #[error("{0}")]
    Remote(String),
}

impl From<PlatformError> for AuthFailure {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::InvalidCredentials => AuthFailure::InvalidCredentials,
            PlatformError::DuplicateRegistration => AuthFailure::DuplicateRegistration,
            other => AuthFailure::Remote(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Only {0} accounts can submit help requests")]
    WrongRole(Role),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Photo upload failed: {0}")]
    Upload(PlatformError),

    #[error("Submission cancelled")]
    Cancelled,

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Failures of the dashboard and lifecycle flows.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("This page is for {0} accounts")]
    WrongRole(Role),

    /// The conditional write found the request in a state it cannot move from.
    #[error("This request can no longer be changed")]
    NotApplicable,

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_auth_errors_keep_their_meaning() {
        assert!(matches!(
            AuthFailure::from(PlatformError::DuplicateRegistration),
            AuthFailure::DuplicateRegistration
        ));
        assert_eq!(
            AuthFailure::DuplicateRegistration.to_string(),
            "This email is already registered. Please sign in instead."
        );
        match AuthFailure::from(PlatformError::Transport("connection reset".into())) {
            AuthFailure::Remote(msg) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
