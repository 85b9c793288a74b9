use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use lifeline_app::{AuthFailure, FlowError, Notice, SubmitError, ValidationError};
use lifeline_platform::PlatformError;

/// A failed action: a status code plus the notice the page shows.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub notice: Notice,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, notice: Notice::error(message) }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Please sign in to continue")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{}: {}", self.status, self.notice.message);
        } else {
            warn!("{}: {}", self.status, self.notice.message);
        }
        (self.status, Json(self.notice)).into_response()
    }
}

fn platform_status(e: &PlatformError) -> StatusCode {
    match e {
        PlatformError::InvalidCredentials | PlatformError::Unauthorized => StatusCode::UNAUTHORIZED,
        PlatformError::DuplicateRegistration => StatusCode::CONFLICT,
        PlatformError::Forbidden(_) => StatusCode::FORBIDDEN,
        PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
        PlatformError::Rejected(_) => StatusCode::BAD_REQUEST,
        PlatformError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PlatformError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        Self::new(platform_status(&e), e.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    }
}

impl From<AuthFailure> for ApiError {
    fn from(e: AuthFailure) -> Self {
        let status = match &e {
            AuthFailure::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthFailure::DuplicateRegistration => StatusCode::CONFLICT,
            AuthFailure::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuthFailure::Remote(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::WrongRole(_) => Self::new(StatusCode::FORBIDDEN, e.to_string()),
            SubmitError::Validation(v) => v.into(),
            SubmitError::Upload(p) => Self::new(platform_status(&p), format!("Photo upload failed: {}", p)),
            SubmitError::Cancelled => Self::new(StatusCode::REQUEST_TIMEOUT, "Submission cancelled"),
            SubmitError::Platform(p) => p.into(),
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        match e {
            FlowError::WrongRole(_) => Self::new(StatusCode::FORBIDDEN, e.to_string()),
            FlowError::NotApplicable => Self::new(StatusCode::CONFLICT, e.to_string()),
            FlowError::Platform(p) => p.into(),
        }
    }
}
