//! Form posts and buttons: auth, request submission and the lifecycle
//! transitions.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use lifeline_app::location::{Coordinates, ReportedPosition};
use lifeline_app::router::{self, Route};
use lifeline_app::victim::{self, PhotoAttachment, RequestForm};
use lifeline_app::volunteer::{self, AcceptOutcome, AvailabilityChange};
use lifeline_app::{IdentityContext, IdentityState, Notice, notifications};
use lifeline_platform::Platform;
use lifeline_types::api::NewAccount;
use lifeline_types::models::{RescueUpdate, VolunteerProfile};

use crate::error::ApiError;
use crate::pages::{RequestCard, Viewer};
use crate::session::{self, Caller, Identity};

#[derive(Debug, Serialize)]
pub struct Outcome<T> {
    #[serde(flatten)]
    pub body: T,
    pub notice: Notice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<&'static str>,
}

fn outcome<T>(body: T, notice: Notice) -> Json<Outcome<T>> {
    Json(Outcome { body, notice, redirect: None })
}

// ── Auth ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SignInBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignedIn {
    pub viewer: Viewer,
}

pub async fn sign_in<P: Platform>(
    State(platform): State<P>,
    jar: CookieJar,
    Json(body): Json<SignInBody>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = IdentityContext::new(platform);
    let principal = identity.sign_in(body.email.trim(), &body.password).await?;
    let jar = jar.add(session::session_cookie(&principal.session.access_token));

    let body = Outcome {
        body: SignedIn { viewer: Viewer::of(&principal) },
        notice: Notice::success("Welcome back!"),
        redirect: Some(Route::Landing.path()),
    };
    Ok((jar, Json(body)))
}

pub async fn sign_up<P: Platform>(
    State(platform): State<P>,
    jar: CookieJar,
    Json(account): Json<NewAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = IdentityContext::new(platform);
    let principal = identity.sign_up(&account).await?;
    let jar = jar.add(session::session_cookie(&principal.session.access_token));

    let body = Outcome {
        body: SignedIn { viewer: Viewer::of(&principal) },
        notice: Notice::success("Account created successfully!"),
        redirect: Some(router::home_for(principal.role()).path()),
    };
    Ok((StatusCode::CREATED, jar, Json(body)))
}

#[derive(Debug, Serialize)]
pub struct SignedOut {}

/// Clears the cookie even when the platform call fails.
pub async fn sign_out<P: Platform>(
    State(platform): State<P>,
    Identity(identity): Identity,
    jar: CookieJar,
) -> impl IntoResponse {
    if let IdentityState::SignedIn(principal) = &identity {
        match platform.sign_out(&principal.session).await {
            Ok(()) => info!("{} signed out", principal.profile.email),
            Err(e) => warn!("Sign-out for {} failed: {}", principal.profile.email, e),
        }
    }
    let jar = jar.remove(session::expired_cookie());
    let body = Outcome {
        body: SignedOut {},
        notice: Notice::info("Signed out"),
        redirect: Some(Route::Landing.path()),
    };
    (jar, Json(body))
}

// ── Victim ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LocateBody {
    #[serde(flatten)]
    pub form: RequestForm,
    /// What the browser's geolocation lookup produced, if anything.
    #[serde(default)]
    pub position: Option<Coordinates>,
}

#[derive(Debug, Serialize)]
pub struct Located {
    pub form: RequestForm,
}

pub async fn locate(
    Caller(_principal): Caller,
    Json(body): Json<LocateBody>,
) -> Json<Outcome<Located>> {
    let mut form = body.form;
    let notice = form.capture_location(&ReportedPosition(body.position)).await;
    outcome(Located { form }, notice)
}

#[derive(Debug, Deserialize)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    /// Base64, standard alphabet.
    pub data: String,
}

impl PhotoUpload {
    fn decode(self) -> Result<PhotoAttachment, ApiError> {
        let bytes = STANDARD.decode(self.data.trim()).map_err(|_| {
            ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "Photo could not be read")
        })?;
        Ok(PhotoAttachment { file_name: self.file_name, content_type: self.content_type, bytes })
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    #[serde(flatten)]
    pub form: RequestForm,
    #[serde(default)]
    pub photo: Option<PhotoUpload>,
}

#[derive(Debug, Serialize)]
pub struct Submitted {
    pub request: RequestCard,
}

/// Runs the submission in its own task. If the client goes away first the
/// drop guard cancels it, and the flow cleans up any uploaded photo.
pub async fn submit_request<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
    Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError> {
    let photo = body.photo.map(PhotoUpload::decode).transpose()?;
    let form = body.form;

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let task = tokio::spawn(async move {
        victim::submit_request(&platform, &principal, &form, photo, &cancel).await
    });
    let request = task
        .await
        .map_err(|e| ApiError::internal(format!("Submission task failed: {}", e)))??;
    guard.disarm();

    let body = Outcome {
        body: Submitted { request: RequestCard::new(request) },
        notice: Notice::success("Help request submitted successfully!"),
        redirect: Some(Route::VictimMyRequests.path()),
    };
    Ok((StatusCode::CREATED, Json(body)))
}

#[derive(Debug, Serialize)]
pub struct Changed {
    pub request: RequestCard,
}

pub async fn cancel_request<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Outcome<Changed>>, ApiError> {
    let request = victim::cancel_request(&platform, &principal, request_id).await?;
    Ok(outcome(Changed { request: RequestCard::new(request) }, Notice::success("Request cancelled")))
}

pub async fn rescue_log<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Vec<RescueUpdate>>, ApiError> {
    Ok(Json(victim::rescue_log(&platform, &principal, request_id).await?))
}

// ── Volunteer ───────────────────────────────────────────────────────────

/// 200 with the claimed request, or 409 when another volunteer won.
pub async fn accept_request<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Outcome<Changed>>, ApiError> {
    match volunteer::accept_request(&platform, &principal, request_id).await? {
        AcceptOutcome::Accepted(request) => Ok(outcome(
            Changed { request: RequestCard::with_directions(request) },
            Notice::success("Request accepted! Navigate to the victim."),
        )),
        AcceptOutcome::AlreadyTaken => {
            Err(ApiError::new(StatusCode::CONFLICT, "Failed to accept request"))
        }
    }
}

pub async fn complete_rescue<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Outcome<Changed>>, ApiError> {
    let request = volunteer::complete_rescue(&platform, &principal, request_id).await?;
    Ok(outcome(Changed { request: RequestCard::new(request) }, Notice::success("Marked as rescued")))
}

#[derive(Debug, Serialize)]
pub struct Availability {
    pub profile: VolunteerProfile,
}

pub async fn set_availability<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
    Json(change): Json<AvailabilityChange>,
) -> Result<Json<Outcome<Availability>>, ApiError> {
    let profile = volunteer::set_availability(&platform, &principal, &change).await?;
    Ok(outcome(Availability { profile }, Notice::success("Availability updated")))
}

// ── Notifications ───────────────────────────────────────────────────────

pub async fn mark_notification_read<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    notifications::mark_read(&platform, &principal, notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
