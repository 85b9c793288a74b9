use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use lifeline_platform::{PHOTO_BUCKET, Platform, PlatformResult};
use lifeline_types::api::{NewHelpRequest, RequestQuery};
use lifeline_types::events::{ChangeFilter, Table};
use lifeline_types::lifecycle::Transition;
use lifeline_types::models::{EmergencyType, HelpRequest, RequestStatus, RescueUpdate, Role};

use crate::error::{FlowError, SubmitError, ValidationError};
use crate::identity::Principal;
use crate::live::LiveList;
use crate::location::LocationProvider;
use crate::notice::Notice;
use crate::validation;

/// Requests shown on the victim dashboard.
pub const RECENT_LIMIT: u32 = 5;

// ── Request form ────────────────────────────────────────────────────────

/// What the victim fills in. Zero coordinates mean "not captured yet".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestForm {
    pub name: String,
    pub phone: String,
    pub emergency_type: Option<EmergencyType>,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

impl RequestForm {
    /// Empty form with name and phone taken from the profile.
    pub fn for_principal(principal: &Principal) -> Self {
        Self {
            name: principal.profile.full_name.clone(),
            phone: principal.profile.phone.clone().unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<EmergencyType, ValidationError> {
        let kind = self.emergency_type.ok_or(ValidationError::MissingEmergencyType)?;
        validation::validate_coordinates(self.latitude, self.longitude)?;
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.phone.trim().is_empty() {
            return Err(ValidationError::MissingPhone);
        }
        Ok(kind)
    }

    /// Fill in coordinates from the device. Failure leaves the form as it
    /// was so the user can type an address instead.
    pub async fn capture_location<L: LocationProvider>(&mut self, provider: &L) -> Notice {
        match provider.current_position().await {
            Ok(coords) => {
                self.latitude = coords.latitude;
                self.longitude = coords.longitude;
                self.address = coords.address();
                Notice::success("Location detected")
            }
            Err(e) => Notice::error(e.to_string()),
        }
    }

    fn to_row(&self, victim_id: Uuid, kind: EmergencyType, photo_url: Option<String>) -> NewHelpRequest {
        let non_blank = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        NewHelpRequest {
            victim_id,
            victim_name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            emergency_type: kind,
            description: non_blank(&self.description),
            latitude: self.latitude,
            longitude: self.longitude,
            location_address: non_blank(&self.address),
            photo_url,
        }
    }
}

// ── Photos ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoAttachment {
    /// Extension from the file name, else from the content type.
    pub fn extension(&self) -> String {
        let from_name = self
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
        match from_name {
            Some(ext) => ext.to_ascii_lowercase(),
            None => match self.content_type.as_str() {
                "image/png" => "png".into(),
                "image/gif" => "gif".into(),
                "image/webp" => "webp".into(),
                "image/heic" => "heic".into(),
                _ => "jpg".into(),
            },
        }
    }
}

/// `{user_id}/{unix_millis}.{ext}`: one folder per uploader, so concurrent
/// submissions never collide across users.
pub fn photo_path(user_id: Uuid, at: DateTime<Utc>, extension: &str) -> String {
    format!("{}/{}.{}", user_id, at.timestamp_millis(), extension)
}

// ── Submission ──────────────────────────────────────────────────────────

/// Upload the photo (if any), then insert the request. No row is written if
/// the upload fails or the submission is cancelled first.
pub async fn submit_request<P: Platform>(
    platform: &P,
    principal: &Principal,
    form: &RequestForm,
    photo: Option<PhotoAttachment>,
    cancel: &CancellationToken,
) -> Result<HelpRequest, SubmitError> {
    if principal.role() != Role::Victim {
        return Err(SubmitError::WrongRole(Role::Victim));
    }
    let kind = form.validate()?;
    if photo.as_ref().is_some_and(|p| !p.content_type.starts_with("image/")) {
        return Err(ValidationError::UnsupportedPhoto.into());
    }
    if cancel.is_cancelled() {
        return Err(SubmitError::Cancelled);
    }

    let session = &principal.session;
    let mut uploaded: Option<String> = None;

    if let Some(photo) = photo {
        let path = photo_path(principal.user_id(), Utc::now(), &photo.extension());
        let upload = platform.upload_object(session, PHOTO_BUCKET, &path, photo.bytes, &photo.content_type);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Submission cancelled during upload of {}", path);
                // The object may have landed before the abort.
                discard_photo(platform, principal, &path).await;
                return Err(SubmitError::Cancelled);
            }
            result = upload => result.map_err(SubmitError::Upload)?,
        }
        uploaded = Some(path);
    }

    if cancel.is_cancelled() {
        if let Some(path) = &uploaded {
            discard_photo(platform, principal, path).await;
        }
        return Err(SubmitError::Cancelled);
    }

    let photo_url = uploaded.as_deref().map(|path| platform.public_url(PHOTO_BUCKET, path));
    let row = form.to_row(principal.user_id(), kind, photo_url);

    match platform.insert_request(session, &row).await {
        Ok(request) => {
            info!("Submitted {} request {}", request.emergency_type, request.id);
            Ok(request)
        }
        Err(e) => {
            if let Some(path) = &uploaded {
                discard_photo(platform, principal, path).await;
            }
            Err(e.into())
        }
    }
}

async fn discard_photo<P: Platform>(platform: &P, principal: &Principal, path: &str) {
    if let Err(e) = platform.remove_object(&principal.session, PHOTO_BUCKET, path).await {
        warn!("Could not remove orphaned photo {}: {}", path, e);
    }
}

// ── My requests ─────────────────────────────────────────────────────────

/// The victim's own requests, newest first.
pub async fn list_my_requests<P: Platform>(
    platform: &P,
    principal: &Principal,
) -> PlatformResult<Vec<HelpRequest>> {
    platform
        .query_requests(&principal.session, &RequestQuery::for_victim(principal.user_id()))
        .await
}

/// [`list_my_requests`], refreshed whenever one of the victim's rows changes.
pub async fn watch_my_requests<P: Platform>(
    platform: &P,
    principal: &Principal,
) -> Result<LiveList<HelpRequest>, FlowError> {
    principal.require(Role::Victim)?;

    let filter = ChangeFilter::eq(Table::HelpRequests, "victim_id", principal.user_id());
    let fetch = {
        let platform = platform.clone();
        let principal = principal.clone();
        move || {
            let platform = platform.clone();
            let principal = principal.clone();
            async move { list_my_requests(&platform, &principal).await }
        }
    };
    Ok(LiveList::open(platform, &principal.session, "victim-requests", filter, fetch).await?)
}

// ── Dashboard ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VictimDashboard {
    pub full_name: String,
    pub recent: Vec<HelpRequest>,
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub rescued: usize,
}

/// The most recent requests and their status counts. Counts cover the
/// recent requests only.
pub async fn dashboard<P: Platform>(
    platform: &P,
    principal: &Principal,
) -> Result<VictimDashboard, FlowError> {
    principal.require(Role::Victim)?;

    let query = RequestQuery::for_victim(principal.user_id()).limit(RECENT_LIMIT);
    let recent = platform.query_requests(&principal.session, &query).await?;
    let count = |status: RequestStatus| recent.iter().filter(|r| r.status == status).count();

    Ok(VictimDashboard {
        full_name: principal.profile.full_name.clone(),
        total: recent.len(),
        pending: count(RequestStatus::Pending),
        in_progress: count(RequestStatus::InProgress),
        rescued: count(RequestStatus::Rescued),
        recent,
    })
}

// ── Lifecycle ───────────────────────────────────────────────────────────

/// Withdraw a request that nobody has finished yet.
pub async fn cancel_request<P: Platform>(
    platform: &P,
    principal: &Principal,
    request_id: Uuid,
) -> Result<HelpRequest, FlowError> {
    principal.require(Role::Victim)?;

    let updated = platform
        .update_request_if(&principal.session, request_id, &Transition::Cancel)
        .await?
        .ok_or(FlowError::NotApplicable)?;
    info!("Victim {} cancelled request {}", principal.user_id(), request_id);
    Ok(updated)
}

/// Status history of one request, oldest first.
pub async fn rescue_log<P: Platform>(
    platform: &P,
    principal: &Principal,
    request_id: Uuid,
) -> PlatformResult<Vec<RescueUpdate>> {
    platform.list_rescue_updates(&principal.session, request_id).await
}
