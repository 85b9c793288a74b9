use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use lifeline_platform::{Platform, PlatformResult};
use lifeline_types::api::{RequestQuery, VolunteerProfileUpdate};
use lifeline_types::events::{ChangeFilter, Table};
use lifeline_types::lifecycle::Transition;
use lifeline_types::models::{HelpRequest, RequestStatus, Role, VolunteerProfile};

use crate::error::FlowError;
use crate::identity::Principal;
use crate::live::LiveList;

/// How an accept attempt ended. Losing the race is an ordinary outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    Accepted(HelpRequest),
    /// Someone else got there first, or the request is no longer pending.
    AlreadyTaken,
}

/// Pending requests, newest first.
pub async fn list_pending<P: Platform>(
    platform: &P,
    principal: &Principal,
) -> PlatformResult<Vec<HelpRequest>> {
    platform
        .query_requests(&principal.session, &RequestQuery::with_status(RequestStatus::Pending))
        .await
}

/// [`list_pending`], refreshed on any change to any help request.
pub async fn watch_pending<P: Platform>(
    platform: &P,
    principal: &Principal,
) -> Result<LiveList<HelpRequest>, FlowError> {
    principal.require(Role::Volunteer)?;

    let fetch = {
        let platform = platform.clone();
        let principal = principal.clone();
        move || {
            let platform = platform.clone();
            let principal = principal.clone();
            async move { list_pending(&platform, &principal).await }
        }
    };
    let filter = ChangeFilter::table(Table::HelpRequests);
    Ok(LiveList::open(platform, &principal.session, "pending-requests", filter, fetch).await?)
}

/// Claim a pending request. The platform applies this only while the request
/// is still pending, so of any number of concurrent accepts exactly one wins.
pub async fn accept_request<P: Platform>(
    platform: &P,
    principal: &Principal,
    request_id: Uuid,
) -> Result<AcceptOutcome, FlowError> {
    principal.require(Role::Volunteer)?;

    let accept = Transition::Accept { volunteer_id: principal.user_id() };
    match platform.update_request_if(&principal.session, request_id, &accept).await? {
        Some(request) => {
            info!("Volunteer {} accepted request {}", principal.user_id(), request_id);
            Ok(AcceptOutcome::Accepted(request))
        }
        None => {
            info!("Request {} already taken", request_id);
            Ok(AcceptOutcome::AlreadyTaken)
        }
    }
}

/// Requests assigned to this volunteer, newest first.
pub async fn list_my_rescues<P: Platform>(
    platform: &P,
    principal: &Principal,
) -> Result<Vec<HelpRequest>, FlowError> {
    principal.require(Role::Volunteer)?;
    Ok(platform
        .query_requests(&principal.session, &RequestQuery::assigned_to(principal.user_id()))
        .await?)
}

/// Report the victim rescued. Only the assigned volunteer can do this.
pub async fn complete_rescue<P: Platform>(
    platform: &P,
    principal: &Principal,
    request_id: Uuid,
) -> Result<HelpRequest, FlowError> {
    principal.require(Role::Volunteer)?;

    let updated = platform
        .update_request_if(&principal.session, request_id, &Transition::Complete)
        .await?
        .ok_or(FlowError::NotApplicable)?;
    info!("Volunteer {} completed request {}", principal.user_id(), request_id);
    Ok(updated)
}

/// Driving directions to a victim.
pub fn navigation_url(latitude: f64, longitude: f64) -> String {
    format!("https://www.google.com/maps/dir/?api=1&destination={},{}", latitude, longitude)
}

// -- Dashboard --

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolunteerDashboard {
    pub full_name: String,
    pub total_rescues: i64,
    pub active: usize,
    pub completed: usize,
    pub is_active: bool,
    pub availability: Option<String>,
}

pub async fn dashboard<P: Platform>(
    platform: &P,
    principal: &Principal,
) -> Result<VolunteerDashboard, FlowError> {
    let assigned = list_my_rescues(platform, principal).await?;
    let profile = platform
        .fetch_volunteer_profile(&principal.session, principal.user_id())
        .await?;

    let count = |status: RequestStatus| assigned.iter().filter(|r| r.status == status).count();
    let (total_rescues, is_active, availability) = match profile {
        Some(p) => (p.total_rescues, p.is_active, p.availability),
        None => (0, true, None),
    };

    Ok(VolunteerDashboard {
        full_name: principal.profile.full_name.clone(),
        total_rescues,
        active: count(RequestStatus::InProgress),
        completed: count(RequestStatus::Rescued),
        is_active,
        availability,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityChange {
    pub is_active: bool,
    #[serde(default)]
    pub availability: Option<String>,
}

pub async fn set_availability<P: Platform>(
    platform: &P,
    principal: &Principal,
    change: &AvailabilityChange,
) -> Result<VolunteerProfile, FlowError> {
    principal.require(Role::Volunteer)?;

    let update = VolunteerProfileUpdate {
        is_active: Some(change.is_active),
        availability: change.availability.clone(),
        ..VolunteerProfileUpdate::default()
    };
    let profile = platform.update_volunteer_profile(&principal.session, &update).await?;
    info!(
        "Volunteer {} is now {}",
        principal.user_id(),
        if profile.is_active { "active" } else { "inactive" }
    );
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_link() {
        assert_eq!(
            navigation_url(40.7128, -74.006),
            "https://www.google.com/maps/dir/?api=1&destination=40.7128,-74.006"
        );
    }
}
