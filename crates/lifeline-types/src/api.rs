use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EmergencyType, HelpRequest, RequestStatus, Role};

// -- JWT Claims --

/// Access-token claims issued by the embedded platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
}

/// An authenticated session as handed out by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: Uuid,
    pub email: String,
    pub expires_at: Option<DateTime<Utc>>,
}

// -- Help requests --

/// Row shape for inserting a help request. Status, assignment and timestamps
/// are left to the store's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHelpRequest {
    pub victim_id: Uuid,
    pub victim_name: String,
    pub phone: String,
    pub emergency_type: EmergencyType,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: Option<String>,
    pub photo_url: Option<String>,
}

/// Equality filters over help requests. Results are always newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    pub victim_id: Option<Uuid>,
    pub assigned_volunteer_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub limit: Option<u32>,
}

impl RequestQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_victim(victim_id: Uuid) -> Self {
        Self { victim_id: Some(victim_id), ..Self::default() }
    }

    pub fn assigned_to(volunteer_id: Uuid) -> Self {
        Self { assigned_volunteer_id: Some(volunteer_id), ..Self::default() }
    }

    pub fn with_status(status: RequestStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, request: &HelpRequest) -> bool {
        self.victim_id.is_none_or(|id| request.victim_id == id)
            && self
                .assigned_volunteer_id
                .is_none_or(|id| request.assigned_volunteer_id == Some(id))
            && self.status.is_none_or(|s| request.status == s)
    }
}

// -- Volunteer profiles --

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolunteerProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(victim: Uuid, status: RequestStatus) -> HelpRequest {
        let now = Utc::now();
        HelpRequest {
            id: Uuid::new_v4(),
            victim_id: victim,
            victim_name: "Ana".into(),
            phone: "555-1111".into(),
            emergency_type: EmergencyType::Flood,
            description: None,
            latitude: 1.0,
            longitude: 1.0,
            location_address: None,
            photo_url: None,
            status,
            assigned_volunteer_id: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn query_filters_combine() {
        let victim = Uuid::new_v4();
        let q = RequestQuery { status: Some(RequestStatus::Pending), ..RequestQuery::for_victim(victim) };

        assert!(q.matches(&request(victim, RequestStatus::Pending)));
        assert!(!q.matches(&request(victim, RequestStatus::Rescued)));
        assert!(!q.matches(&request(Uuid::new_v4(), RequestStatus::Pending)));
        assert!(RequestQuery::all().matches(&request(victim, RequestStatus::Cancelled)));
    }

    #[test]
    fn assignment_filter_requires_assignment() {
        let vid = Uuid::new_v4();
        let mut r = request(Uuid::new_v4(), RequestStatus::InProgress);
        assert!(!RequestQuery::assigned_to(vid).matches(&r));
        r.assigned_volunteer_id = Some(vid);
        assert!(RequestQuery::assigned_to(vid).matches(&r));
    }
}
