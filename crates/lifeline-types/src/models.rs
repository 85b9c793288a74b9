use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Returned when a stored or transmitted enum value is not one we know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// The hosted store returns `null` for columns that only have a default.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

// -- Roles --

/// Fixed at account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Victim,
    Volunteer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Victim, Role::Volunteer, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Victim => "victim",
            Role::Volunteer => "volunteer",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseEnumError { kind: "role", value: s.to_string() })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Emergency types --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyType {
    Flood,
    Fire,
    Earthquake,
    Medical,
    Trapped,
    Other,
}

impl EmergencyType {
    pub const ALL: [EmergencyType; 6] = [
        EmergencyType::Flood,
        EmergencyType::Fire,
        EmergencyType::Earthquake,
        EmergencyType::Medical,
        EmergencyType::Trapped,
        EmergencyType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EmergencyType::Flood => "flood",
            EmergencyType::Fire => "fire",
            EmergencyType::Earthquake => "earthquake",
            EmergencyType::Medical => "medical",
            EmergencyType::Trapped => "trapped",
            EmergencyType::Other => "other",
        }
    }
}

impl FromStr for EmergencyType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmergencyType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError { kind: "emergency type", value: s.to_string() })
    }
}

impl fmt::Display for EmergencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Request status --

/// Lifecycle state of a help request. See `lifecycle` for the allowed moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    InProgress,
    Rescued,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::InProgress,
        RequestStatus::Rescued,
        RequestStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Rescued => "rescued",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ParseEnumError { kind: "request status", value: s.to_string() })
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Records --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpRequest {
    pub id: Uuid,
    pub victim_id: Uuid,
    pub victim_name: String,
    pub phone: String,
    pub emergency_type: EmergencyType,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: Option<String>,
    pub photo_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: RequestStatus,
    pub assigned_volunteer_id: Option<Uuid>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolunteerProfile {
    pub user_id: Uuid,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_address: Option<String>,
    pub availability: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_rescues: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only log entry; never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescueUpdate {
    pub id: Uuid,
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub notes: Option<String>,
    pub volunteer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_names_match_wire_values() {
        for status in RequestStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        for kind in EmergencyType::ALL {
            assert_eq!(kind.as_str().parse::<EmergencyType>().unwrap(), kind);
        }
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_values_are_rejected() {
        let err = "tornado".parse::<EmergencyType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown emergency type 'tornado'");
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn missing_status_defaults_to_pending() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "victim_id": Uuid::nil(),
            "victim_name": "Ana",
            "phone": "555-1111",
            "emergency_type": "fire",
            "description": null,
            "latitude": 40.0,
            "longitude": -73.0,
            "location_address": null,
            "photo_url": null,
            "assigned_volunteer_id": null,
            "admin_notes": null,
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": "2024-05-01T12:00:00Z"
        });
        let req: HelpRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.emergency_type, EmergencyType::Fire);
    }

    #[test]
    fn null_defaults_are_tolerated() {
        let json = serde_json::json!({
            "user_id": Uuid::nil(),
            "latitude": null,
            "longitude": null,
            "location_address": null,
            "availability": null,
            "is_active": null,
            "skills": null,
            "total_rescues": null,
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": "2024-05-01T12:00:00Z"
        });
        let vp: VolunteerProfile = serde_json::from_value(json).unwrap();
        assert!(!vp.is_active);
        assert!(vp.skills.is_empty());
        assert_eq!(vp.total_rescues, 0);
    }
}
