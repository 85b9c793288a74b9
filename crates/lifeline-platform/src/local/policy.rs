//! Row-level access rules the hosted store enforces, mirrored for the
//! embedded platform.

use uuid::Uuid;

use lifeline_types::api::NewHelpRequest;
use lifeline_types::lifecycle::Transition;
use lifeline_types::models::{HelpRequest, RequestStatus, Role};

use crate::error::{PlatformError, PlatformResult};

/// The authenticated identity behind a call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

/// Victims see their own requests, volunteers see the pending pool plus what
/// they are assigned, admins see everything.
pub(crate) fn can_read_request(caller: &Caller, request: &HelpRequest) -> bool {
    match caller.role {
        Role::Admin => true,
        Role::Victim => request.victim_id == caller.user_id,
        Role::Volunteer => {
            request.status == RequestStatus::Pending
                || request.assigned_volunteer_id == Some(caller.user_id)
        }
    }
}

pub(crate) fn check_insert_request(caller: &Caller, request: &NewHelpRequest) -> PlatformResult<()> {
    if caller.role != Role::Victim {
        return Err(PlatformError::Forbidden("Only victims can submit help requests".into()));
    }
    if request.victim_id != caller.user_id {
        return Err(PlatformError::Forbidden("Cannot submit a request for another user".into()));
    }
    Ok(())
}

pub(crate) fn check_transition(
    caller: &Caller,
    request: &HelpRequest,
    transition: &Transition,
) -> PlatformResult<()> {
    let allowed = match transition {
        Transition::Accept { volunteer_id } => {
            caller.role == Role::Volunteer && *volunteer_id == caller.user_id
        }
        Transition::Complete => {
            caller.role == Role::Volunteer && request.assigned_volunteer_id == Some(caller.user_id)
        }
        Transition::Cancel => {
            caller.role == Role::Admin
                || (caller.role == Role::Victim && request.victim_id == caller.user_id)
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(PlatformError::Forbidden("Not allowed to change this request".into()))
    }
}

/// Uploads must live under a folder named after the uploader.
pub(crate) fn check_object_path(caller: &Caller, path: &str) -> PlatformResult<()> {
    let owner = path.split('/').next().unwrap_or_default();
    if owner == caller.user_id.to_string() {
        Ok(())
    } else {
        Err(PlatformError::Forbidden("Uploads must go under your own folder".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lifeline_types::models::EmergencyType;

    fn caller(role: Role) -> Caller {
        Caller { user_id: Uuid::new_v4(), role }
    }

    fn request(victim_id: Uuid, status: RequestStatus, assigned: Option<Uuid>) -> HelpRequest {
        let now = Utc::now();
        HelpRequest {
            id: Uuid::new_v4(),
            victim_id,
            victim_name: "Ana".into(),
            phone: "555".into(),
            emergency_type: EmergencyType::Medical,
            description: None,
            latitude: 1.0,
            longitude: 1.0,
            location_address: None,
            photo_url: None,
            status,
            assigned_volunteer_id: assigned,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn volunteers_only_see_pending_or_their_own() {
        let vol = caller(Role::Volunteer);
        let someone = Uuid::new_v4();
        assert!(can_read_request(&vol, &request(someone, RequestStatus::Pending, None)));
        assert!(can_read_request(&vol, &request(someone, RequestStatus::InProgress, Some(vol.user_id))));
        assert!(!can_read_request(&vol, &request(someone, RequestStatus::InProgress, Some(Uuid::new_v4()))));
    }

    #[test]
    fn victims_only_see_their_own() {
        let victim = caller(Role::Victim);
        assert!(can_read_request(&victim, &request(victim.user_id, RequestStatus::Rescued, None)));
        assert!(!can_read_request(&victim, &request(Uuid::new_v4(), RequestStatus::Pending, None)));
    }

    #[test]
    fn only_the_assigned_volunteer_completes() {
        let vol = caller(Role::Volunteer);
        let other = caller(Role::Volunteer);
        let req = request(Uuid::new_v4(), RequestStatus::InProgress, Some(vol.user_id));
        assert!(check_transition(&vol, &req, &Transition::Complete).is_ok());
        assert!(check_transition(&other, &req, &Transition::Complete).is_err());
    }

    #[test]
    fn accept_must_name_the_caller() {
        let vol = caller(Role::Volunteer);
        let req = request(Uuid::new_v4(), RequestStatus::Pending, None);
        let impersonated = Transition::Accept { volunteer_id: Uuid::new_v4() };
        assert!(check_transition(&vol, &req, &impersonated).is_err());
        let victim = caller(Role::Victim);
        let own = Transition::Accept { volunteer_id: victim.user_id };
        assert!(check_transition(&victim, &req, &own).is_err());
    }

    #[test]
    fn object_paths_are_scoped_to_the_uploader() {
        let victim = caller(Role::Victim);
        assert!(check_object_path(&victim, &format!("{}/1700000000000.jpg", victim.user_id)).is_ok());
        assert!(check_object_path(&victim, &format!("{}/1.jpg", Uuid::new_v4())).is_err());
        assert!(check_object_path(&victim, "1.jpg").is_err());
    }
}
