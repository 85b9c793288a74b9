//! Embedded stand-in for the hosted platform: SQLite rows, argon2/JWT auth,
//! row policies, files on disk and an in-process change feed.

mod auth;
pub mod feed;
mod policy;
pub mod storage;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lifeline_db::Database;
use lifeline_db::models::{NewAccountRow, TransitionResult};
use lifeline_types::api::{NewAccount, NewHelpRequest, RequestQuery, Session, VolunteerProfileUpdate};
use lifeline_types::events::{ChangeEvent, ChangeFilter, ChangeKind, Table};
use lifeline_types::lifecycle::Transition;
use lifeline_types::models::{
    HelpRequest, Notification, Profile, RescueUpdate, Role, VolunteerProfile,
};

use crate::error::{PlatformError, PlatformResult};
use crate::subscription::Subscription;
use crate::Platform;

pub use feed::ChangeFeed;
pub use storage::ObjectStore;
use policy::Caller;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone)]
pub struct LocalPlatform {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    db: Database,
    storage: ObjectStore,
    feed: ChangeFeed,
    jwt_secret: String,
    public_url: String,
    /// Tokens handed back through sign-out. Cleared on restart.
    revoked: Mutex<HashSet<String>>,
}

impl LocalPlatform {
    pub fn new(db: Database, storage: ObjectStore, jwt_secret: String, public_url: String) -> Self {
        Self {
            inner: Arc::new(LocalInner {
                db,
                storage,
                feed: ChangeFeed::new(),
                jwt_secret,
                public_url: public_url.trim_end_matches('/').to_string(),
                revoked: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn storage(&self) -> &ObjectStore {
        &self.inner.storage
    }

    fn is_revoked(&self, token: &str) -> bool {
        self.inner
            .revoked
            .lock()
            .map(|revoked| revoked.contains(token))
            .unwrap_or(true)
    }

    fn authorize(&self, session: &Session) -> PlatformResult<Caller> {
        if self.is_revoked(&session.access_token) {
            return Err(PlatformError::Unauthorized);
        }
        let claims = auth::decode_token(&self.inner.jwt_secret, &session.access_token)
            .ok_or(PlatformError::Unauthorized)?;
        Ok(Caller { user_id: claims.sub, role: claims.role })
    }

    fn issue_session(&self, user_id: Uuid, email: &str, role: Role) -> PlatformResult<Session> {
        let (access_token, expires_at) = auth::create_token(&self.inner.jwt_secret, user_id, email, role)?;
        Ok(Session {
            access_token,
            user_id,
            email: email.to_string(),
            expires_at: Some(expires_at),
        })
    }

    fn publish<T: Serialize>(&self, table: Table, kind: ChangeKind, record: &T) {
        match serde_json::to_value(record) {
            Ok(record) => self.inner.feed.publish(ChangeEvent { table, kind, record, old_record: None }),
            Err(e) => warn!("Dropping {} change, serialization failed: {}", table, e),
        }
    }

    fn notify(&self, user_id: Uuid, title: &str, message: &str, kind: &str) {
        match self.inner.db.insert_notification(user_id, title, message, Some(kind)) {
            Ok(notification) => self.publish(Table::Notifications, ChangeKind::Insert, &notification),
            Err(e) => warn!("Failed to notify {}: {}", user_id, e),
        }
    }

    /// Side effects that follow a status change: the rescue-update signal and
    /// notifications for whoever is on the other side of the request.
    fn after_transition(&self, request: &HelpRequest, transition: &Transition, previous: Option<Uuid>) {
        self.publish(Table::HelpRequests, ChangeKind::Update, request);
        self.publish(
            Table::RescueUpdates,
            ChangeKind::Insert,
            &serde_json::json!({ "request_id": request.id, "status": request.status }),
        );

        match transition {
            Transition::Accept { .. } => self.notify(
                request.victim_id,
                "Volunteer assigned",
                "A volunteer has been assigned and is on their way",
                "assignment",
            ),
            Transition::Complete => {
                self.notify(
                    request.victim_id,
                    "Marked rescued",
                    "Your help request has been marked as rescued",
                    "status",
                );
                if let Some(volunteer_id) = request.assigned_volunteer_id {
                    match self.inner.db.get_volunteer_profile(volunteer_id) {
                        Ok(Some(profile)) => {
                            self.publish(Table::VolunteerProfiles, ChangeKind::Update, &profile)
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Failed to reload volunteer profile {}: {}", volunteer_id, e),
                    }
                }
            }
            Transition::Cancel => {
                if let Some(volunteer_id) = previous {
                    self.notify(
                        volunteer_id,
                        "Request cancelled",
                        "A request you accepted has been cancelled",
                        "status",
                    );
                }
            }
        }
    }
}

fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

impl Platform for LocalPlatform {
    // -- Auth --

    async fn sign_up(&self, account: &NewAccount) -> PlatformResult<Session> {
        let email = account.email.trim();
        if !valid_email(email) {
            return Err(PlatformError::Rejected("Unable to validate email address: invalid format".into()));
        }
        if account.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PlatformError::Rejected("Password should be at least 6 characters".into()));
        }

        let password_hash = auth::hash_password(&account.password)?;
        let user_id = Uuid::new_v4();
        let row = NewAccountRow {
            email,
            password_hash: &password_hash,
            full_name: account.full_name.trim(),
            role: account.role,
            phone: account.phone.as_deref().filter(|p| !p.trim().is_empty()),
        };

        let profile = self
            .inner
            .db
            .create_account(user_id, &row)?
            .ok_or(PlatformError::DuplicateRegistration)?;

        info!("Registered {} as {}", profile.email, profile.role);
        self.publish(Table::Profiles, ChangeKind::Insert, &profile);
        self.issue_session(user_id, &profile.email, profile.role)
    }

    async fn sign_in(&self, email: &str, password: &str) -> PlatformResult<Session> {
        let user = self
            .inner
            .db
            .get_user_by_email(email.trim())?
            .ok_or(PlatformError::InvalidCredentials)?;

        if !auth::verify_password(password, &user.password) {
            return Err(PlatformError::InvalidCredentials);
        }

        let user_id: Uuid = user
            .id
            .parse()
            .map_err(|e| PlatformError::Storage(format!("corrupt user id {}: {}", user.id, e)))?;
        let profile = self
            .inner
            .db
            .get_profile(user_id)?
            .ok_or_else(|| PlatformError::NotFound("Profile".into()))?;

        info!("Signed in {}", user.email);
        self.issue_session(user_id, &user.email, profile.role)
    }

    async fn sign_out(&self, session: &Session) -> PlatformResult<()> {
        let caller = self.authorize(session)?;
        self.inner
            .revoked
            .lock()
            .map_err(|e| PlatformError::Storage(format!("revocation list poisoned: {}", e)))?
            .insert(session.access_token.clone());
        info!("Signed out {}", caller.user_id);
        Ok(())
    }

    async fn restore_session(&self, access_token: &str) -> PlatformResult<Option<Session>> {
        if self.is_revoked(access_token) {
            return Ok(None);
        }
        let Some(claims) = auth::decode_token(&self.inner.jwt_secret, access_token) else {
            debug!("Discarding unusable access token");
            return Ok(None);
        };
        Ok(Some(Session {
            access_token: access_token.to_string(),
            user_id: claims.sub,
            email: claims.email,
            expires_at: DateTime::<Utc>::from_timestamp(claims.exp as i64, 0),
        }))
    }

    async fn fetch_profile(&self, session: &Session) -> PlatformResult<Option<Profile>> {
        let caller = self.authorize(session)?;
        Ok(self.inner.db.get_profile(caller.user_id)?)
    }

    // -- Volunteer profiles --

    async fn fetch_volunteer_profile(
        &self,
        session: &Session,
        user_id: Uuid,
    ) -> PlatformResult<Option<VolunteerProfile>> {
        let caller = self.authorize(session)?;
        if caller.user_id != user_id && caller.role != Role::Admin {
            return Ok(None);
        }
        Ok(self.inner.db.get_volunteer_profile(user_id)?)
    }

    async fn update_volunteer_profile(
        &self,
        session: &Session,
        update: &VolunteerProfileUpdate,
    ) -> PlatformResult<VolunteerProfile> {
        let caller = self.authorize(session)?;
        if caller.role != Role::Volunteer {
            return Err(PlatformError::Forbidden("Only volunteers have a volunteer profile".into()));
        }
        let profile = self
            .inner
            .db
            .update_volunteer_profile(caller.user_id, update)?
            .ok_or_else(|| PlatformError::NotFound("Volunteer profile".into()))?;

        self.publish(Table::VolunteerProfiles, ChangeKind::Update, &profile);
        Ok(profile)
    }

    // -- Help requests --

    async fn query_requests(
        &self,
        session: &Session,
        query: &RequestQuery,
    ) -> PlatformResult<Vec<HelpRequest>> {
        let caller = self.authorize(session)?;

        // Visibility is applied before the limit, as a row policy would be.
        let unlimited = RequestQuery { limit: None, ..query.clone() };
        let mut rows: Vec<HelpRequest> = self
            .inner
            .db
            .query_help_requests(&unlimited)?
            .into_iter()
            .filter(|r| policy::can_read_request(&caller, r))
            .collect();
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert_request(
        &self,
        session: &Session,
        request: &NewHelpRequest,
    ) -> PlatformResult<HelpRequest> {
        let caller = self.authorize(session)?;
        policy::check_insert_request(&caller, request)?;

        let row = self.inner.db.insert_help_request(Uuid::new_v4(), request)?;
        info!("New {} help request {} from {}", row.emergency_type, row.id, row.victim_id);
        self.publish(Table::HelpRequests, ChangeKind::Insert, &row);
        Ok(row)
    }

    async fn update_request_if(
        &self,
        session: &Session,
        request_id: Uuid,
        transition: &Transition,
    ) -> PlatformResult<Option<HelpRequest>> {
        let caller = self.authorize(session)?;

        // Rows the caller cannot see behave like rows that fail the condition.
        let current = match self.inner.db.get_help_request(request_id)? {
            Some(r) if policy::can_read_request(&caller, &r) => r,
            _ => {
                debug!("Request {} not visible to {}", request_id, caller.user_id);
                return Ok(None);
            }
        };
        policy::check_transition(&caller, &current, transition)?;

        match self.inner.db.apply_transition(request_id, transition)? {
            TransitionResult::Applied(updated) => {
                info!("Request {} {} -> {}", request_id, current.status, updated.status);
                self.after_transition(&updated, transition, current.assigned_volunteer_id);
                Ok(Some(updated))
            }
            TransitionResult::Rejected { current } => {
                debug!("Request {} is {}, {:?} not applied", request_id, current, transition);
                Ok(None)
            }
            TransitionResult::NotFound => Ok(None),
        }
    }

    async fn list_rescue_updates(
        &self,
        session: &Session,
        request_id: Uuid,
    ) -> PlatformResult<Vec<RescueUpdate>> {
        let caller = self.authorize(session)?;
        match self.inner.db.get_help_request(request_id)? {
            Some(r) if policy::can_read_request(&caller, &r) => {
                Ok(self.inner.db.list_rescue_updates(request_id)?)
            }
            _ => Ok(Vec::new()),
        }
    }

    // -- Notifications --

    async fn list_notifications(&self, session: &Session) -> PlatformResult<Vec<Notification>> {
        let caller = self.authorize(session)?;
        Ok(self.inner.db.list_notifications(caller.user_id)?)
    }

    async fn mark_notification_read(
        &self,
        session: &Session,
        notification_id: Uuid,
    ) -> PlatformResult<()> {
        let caller = self.authorize(session)?;
        let notification = self
            .inner
            .db
            .mark_notification_read(notification_id, caller.user_id)?
            .ok_or_else(|| PlatformError::NotFound("Notification".into()))?;
        self.publish(Table::Notifications, ChangeKind::Update, &notification);
        Ok(())
    }

    // -- Object storage --

    async fn upload_object(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PlatformResult<()> {
        let caller = self.authorize(session)?;
        policy::check_object_path(&caller, path)?;
        debug!("Upload {}/{} ({})", bucket, path, content_type);
        self.inner.storage.put(bucket, path, &bytes).await
    }

    async fn remove_object(&self, session: &Session, bucket: &str, path: &str) -> PlatformResult<()> {
        let caller = self.authorize(session)?;
        policy::check_object_path(&caller, path)?;
        self.inner.storage.delete(bucket, path).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.inner.public_url, bucket, path)
    }

    // -- Change feed --

    async fn subscribe(
        &self,
        session: &Session,
        name: &str,
        filter: ChangeFilter,
    ) -> PlatformResult<Subscription> {
        self.authorize(session)?;
        Ok(self.inner.feed.subscribe(name, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_types::models::{EmergencyType, RequestStatus};

    async fn platform() -> LocalPlatform {
        let dir = std::env::temp_dir().join(format!("lifeline_local_test_{}", Uuid::new_v4()));
        LocalPlatform::new(
            Database::open_in_memory().unwrap(),
            ObjectStore::new(dir).await.unwrap(),
            "test-secret".into(),
            "http://localhost:3000/".into(),
        )
    }

    fn account(email: &str, role: Role) -> NewAccount {
        NewAccount {
            email: email.into(),
            password: "secret1".into(),
            full_name: "Test User".into(),
            role,
            phone: None,
        }
    }

    fn fire_request(victim_id: Uuid) -> NewHelpRequest {
        NewHelpRequest {
            victim_id,
            victim_name: "Ana".into(),
            phone: "555-0100".into(),
            emergency_type: EmergencyType::Fire,
            description: None,
            latitude: 12.5,
            longitude: -70.1,
            location_address: None,
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn sign_up_sign_in_and_duplicate() {
        let p = platform().await;
        let session = p.sign_up(&account("ana@example.com", Role::Victim)).await.unwrap();
        let profile = p.fetch_profile(&session).await.unwrap().unwrap();
        assert_eq!(profile.role, Role::Victim);

        assert!(matches!(
            p.sign_up(&account("ANA@example.com", Role::Volunteer)).await,
            Err(PlatformError::DuplicateRegistration)
        ));
        assert!(matches!(
            p.sign_in("ana@example.com", "wrong-pass").await,
            Err(PlatformError::InvalidCredentials)
        ));
        let again = p.sign_in("ana@example.com", "secret1").await.unwrap();
        assert_eq!(again.user_id, session.user_id);
    }

    #[tokio::test]
    async fn sign_out_revokes_the_token() {
        let p = platform().await;
        let session = p.sign_up(&account("v@example.com", Role::Volunteer)).await.unwrap();
        assert!(p.restore_session(&session.access_token).await.unwrap().is_some());

        p.sign_out(&session).await.unwrap();
        assert!(p.restore_session(&session.access_token).await.unwrap().is_none());
        assert!(matches!(p.fetch_profile(&session).await, Err(PlatformError::Unauthorized)));
    }

    #[tokio::test]
    async fn policies_gate_inserts_and_reads() {
        let p = platform().await;
        let victim = p.sign_up(&account("a@example.com", Role::Victim)).await.unwrap();
        let other = p.sign_up(&account("b@example.com", Role::Victim)).await.unwrap();
        let volunteer = p.sign_up(&account("c@example.com", Role::Volunteer)).await.unwrap();

        assert!(matches!(
            p.insert_request(&volunteer, &fire_request(volunteer.user_id)).await,
            Err(PlatformError::Forbidden(_))
        ));
        assert!(matches!(
            p.insert_request(&other, &fire_request(victim.user_id)).await,
            Err(PlatformError::Forbidden(_))
        ));

        let row = p.insert_request(&victim, &fire_request(victim.user_id)).await.unwrap();
        assert_eq!(row.status, RequestStatus::Pending);

        assert!(p.query_requests(&other, &RequestQuery::all()).await.unwrap().is_empty());
        assert_eq!(p.query_requests(&volunteer, &RequestQuery::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn accept_notifies_the_victim_and_publishes() {
        let p = platform().await;
        let victim = p.sign_up(&account("a@example.com", Role::Victim)).await.unwrap();
        let volunteer = p.sign_up(&account("c@example.com", Role::Volunteer)).await.unwrap();
        let row = p.insert_request(&victim, &fire_request(victim.user_id)).await.unwrap();

        let mut sub = p
            .subscribe(&victim, "mine", ChangeFilter::eq(Table::HelpRequests, "victim_id", victim.user_id))
            .await
            .unwrap();

        let accept = Transition::Accept { volunteer_id: volunteer.user_id };
        let updated = p.update_request_if(&volunteer, row.id, &accept).await.unwrap().unwrap();
        assert_eq!(updated.assigned_volunteer_id, Some(volunteer.user_id));

        let event = sub.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Update);

        let notifications = p.list_notifications(&victim).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Volunteer assigned");
        p.mark_notification_read(&victim, notifications[0].id).await.unwrap();
        assert!(p.list_notifications(&victim).await.unwrap()[0].is_read);
        assert!(p.mark_notification_read(&volunteer, notifications[0].id).await.is_err());

        // Already taken: condition fails, no error.
        assert!(p.update_request_if(&volunteer, row.id, &accept).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn uploads_are_scoped_to_the_uploader() {
        let p = platform().await;
        let victim = p.sign_up(&account("a@example.com", Role::Victim)).await.unwrap();
        let own = format!("{}/1700000000000.jpg", victim.user_id);

        p.upload_object(&victim, "rescue-photos", &own, b"jpeg".to_vec(), "image/jpeg").await.unwrap();
        assert!(matches!(
            p.upload_object(&victim, "rescue-photos", "someone/1.jpg", b"x".to_vec(), "image/jpeg").await,
            Err(PlatformError::Forbidden(_))
        ));
        assert_eq!(
            p.public_url("rescue-photos", &own),
            format!("http://localhost:3000/storage/v1/object/public/rescue-photos/{}", own)
        );
        p.remove_object(&victim, "rescue-photos", &own).await.unwrap();
        assert!(p.storage().get("rescue-photos", &own).await.unwrap().is_none());
    }

    #[test]
    fn email_shape() {
        assert!(valid_email("a@b.co"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("@b.co"));
        assert!(!valid_email("a b@c.co"));
        assert!(!valid_email("a@@b.co"));
        assert!(!valid_email("a@b@c.co"));
    }

    #[tokio::test]
    async fn sign_up_rejects_a_doubled_at_sign() {
        let platform = platform().await;
        let result = platform.sign_up(&account("a@@b.co", Role::Victim)).await;
        assert!(matches!(result, Err(PlatformError::Rejected(_))));
        assert!(platform.sign_in("a@@b.co", "secret1").await.is_err());
    }
}
