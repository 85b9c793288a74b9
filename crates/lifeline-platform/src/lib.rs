//! The managed-backend seam.
//!
//! Everything the front-end needs from the hosted platform (auth, row
//! access, object storage, change feed) goes through [`Platform`].
//! [`RemotePlatform`] talks to the hosted service; [`LocalPlatform`] is an
//! embedded stand-in used for development and tests.

pub mod error;
pub mod local;
pub mod remote;
pub mod subscription;

use std::future::Future;

use uuid::Uuid;

use lifeline_types::api::{NewAccount, NewHelpRequest, RequestQuery, Session, VolunteerProfileUpdate};
use lifeline_types::events::ChangeFilter;
use lifeline_types::lifecycle::Transition;
use lifeline_types::models::{HelpRequest, Notification, Profile, RescueUpdate, VolunteerProfile};

pub use error::{PlatformError, PlatformResult};
pub use local::LocalPlatform;
pub use remote::RemotePlatform;
pub use subscription::Subscription;

/// Bucket holding help-request photos.
pub const PHOTO_BUCKET: &str = "rescue-photos";

pub trait Platform: Clone + Send + Sync + 'static {
    // -- Auth --

    fn sign_up(&self, account: &NewAccount) -> impl Future<Output = PlatformResult<Session>> + Send;

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = PlatformResult<Session>> + Send;

    fn sign_out(&self, session: &Session) -> impl Future<Output = PlatformResult<()>> + Send;

    /// `None` if the token is expired, revoked or unknown.
    fn restore_session(
        &self,
        access_token: &str,
    ) -> impl Future<Output = PlatformResult<Option<Session>>> + Send;

    fn fetch_profile(
        &self,
        session: &Session,
    ) -> impl Future<Output = PlatformResult<Option<Profile>>> + Send;

    // -- Volunteer profiles --

    fn fetch_volunteer_profile(
        &self,
        session: &Session,
        user_id: Uuid,
    ) -> impl Future<Output = PlatformResult<Option<VolunteerProfile>>> + Send;

    /// Updates the caller's own volunteer profile.
    fn update_volunteer_profile(
        &self,
        session: &Session,
        update: &VolunteerProfileUpdate,
    ) -> impl Future<Output = PlatformResult<VolunteerProfile>> + Send;

    // -- Help requests --

    /// Rows the caller may see that match `query`, newest first.
    fn query_requests(
        &self,
        session: &Session,
        query: &RequestQuery,
    ) -> impl Future<Output = PlatformResult<Vec<HelpRequest>>> + Send;

    fn insert_request(
        &self,
        session: &Session,
        request: &NewHelpRequest,
    ) -> impl Future<Output = PlatformResult<HelpRequest>> + Send;

    /// Conditional write: applies `transition` only while the row's status is
    /// one it may start from. `Ok(None)` means the condition did not hold.
    fn update_request_if(
        &self,
        session: &Session,
        request_id: Uuid,
        transition: &Transition,
    ) -> impl Future<Output = PlatformResult<Option<HelpRequest>>> + Send;

    fn list_rescue_updates(
        &self,
        session: &Session,
        request_id: Uuid,
    ) -> impl Future<Output = PlatformResult<Vec<RescueUpdate>>> + Send;

    // -- Notifications --

    fn list_notifications(
        &self,
        session: &Session,
    ) -> impl Future<Output = PlatformResult<Vec<Notification>>> + Send;

    fn mark_notification_read(
        &self,
        session: &Session,
        notification_id: Uuid,
    ) -> impl Future<Output = PlatformResult<()>> + Send;

    // -- Object storage --

    fn upload_object(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = PlatformResult<()>> + Send;

    fn remove_object(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
    ) -> impl Future<Output = PlatformResult<()>> + Send;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    // -- Change feed --

    /// Open a change-feed subscription. Dropping the returned handle closes it.
    fn subscribe(
        &self,
        session: &Session,
        name: &str,
        filter: ChangeFilter,
    ) -> impl Future<Output = PlatformResult<Subscription>> + Send;
}
