//! Client for the hosted backend-as-a-service.

mod realtime;
mod rest;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use lifeline_types::api::{NewAccount, NewHelpRequest, RequestQuery, Session, VolunteerProfileUpdate};
use lifeline_types::events::ChangeFilter;
use lifeline_types::lifecycle::Transition;
use lifeline_types::models::{
    HelpRequest, Notification, Profile, RescueUpdate, VolunteerProfile,
};

use crate::error::{PlatformError, PlatformResult};
use crate::subscription::Subscription;
use crate::Platform;

use rest::{Authed, PasswordGrant, SignUpBody, StatusPatch, TokenResponse, check, read_json};

#[derive(Clone)]
pub struct RemotePlatform {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    http: Client,
    /// Always ends in `/` so relative joins append.
    base: Url,
    anon_key: String,
}

impl RemotePlatform {
    pub fn new(base_url: &str, anon_key: &str) -> PlatformResult<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| PlatformError::Transport(format!("invalid platform URL {}: {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        info!("Using hosted platform at {}", base);

        Ok(Self {
            inner: Arc::new(RemoteInner {
                http: Client::new(),
                base,
                anon_key: anon_key.to_string(),
            }),
        })
    }

    fn endpoint(&self, path: &str) -> PlatformResult<Url> {
        self.inner
            .base
            .join(path)
            .map_err(|e| PlatformError::Transport(e.to_string()))
    }

    fn table(&self, table: &str) -> PlatformResult<Url> {
        self.endpoint(&format!("rest/v1/{}", table))
    }

    fn session_from(&self, token: TokenResponse) -> PlatformResult<Session> {
        let (Some(access_token), Some(user)) = (token.access_token, token.user) else {
            return Err(PlatformError::Rejected(
                "Check your email to confirm your account before signing in".into(),
            ));
        };
        Ok(Session {
            access_token,
            user_id: user.id,
            email: user.email.unwrap_or_default(),
            expires_at: token.expires_at.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)),
        })
    }
}

impl Platform for RemotePlatform {
    // -- Auth --

    async fn sign_up(&self, account: &NewAccount) -> PlatformResult<Session> {
        let resp = self
            .inner
            .http
            .post(self.endpoint("auth/v1/signup")?)
            .header("apikey", &self.inner.anon_key)
            .json(&SignUpBody::from_account(account))
            .send()
            .await?;
        let token: TokenResponse = read_json(resp).await?;
        let session = self.session_from(token)?;
        info!("Registered {} as {}", session.email, account.role);
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> PlatformResult<Session> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let resp = self
            .inner
            .http
            .post(url)
            .header("apikey", &self.inner.anon_key)
            .json(&PasswordGrant { email: email.trim(), password })
            .send()
            .await?;
        let token: TokenResponse = read_json(resp).await?;
        self.session_from(token)
    }

    async fn sign_out(&self, session: &Session) -> PlatformResult<()> {
        let resp = self
            .inner
            .http
            .post(self.endpoint("auth/v1/logout")?)
            .authed(&self.inner.anon_key, &session.access_token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn restore_session(&self, access_token: &str) -> PlatformResult<Option<Session>> {
        let resp = self
            .inner
            .http
            .get(self.endpoint("auth/v1/user")?)
            .authed(&self.inner.anon_key, access_token)
            .send()
            .await?;
        if matches!(resp.status().as_u16(), 401 | 403) {
            debug!("Stored access token no longer accepted");
            return Ok(None);
        }
        let user: rest::AuthUser = read_json(resp).await?;
        Ok(Some(Session {
            access_token: access_token.to_string(),
            user_id: user.id,
            email: user.email.unwrap_or_default(),
            expires_at: None,
        }))
    }

    async fn fetch_profile(&self, session: &Session) -> PlatformResult<Option<Profile>> {
        let resp = self
            .inner
            .http
            .get(self.table("profiles")?)
            .query(&[("select", "*".to_string()), ("user_id", format!("eq.{}", session.user_id))])
            .authed(&self.inner.anon_key, &session.access_token)
            .send()
            .await?;
        let rows: Vec<Profile> = read_json(resp).await?;
        Ok(rows.into_iter().next())
    }

    // -- Volunteer profiles --

    async fn fetch_volunteer_profile(
        &self,
        session: &Session,
        user_id: Uuid,
    ) -> PlatformResult<Option<VolunteerProfile>> {
        let resp = self
            .inner
            .http
            .get(self.table("volunteer_profiles")?)
            .query(&[("select", "*".to_string()), ("user_id", format!("eq.{}", user_id))])
            .authed(&self.inner.anon_key, &session.access_token)
            .send()
            .await?;
        let rows: Vec<VolunteerProfile> = read_json(resp).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_volunteer_profile(
        &self,
        session: &Session,
        update: &VolunteerProfileUpdate,
    ) -> PlatformResult<VolunteerProfile> {
        let resp = self
            .inner
            .http
            .patch(self.table("volunteer_profiles")?)
            .query(&[("user_id", format!("eq.{}", session.user_id))])
            .header("Prefer", "return=representation")
            .authed(&self.inner.anon_key, &session.access_token)
            .json(update)
            .send()
            .await?;
        let rows: Vec<VolunteerProfile> = read_json(resp).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| PlatformError::NotFound("Volunteer profile".into()))
    }

    // -- Help requests --

    async fn query_requests(
        &self,
        session: &Session,
        query: &RequestQuery,
    ) -> PlatformResult<Vec<HelpRequest>> {
        let resp = self
            .inner
            .http
            .get(self.table("help_requests")?)
            .query(&rest::request_params(query))
            .authed(&self.inner.anon_key, &session.access_token)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn insert_request(
        &self,
        session: &Session,
        request: &NewHelpRequest,
    ) -> PlatformResult<HelpRequest> {
        let resp = self
            .inner
            .http
            .post(self.table("help_requests")?)
            .header("Prefer", "return=representation")
            .authed(&self.inner.anon_key, &session.access_token)
            .json(request)
            .send()
            .await?;
        let rows: Vec<HelpRequest> = read_json(resp).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::Rejected("Insert returned no row".into()))?;
        info!("New {} help request {}", row.emergency_type, row.id);
        Ok(row)
    }

    async fn update_request_if(
        &self,
        session: &Session,
        request_id: Uuid,
        transition: &Transition,
    ) -> PlatformResult<Option<HelpRequest>> {
        // An empty representation means no row matched id + status (or the
        // row policy hid it); the service cannot tell us which.
        let resp = self
            .inner
            .http
            .patch(self.table("help_requests")?)
            .query(&[
                ("id", format!("eq.{}", request_id)),
                ("status", rest::status_condition(transition)),
            ])
            .header("Prefer", "return=representation")
            .authed(&self.inner.anon_key, &session.access_token)
            .json(&StatusPatch::from(transition))
            .send()
            .await?;
        let rows: Vec<HelpRequest> = read_json(resp).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_rescue_updates(
        &self,
        session: &Session,
        request_id: Uuid,
    ) -> PlatformResult<Vec<RescueUpdate>> {
        let resp = self
            .inner
            .http
            .get(self.table("rescue_updates")?)
            .query(&[
                ("select", "*".to_string()),
                ("request_id", format!("eq.{}", request_id)),
                ("order", "created_at.asc".to_string()),
            ])
            .authed(&self.inner.anon_key, &session.access_token)
            .send()
            .await?;
        read_json(resp).await
    }

    // -- Notifications --

    async fn list_notifications(&self, session: &Session) -> PlatformResult<Vec<Notification>> {
        let resp = self
            .inner
            .http
            .get(self.table("notifications")?)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{}", session.user_id)),
                ("order", "created_at.desc".to_string()),
            ])
            .authed(&self.inner.anon_key, &session.access_token)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn mark_notification_read(
        &self,
        session: &Session,
        notification_id: Uuid,
    ) -> PlatformResult<()> {
        let resp = self
            .inner
            .http
            .patch(self.table("notifications")?)
            .query(&[("id", format!("eq.{}", notification_id))])
            .header("Prefer", "return=representation")
            .authed(&self.inner.anon_key, &session.access_token)
            .json(&json!({ "is_read": true }))
            .send()
            .await?;
        let rows: Vec<Notification> = read_json(resp).await?;
        if rows.is_empty() {
            return Err(PlatformError::NotFound("Notification".into()));
        }
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
        let size = bytes.len();
        let resp = self
            .inner
            .http
            .post(self.endpoint(&format!("storage/v1/object/{}/{}", bucket, path))?)
            .header("Content-Type", content_type)
            .authed(&self.inner.anon_key, &session.access_token)
            .body(bytes)
            .send()
            .await?;
        check(resp).await?;
        info!("Uploaded {}/{} ({} bytes)", bucket, path, size);
        Ok(())
    }

    async fn remove_object(&self, session: &Session, bucket: &str, path: &str) -> PlatformResult<()> {
        let resp = self
            .inner
            .http
            .delete(self.endpoint(&format!("storage/v1/object/{}", bucket))?)
            .authed(&self.inner.anon_key, &session.access_token)
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await?;
        check(resp).await?;
        info!("Removed {}/{}", bucket, path);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}storage/v1/object/public/{}/{}", self.inner.base, bucket, path)
    }

    // -- Change feed --

    async fn subscribe(
        &self,
        session: &Session,
        name: &str,
        filter: ChangeFilter,
    ) -> PlatformResult<Subscription> {
        realtime::subscribe(&self.inner.base, &self.inner.anon_key, &session.access_token, name, filter)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let platform = RemotePlatform::new("https://abc.supabase.co", "anon").unwrap();
        assert_eq!(
            platform.table("help_requests").unwrap().as_str(),
            "https://abc.supabase.co/rest/v1/help_requests"
        );
        assert_eq!(
            platform.public_url("rescue-photos", "u/1.jpg"),
            "https://abc.supabase.co/storage/v1/object/public/rescue-photos/u/1.jpg"
        );
        assert!(RemotePlatform::new("not a url", "anon").is_err());
    }

    #[test]
    fn unconfirmed_sign_up_is_rejected_with_a_reason() {
        let platform = RemotePlatform::new("https://abc.supabase.co/", "anon").unwrap();
        let token = TokenResponse { access_token: None, expires_at: None, user: None };
        assert!(matches!(platform.session_from(token), Err(PlatformError::Rejected(_))));
    }
}
