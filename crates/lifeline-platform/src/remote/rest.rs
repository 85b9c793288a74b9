//! Request shapes and response handling for the hosted service's auth,
//! table and storage endpoints.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use lifeline_types::api::{NewAccount, RequestQuery};
use lifeline_types::lifecycle::Transition;
use lifeline_types::models::RequestStatus;

use crate::error::{PlatformError, PlatformResult};

// ── Auth bodies ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct SignUpBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
    /// Copied onto the profile row by the platform's sign-up trigger.
    pub data: SignUpMetadata<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignUpMetadata<'a> {
    pub full_name: &'a str,
    pub role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'a str>,
}

impl<'a> SignUpBody<'a> {
    pub fn from_account(account: &'a NewAccount) -> Self {
        Self {
            email: account.email.trim(),
            password: &account.password,
            data: SignUpMetadata {
                full_name: account.full_name.trim(),
                role: account.role.as_str(),
                phone: account.phone.as_deref().filter(|p| !p.trim().is_empty()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token grant or sign-up response. Sign-up without auto-confirm returns
/// the bare user, so everything session-shaped is optional.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<AuthUser>,
}

// ── Table filters ───────────────────────────────────────────────────────

/// Query-string parameters for a help-request select.
pub(crate) fn request_params(query: &RequestQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", "*".to_string())];
    if let Some(id) = query.victim_id {
        params.push(("victim_id", format!("eq.{}", id)));
    }
    if let Some(id) = query.assigned_volunteer_id {
        params.push(("assigned_volunteer_id", format!("eq.{}", id)));
    }
    if let Some(status) = query.status {
        params.push(("status", format!("eq.{}", status.as_str())));
    }
    params.push(("order", "created_at.desc".to_string()));
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

/// `in.(a,b)` over the statuses a transition may start from.
pub(crate) fn status_condition(transition: &Transition) -> String {
    let allowed: Vec<&str> = transition.allowed_from().iter().map(|s| s.as_str()).collect();
    format!("in.({})", allowed.join(","))
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusPatch {
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_volunteer_id: Option<Uuid>,
}

impl From<&Transition> for StatusPatch {
    fn from(transition: &Transition) -> Self {
        Self {
            status: transition.target(),
            assigned_volunteer_id: transition.assigns(),
        }
    }
}

// ── Responses ───────────────────────────────────────────────────────────

pub(crate) trait Authed {
    fn authed(self, anon_key: &str, token: &str) -> Self;
}

impl Authed for RequestBuilder {
    fn authed(self, anon_key: &str, token: &str) -> Self {
        self.header("apikey", anon_key).bearer_auth(token)
    }
}

/// Pass successful responses through; turn failures into a [`PlatformError`]
/// carrying the service's own message.
pub(crate) async fn check(resp: Response) -> PlatformResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status.canonical_reason().unwrap_or("Request failed").to_string()
    });
    error!("Platform call failed with {}: {}", status, message);
    Err(classify(status, message))
}

pub(crate) async fn read_json<T: DeserializeOwned>(resp: Response) -> PlatformResult<T> {
    let resp = check(resp).await?;
    resp.json::<T>()
        .await
        .map_err(|e| PlatformError::Transport(format!("unexpected response: {}", e)))
}

/// First of the message fields the service's components use.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn classify(status: StatusCode, message: String) -> PlatformError {
    let lower = message.to_lowercase();
    if lower.contains("already registered") || lower.contains("already been registered") {
        return PlatformError::DuplicateRegistration;
    }
    if lower.contains("invalid login credentials") {
        return PlatformError::InvalidCredentials;
    }
    match status {
        StatusCode::UNAUTHORIZED => PlatformError::Unauthorized,
        StatusCode::FORBIDDEN => PlatformError::Forbidden(message),
        StatusCode::NOT_FOUND => PlatformError::NotFound("Resource".into()),
        _ => PlatformError::Rejected(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_types::models::Role;

    #[test]
    fn pending_list_params() {
        let params = request_params(&RequestQuery::with_status(RequestStatus::Pending).limit(5));
        assert_eq!(
            params,
            vec![
                ("select", "*".to_string()),
                ("status", "eq.pending".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", "5".to_string()),
            ]
        );
    }

    #[test]
    fn accept_is_conditional_on_pending() {
        let vid = Uuid::new_v4();
        let accept = Transition::Accept { volunteer_id: vid };
        assert_eq!(status_condition(&accept), "in.(pending)");
        assert_eq!(status_condition(&Transition::Cancel), "in.(pending,in_progress)");

        let patch = serde_json::to_value(StatusPatch::from(&accept)).unwrap();
        assert_eq!(patch["status"], "in_progress");
        assert_eq!(patch["assigned_volunteer_id"], vid.to_string());
        let patch = serde_json::to_value(StatusPatch::from(&Transition::Complete)).unwrap();
        assert!(patch.get("assigned_volunteer_id").is_none());
    }

    #[test]
    fn service_messages_are_classified() {
        let dup = error_message(r#"{"code":422,"msg":"User already registered"}"#).unwrap();
        assert!(matches!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, dup),
            PlatformError::DuplicateRegistration
        ));

        let bad = error_message(
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )
        .unwrap();
        assert!(matches!(classify(StatusCode::BAD_REQUEST, bad), PlatformError::InvalidCredentials));

        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, "JWT expired".into()),
            PlatformError::Unauthorized
        ));
        match classify(StatusCode::BAD_REQUEST, "new row violates row-level security policy".into()) {
            PlatformError::Rejected(msg) => assert!(msg.contains("row-level security")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sign_up_metadata_carries_role_and_name() {
        let account = NewAccount {
            email: " ana@example.com ".into(),
            password: "secret1".into(),
            full_name: "Ana".into(),
            role: Role::Volunteer,
            phone: Some("".into()),
        };
        let body = serde_json::to_value(SignUpBody::from_account(&account)).unwrap();
        assert_eq!(body["email"], "ana@example.com");
        assert_eq!(body["data"]["role"], "volunteer");
        assert!(body["data"].get("phone").is_none());
    }
}
