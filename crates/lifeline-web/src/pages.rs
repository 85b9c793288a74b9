//! Page view models. Every page the gate lets through renders as JSON.

use axum::{Json, extract::State};
use serde::Serialize;

use lifeline_app::admin::{self, AdminDashboard};
use lifeline_app::badges::{self, StatusBadge, TypeBadge};
use lifeline_app::notifications;
use lifeline_app::router::{self, NavLink};
use lifeline_app::victim::{self, RequestForm, VictimDashboard};
use lifeline_app::volunteer::{self, VolunteerDashboard};
use lifeline_app::{IdentityState, Principal};
use lifeline_platform::Platform;
use lifeline_types::models::{EmergencyType, HelpRequest, Notification, Role};

use crate::error::ApiError;
use crate::session::{Caller, Identity};

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub nav: &'static [NavLink],
    #[serde(flatten)]
    pub body: T,
}

fn page<T: Serialize>(principal: &Principal, body: T) -> Json<Page<T>> {
    Json(Page { nav: router::nav_links(principal.role()), body })
}

/// A help request with its badges, as every list shows it.
#[derive(Debug, Serialize)]
pub struct RequestCard {
    #[serde(flatten)]
    pub request: HelpRequest,
    pub status_badge: StatusBadge,
    pub type_badge: TypeBadge,
    /// Directions link, on volunteer pages only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directions: Option<String>,
}

impl RequestCard {
    pub fn new(request: HelpRequest) -> Self {
        Self {
            status_badge: badges::status_badge(request.status),
            type_badge: badges::type_badge(request.emergency_type),
            directions: None,
            request,
        }
    }

    pub fn with_directions(request: HelpRequest) -> Self {
        let directions = volunteer::navigation_url(request.latitude, request.longitude);
        Self { directions: Some(directions), ..Self::new(request) }
    }
}

pub fn cards(requests: Vec<HelpRequest>) -> Vec<RequestCard> {
    requests.into_iter().map(RequestCard::new).collect()
}

pub fn cards_with_directions(requests: Vec<HelpRequest>) -> Vec<RequestCard> {
    requests.into_iter().map(RequestCard::with_directions).collect()
}

// ── Public ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Viewer {
    pub full_name: String,
    pub role: Role,
    pub home: &'static str,
}

impl Viewer {
    pub fn of(principal: &Principal) -> Self {
        Self {
            full_name: principal.profile.full_name.clone(),
            role: principal.role(),
            home: router::home_for(principal.role()).path(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LandingView {
    pub viewer: Option<Viewer>,
    pub nav: &'static [NavLink],
}

pub async fn landing(Identity(identity): Identity) -> Json<LandingView> {
    let principal = identity.principal();
    Json(LandingView {
        viewer: principal.map(Viewer::of),
        nav: principal.map(|p| router::nav_links(p.role())).unwrap_or_default(),
    })
}

#[derive(Debug, Serialize)]
pub struct AuthView {
    pub roles: [Role; 3],
    /// Already signed in: where to go instead.
    pub redirect: Option<&'static str>,
}

pub async fn auth(Identity(identity): Identity) -> Json<AuthView> {
    let redirect = match &identity {
        IdentityState::SignedIn(p) => Some(router::home_for(p.role()).path()),
        _ => None,
    };
    Json(AuthView { roles: Role::ALL, redirect })
}

// ── Victim ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct VictimDashboardView {
    #[serde(flatten)]
    pub dashboard: VictimDashboard,
    pub recent_cards: Vec<RequestCard>,
}

pub async fn victim_dashboard<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
) -> Result<Json<Page<VictimDashboardView>>, ApiError> {
    let dashboard = victim::dashboard(&platform, &principal).await?;
    let recent_cards = cards(dashboard.recent.clone());
    Ok(page(&principal, VictimDashboardView { dashboard, recent_cards }))
}

#[derive(Debug, Serialize)]
pub struct TypeOption {
    pub value: EmergencyType,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RequestFormView {
    pub form: RequestForm,
    pub emergency_types: Vec<TypeOption>,
}

pub async fn request_form(Caller(principal): Caller) -> Json<Page<RequestFormView>> {
    let emergency_types = EmergencyType::ALL
        .into_iter()
        .map(|value| TypeOption { value, label: badges::form_label(value) })
        .collect();
    page(&principal, RequestFormView { form: RequestForm::for_principal(&principal), emergency_types })
}

#[derive(Debug, Serialize)]
pub struct RequestListView {
    pub requests: Vec<RequestCard>,
}

pub async fn my_requests<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
) -> Result<Json<Page<RequestListView>>, ApiError> {
    let requests = victim::list_my_requests(&platform, &principal).await?;
    Ok(page(&principal, RequestListView { requests: cards(requests) }))
}

// ── Volunteer ───────────────────────────────────────────────────────────

pub async fn volunteer_dashboard<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
) -> Result<Json<Page<VolunteerDashboard>>, ApiError> {
    let dashboard = volunteer::dashboard(&platform, &principal).await?;
    Ok(page(&principal, dashboard))
}

pub async fn pending_requests<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
) -> Result<Json<Page<RequestListView>>, ApiError> {
    let requests = volunteer::list_pending(&platform, &principal).await?;
    Ok(page(&principal, RequestListView { requests: cards_with_directions(requests) }))
}

pub async fn my_rescues<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
) -> Result<Json<Page<RequestListView>>, ApiError> {
    let requests = volunteer::list_my_rescues(&platform, &principal).await?;
    Ok(page(&principal, RequestListView { requests: cards_with_directions(requests) }))
}

// ── Admin ───────────────────────────────────────────────────────────────

pub async fn admin_dashboard(
    Caller(principal): Caller,
) -> Result<Json<Page<AdminDashboard>>, ApiError> {
    let dashboard = admin::dashboard(&principal)?;
    Ok(page(&principal, dashboard))
}

// ── Notifications ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct NotificationsView {
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

pub async fn notifications<P: Platform>(
    State(platform): State<P>,
    Caller(principal): Caller,
) -> Result<Json<Page<NotificationsView>>, ApiError> {
    let notifications = notifications::list(&platform, &principal).await?;
    let unread = notifications.iter().filter(|n| !n.is_read).count();
    Ok(page(&principal, NotificationsView { notifications, unread }))
}
