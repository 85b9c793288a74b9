//! Page routes and the role gate in front of them.

use serde::Serialize;

use lifeline_types::models::Role;

use crate::identity::IdentityState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Landing,
    Auth,
    VictimDashboard,
    VictimRequest,
    VictimMyRequests,
    VolunteerDashboard,
    VolunteerRequests,
    VolunteerMyRescues,
    AdminDashboard,
    Notifications,
    NotFound,
}

const VICTIM: &[Role] = &[Role::Victim];
const VOLUNTEER: &[Role] = &[Role::Volunteer];
const ADMIN: &[Role] = &[Role::Admin];
const ANY_ROLE: &[Role] = &Role::ALL;

impl Route {
    pub const ALL: [Route; 10] = [
        Route::Landing,
        Route::Auth,
        Route::VictimDashboard,
        Route::VictimRequest,
        Route::VictimMyRequests,
        Route::VolunteerDashboard,
        Route::VolunteerRequests,
        Route::VolunteerMyRescues,
        Route::AdminDashboard,
        Route::Notifications,
    ];

    /// Match a request path; query strings and a trailing slash are ignored.
    pub fn parse(path: &str) -> Route {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        Route::ALL
            .into_iter()
            .find(|r| r.path() == path)
            .unwrap_or(Route::NotFound)
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::Auth => "/auth",
            Route::VictimDashboard => "/victim",
            Route::VictimRequest => "/victim/request",
            Route::VictimMyRequests => "/victim/my-requests",
            Route::VolunteerDashboard => "/volunteer",
            Route::VolunteerRequests => "/volunteer/requests",
            Route::VolunteerMyRescues => "/volunteer/my-rescues",
            Route::AdminDashboard => "/admin",
            Route::Notifications => "/notifications",
            Route::NotFound => "/404",
        }
    }

    /// `None` for public pages.
    pub fn required_roles(self) -> Option<&'static [Role]> {
        match self {
            Route::Landing | Route::Auth | Route::NotFound => None,
            Route::VictimDashboard | Route::VictimRequest | Route::VictimMyRequests => Some(VICTIM),
            Route::VolunteerDashboard | Route::VolunteerRequests | Route::VolunteerMyRescues => {
                Some(VOLUNTEER)
            }
            Route::AdminDashboard => Some(ADMIN),
            Route::Notifications => Some(ANY_ROLE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Render,
    /// Identity is still being restored; show a loading state, do not redirect.
    Wait,
    Redirect(&'static str),
}

/// Decide what to do with a navigation. Re-run on every navigation and every
/// identity change.
pub fn gate(route: Route, identity: &IdentityState) -> GateDecision {
    let Some(roles) = route.required_roles() else {
        return GateDecision::Render;
    };
    match identity {
        IdentityState::Unknown => GateDecision::Wait,
        IdentityState::SignedOut => GateDecision::Redirect(Route::Auth.path()),
        IdentityState::SignedIn(p) if roles.contains(&p.role()) => GateDecision::Render,
        IdentityState::SignedIn(_) => GateDecision::Redirect(Route::Landing.path()),
    }
}

/// Where a freshly registered user lands.
pub fn home_for(role: Role) -> Route {
    match role {
        Role::Victim => Route::VictimDashboard,
        Role::Volunteer => Route::VolunteerDashboard,
        Role::Admin => Route::AdminDashboard,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NavLink {
    pub label: &'static str,
    pub path: &'static str,
}

const fn link(label: &'static str, path: &'static str) -> NavLink {
    NavLink { label, path }
}

const VICTIM_NAV: &[NavLink] = &[
    link("Dashboard", "/victim"),
    link("Request Help", "/victim/request"),
    link("My Requests", "/victim/my-requests"),
    link("Notifications", "/notifications"),
];

const VOLUNTEER_NAV: &[NavLink] = &[
    link("Dashboard", "/volunteer"),
    link("Nearby Requests", "/volunteer/requests"),
    link("My Rescues", "/volunteer/my-rescues"),
    link("Notifications", "/notifications"),
];

const ADMIN_NAV: &[NavLink] = &[link("Dashboard", "/admin"), link("Notifications", "/notifications")];

/// Dashboard navigation for a role. Only routes that exist are listed.
pub fn nav_links(role: Role) -> &'static [NavLink] {
    match role {
        Role::Victim => VICTIM_NAV,
        Role::Volunteer => VOLUNTEER_NAV,
        Role::Admin => ADMIN_NAV,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Principal;
    use chrono::Utc;
    use lifeline_types::api::Session;
    use lifeline_types::models::Profile;
    use uuid::Uuid;

    fn signed_in(role: Role) -> IdentityState {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        IdentityState::SignedIn(Principal {
            session: Session {
                access_token: "t".into(),
                user_id,
                email: "x@example.com".into(),
                expires_at: None,
            },
            profile: Profile {
                user_id,
                email: "x@example.com".into(),
                full_name: "X".into(),
                role,
                phone: None,
                avatar_url: None,
                created_at: now,
                updated_at: now,
            },
        })
    }

    #[test]
    fn parse_known_and_unknown_paths() {
        assert_eq!(Route::parse("/"), Route::Landing);
        assert_eq!(Route::parse(""), Route::Landing);
        assert_eq!(Route::parse("/victim/"), Route::VictimDashboard);
        assert_eq!(Route::parse("/volunteer/requests?tab=near"), Route::VolunteerRequests);
        assert_eq!(Route::parse("/admin/settings"), Route::NotFound);
        for route in Route::ALL {
            assert_eq!(Route::parse(route.path()), route);
        }
    }

    #[test]
    fn volunteer_on_admin_is_sent_home() {
        assert_eq!(
            gate(Route::AdminDashboard, &signed_in(Role::Volunteer)),
            GateDecision::Redirect("/")
        );
        assert_eq!(gate(Route::AdminDashboard, &signed_in(Role::Admin)), GateDecision::Render);
    }

    #[test]
    fn unknown_identity_waits_and_signed_out_goes_to_auth() {
        for route in Route::ALL.into_iter().filter(|r| r.required_roles().is_some()) {
            assert_eq!(gate(route, &IdentityState::Unknown), GateDecision::Wait);
            assert_eq!(gate(route, &IdentityState::SignedOut), GateDecision::Redirect("/auth"));
        }
        assert_eq!(gate(Route::Landing, &IdentityState::Unknown), GateDecision::Render);
        assert_eq!(gate(Route::NotFound, &IdentityState::SignedOut), GateDecision::Render);
    }

    #[test]
    fn each_role_renders_its_own_pages_only() {
        for role in Role::ALL {
            let state = signed_in(role);
            for nav in nav_links(role) {
                let route = Route::parse(nav.path);
                assert_ne!(route, Route::NotFound, "{}", nav.path);
                assert_eq!(gate(route, &state), GateDecision::Render);
            }
            assert_eq!(gate(home_for(role), &state), GateDecision::Render);
        }
        assert_eq!(
            gate(Route::VictimRequest, &signed_in(Role::Admin)),
            GateDecision::Redirect("/")
        );
    }
}
