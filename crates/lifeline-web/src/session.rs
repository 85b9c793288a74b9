//! Session cookie, per-request identity and the page gate.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{Method, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::debug;

use lifeline_app::identity::{self, IdentityState, Principal};
use lifeline_app::router::{self, GateDecision, Route};
use lifeline_platform::Platform;

use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "lifeline_session";

/// Token from the session cookie, else from `Authorization: Bearer`.
pub fn access_token(req: &Request) -> Option<String> {
    let jar = CookieJar::from_headers(req.headers());
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

pub fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub fn expired_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Restore the caller's identity and attach it to the request.
pub async fn resolve_identity<P: Platform>(
    State(platform): State<P>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = access_token(&req);
    let identity = identity::resolve(&platform, token.as_deref()).await;
    req.extensions_mut().insert(identity);
    next.run(req).await
}

/// Apply the role gate to page loads. Actions check roles themselves.
pub async fn gate_pages(req: Request, next: Next) -> Response {
    if req.method() != Method::GET {
        return next.run(req).await;
    }

    let route = Route::parse(req.uri().path());
    let identity = req.extensions().get::<IdentityState>().cloned().unwrap_or(IdentityState::SignedOut);

    match router::gate(route, &identity) {
        GateDecision::Render => next.run(req).await,
        GateDecision::Wait => (StatusCode::SERVICE_UNAVAILABLE, "Loading").into_response(),
        GateDecision::Redirect(to) => {
            debug!("Gate sent {} to {}", req.uri().path(), to);
            Redirect::to(to).into_response()
        }
    }
}

/// The signed-in caller. Rejects with 401 otherwise.
pub struct Caller(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<IdentityState>() {
            Some(IdentityState::SignedIn(principal)) => Ok(Caller(principal.clone())),
            _ => Err(ApiError::unauthorized()),
        }
    }
}

/// The caller's identity, signed in or not.
pub struct Identity(pub IdentityState);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Identity(parts.extensions.get::<IdentityState>().cloned().unwrap_or(IdentityState::SignedOut)))
    }
}
