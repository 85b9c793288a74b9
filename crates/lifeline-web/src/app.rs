use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use lifeline_platform::{LocalPlatform, Platform};

use crate::{actions, live, pages, session, storage};

/// Base64 photo plus form fields. Photos themselves are capped at 10 MB.
const MAX_BODY: usize = 16 * 1024 * 1024;

/// Pages, actions and live sockets over any platform. `extra` carries
/// backend-specific routes.
pub fn router<P: Platform>(platform: P, extra: Router) -> Router {
    let pages: Router<P> = Router::new()
        .route("/", get(pages::landing))
        .route("/auth", get(pages::auth))
        .route("/victim", get(pages::victim_dashboard::<P>))
        .route("/victim/request", get(pages::request_form).post(actions::submit_request::<P>))
        .route("/victim/my-requests", get(pages::my_requests::<P>))
        .route("/volunteer", get(pages::volunteer_dashboard::<P>))
        .route("/volunteer/requests", get(pages::pending_requests::<P>))
        .route("/volunteer/my-rescues", get(pages::my_rescues::<P>))
        .route("/admin", get(pages::admin_dashboard))
        .route("/notifications", get(pages::notifications::<P>));

    let actions: Router<P> = Router::new()
        .route("/auth/sign-in", post(actions::sign_in::<P>))
        .route("/auth/sign-up", post(actions::sign_up::<P>))
        .route("/auth/sign-out", post(actions::sign_out::<P>))
        .route("/victim/request/locate", post(actions::locate))
        .route("/victim/requests/{id}/cancel", post(actions::cancel_request::<P>))
        .route("/victim/requests/{id}/updates", get(actions::rescue_log::<P>))
        .route("/volunteer/requests/{id}/accept", post(actions::accept_request::<P>))
        .route("/volunteer/rescues/{id}/complete", post(actions::complete_rescue::<P>))
        .route("/volunteer/availability", post(actions::set_availability::<P>))
        .route("/notifications/{id}/read", post(actions::mark_notification_read::<P>));

    let sockets: Router<P> = Router::new()
        .route("/live/my-requests", get(live::my_requests::<P>))
        .route("/live/pending", get(live::pending::<P>));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .merge(pages)
        .merge(actions)
        .merge(sockets)
        .layer(middleware::from_fn(session::gate_pages))
        .layer(middleware::from_fn_with_state(platform.clone(), session::resolve_identity::<P>))
        .with_state(platform)
        .merge(extra)
        .layer(DefaultBodyLimit::max(MAX_BODY))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Routes only the embedded platform serves.
pub fn local_routes(platform: LocalPlatform) -> Router {
    Router::new()
        .route("/storage/v1/object/public/{bucket}/{*path}", get(storage::public_object))
        .with_state(platform)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use lifeline_db::Database;
    use lifeline_platform::local::ObjectStore;

    use super::*;

    async fn platform() -> LocalPlatform {
        let db = Database::open_in_memory().unwrap();
        let dir = std::env::temp_dir().join(format!("lifeline-web-{}", uuid::Uuid::new_v4()));
        let storage = ObjectStore::new(dir).await.unwrap();
        LocalPlatform::new(db, storage, "web-test-secret".into(), "http://localhost:3000".into())
    }

    fn app(platform: &LocalPlatform) -> Router {
        router(platform.clone(), local_routes(platform.clone()))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body, cookie.or(location))
    }

    fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn get_page(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::get(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        req.body(Body::empty()).unwrap()
    }

    /// Sign up and return the session token from the cookie.
    async fn register(app: &Router, email: &str, role: &str) -> String {
        let (status, body, cookie) = send(
            app,
            post(
                "/auth/sign-up",
                None,
                json!({ "email": email, "password": "hunter22", "full_name": "Test User", "role": role }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let cookie = cookie.unwrap();
        let token = cookie
            .strip_prefix("lifeline_session=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        token.to_string()
    }

    #[tokio::test]
    async fn signed_out_pages_redirect_to_auth() {
        let platform = platform().await;
        let app = app(&platform);

        let (status, _, location) = send(&app, get_page("/victim", None)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("/auth"));

        let (status, body, _) = send(&app, get_page("/", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["viewer"].is_null());
    }

    #[tokio::test]
    async fn volunteer_is_sent_home_from_admin() {
        let platform = platform().await;
        let app = app(&platform);
        let token = register(&app, "vol@example.com", "volunteer").await;

        let (status, _, location) = send(&app, get_page("/admin", Some(&token))).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location.as_deref(), Some("/"));

        let (status, body, _) = send(&app, get_page("/volunteer", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nav"][0]["path"], "/volunteer");
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_a_conflict() {
        let platform = platform().await;
        let app = app(&platform);
        register(&app, "dup@example.com", "victim").await;

        let (status, body, _) = send(
            &app,
            post(
                "/auth/sign-up",
                None,
                json!({ "email": "dup@example.com", "password": "hunter22", "full_name": "Again", "role": "victim" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "This email is already registered. Please sign in instead.");
    }

    #[tokio::test]
    async fn submit_then_second_accept_conflicts() {
        let platform = platform().await;
        let app = app(&platform);
        let victim = register(&app, "victim@example.com", "victim").await;
        let first = register(&app, "first@example.com", "volunteer").await;
        let second = register(&app, "second@example.com", "volunteer").await;

        let (status, body, _) = send(
            &app,
            post(
                "/victim/request",
                Some(&victim),
                json!({
                    "name": "Ana",
                    "phone": "555-0100",
                    "emergency_type": "fire",
                    "latitude": 34.05,
                    "longitude": -118.24,
                    "photo": { "file_name": "smoke.png", "content_type": "image/png", "data": "iVBORw0KGgo=" }
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["request"]["status"], "pending");
        assert_eq!(body["redirect"], "/victim/my-requests");
        let id = body["request"]["id"].as_str().unwrap().to_string();

        let photo_url = body["request"]["photo_url"].as_str().unwrap();
        let photo_path = photo_url.strip_prefix("http://localhost:3000").unwrap();
        let (status, _, _) = send(&app, get_page(photo_path, None)).await;
        assert_eq!(status, StatusCode::OK);

        let accept = format!("/volunteer/requests/{}/accept", id);
        let (status, body, _) = send(&app, post(&accept, Some(&first), json!({}))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(body["request"]["directions"].as_str().unwrap().contains("destination=34.05,-118.24"));

        let (status, _, _) = send(&app, post(&accept, Some(&second), json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn volunteer_submission_is_forbidden() {
        let platform = platform().await;
        let app = app(&platform);
        let volunteer = register(&app, "helper@example.com", "volunteer").await;

        let (status, body, _) = send(
            &app,
            post(
                "/victim/request",
                Some(&volunteer),
                json!({ "name": "Vic", "phone": "1", "emergency_type": "fire", "latitude": 1.0, "longitude": 2.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Only victim accounts can submit help requests");
    }

    #[tokio::test]
    async fn zero_coordinates_are_unprocessable() {
        let platform = platform().await;
        let app = app(&platform);
        let victim = register(&app, "zero@example.com", "victim").await;

        let (status, body, _) = send(
            &app,
            post(
                "/victim/request",
                Some(&victim),
                json!({ "name": "Ana", "phone": "1", "emergency_type": "flood", "latitude": 0.0, "longitude": 0.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "Please provide your location");
    }

    #[tokio::test]
    async fn actions_need_a_session() {
        let platform = platform().await;
        let app = app(&platform);
        let (status, _, _) = send(&app, post("/volunteer/availability", None, json!({ "is_active": false }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn locate_without_position_keeps_the_form() {
        let platform = platform().await;
        let app = app(&platform);
        let victim = register(&app, "loc@example.com", "victim").await;

        let (status, body, _) = send(
            &app,
            post("/victim/request/locate", Some(&victim), json!({ "name": "Ana", "position": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notice"]["kind"], "error");
        assert_eq!(body["form"]["latitude"], 0.0);

        let (_, body, _) = send(
            &app,
            post(
                "/victim/request/locate",
                Some(&victim),
                json!({ "position": { "latitude": 1.5, "longitude": 2.25 } }),
            ),
        )
        .await;
        assert_eq!(body["notice"]["message"], "Location detected");
        assert_eq!(body["form"]["address"], "1.500000, 2.250000");
    }
}
