pub mod auth;
pub mod complaints;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod notify;
pub mod users;

use axum::Router;
use axum::routing::{get, post};

use crate::auth::AppState;

/// Assemble the REST surface. The WebSocket gateway route is wired by the
/// server binary, which owns the upgrade handler.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/complaints",
            post(complaints::create_complaint).get(complaints::list_complaints),
        )
        .route("/complaints/{id}", get(complaints::get_complaint))
        .route("/complaints/{id}/status", post(complaints::transition_status))
        .route("/complaints/{id}/assign", post(complaints::assign))
        .route(
            "/complaints/{id}/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route("/users", get(users::list_users))
        .route("/users/{id}/role", post(users::set_role))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC and convert; fall back to the RFC 3339 form.
pub(crate) fn parse_ts(s: &str) -> chrono::DateTime<chrono::Utc> {
    s.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::warn!("Corrupt timestamp '{}': {}", s, e);
            chrono::DateTime::default()
        })
}

pub(crate) fn parse_opt_ts(s: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    s.map(parse_ts)
}
