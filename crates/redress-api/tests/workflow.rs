//! End-to-end tests over the REST surface: an in-memory database, the real
//! router, and requests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use redress_api::auth::{AppState, AppStateInner};
use redress_api::notify::Sink;
use redress_db::Database;
use redress_gateway::dispatcher::Dispatcher;

fn test_state() -> AppState {
    let db = Arc::new(Database::open_in_memory().unwrap());
    Arc::new(AppStateInner {
        db,
        jwt_secret: "test-secret".to_string(),
        dispatcher: Dispatcher::new(),
        sink: Sink::disabled(),
    })
}

async fn request(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, email: &str, full_name: &str) -> (Uuid, String) {
    let (status, body) = request(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "email": email,
            "password": "correct-horse-battery",
            "full_name": full_name,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    (
        body["user_id"].as_str().unwrap().parse().unwrap(),
        body["token"].as_str().unwrap().to_string(),
    )
}

fn grant_role(state: &AppState, user: Uuid, role: &str) {
    state
        .db
        .set_role(&Uuid::new_v4().to_string(), &user.to_string(), role, None)
        .unwrap();
}

fn body_id(id: Uuid) -> Value {
    Value::String(id.to_string())
}

async fn file_complaint(app: &Router, token: &str, title: &str, anonymous: bool) -> Uuid {
    let (status, body) = request(
        app,
        "POST",
        "/complaints",
        Some(token),
        Some(json!({
            "title": title,
            "description": "A detailed description long enough to pass validation.",
            "category": "Infrastructure",
            "priority": "High",
            "is_anonymous": anonymous,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    assert_eq!(body["status"], "Submitted");
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn transition(app: &Router, token: &str, id: Uuid, status: &str) -> (StatusCode, Value) {
    request(
        app,
        "POST",
        &format!("/complaints/{id}/status"),
        Some(token),
        Some(json!({ "status": status })),
    )
    .await
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let app = redress_api::router(test_state());
    let (status, body) = request(&app, "GET", "/complaints", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn lifecycle_walks_the_graph_and_rejects_jumps() {
    let state = test_state();
    let app = redress_api::router(state.clone());

    let (_alice_id, alice) = register(&app, "alice@campus.edu", "Alice Kurian").await;
    let (bob_id, bob) = register(&app, "bob@campus.edu", "Bob Staffer").await;
    grant_role(&state, bob_id, "staff");

    let id = file_complaint(&app, &alice, "Leaking roof in block C", false).await;

    // Freshly filed: one history entry, status matches it.
    let (status, detail) = request(&app, "GET", &format!("/complaints/{id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["history"].as_array().unwrap().len(), 1);
    assert_eq!(detail["history"][0]["status"], "Submitted");

    // Staff moves it to In Review.
    let (status, _) = transition(&app, &bob, id, "In Review").await;
    assert_eq!(status, StatusCode::OK);

    // Jumping straight to Resolved must pass through In Progress.
    let (status, body) = transition(&app, &bob, id, "Resolved").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_transition");

    // Escalation side branch: In Review -> Escalated -> In Progress.
    let (status, body) = transition(&app, &bob, id, "Escalated").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["escalated_at"].is_string());

    let (status, _) = transition(&app, &bob, id, "In Progress").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = transition(&app, &bob, id, "Resolved").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["resolved_at"].is_string());

    let (status, _) = transition(&app, &bob, id, "Closed").await;
    assert_eq!(status, StatusCode::OK);

    // Closed is terminal.
    let (status, body) = transition(&app, &bob, id, "In Review").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "terminal_state");

    // Status always equals the latest history entry, and every consecutive
    // pair in the history is a valid edge.
    let (_, detail) = request(&app, "GET", &format!("/complaints/{id}"), Some(&alice), None).await;
    let history = detail["history"].as_array().unwrap();
    assert_eq!(history.len(), 6);
    assert_eq!(history.last().unwrap()["status"], detail["status"]);

    let expected = [
        "Submitted",
        "In Review",
        "Escalated",
        "In Progress",
        "Resolved",
        "Closed",
    ];
    let recorded: Vec<&str> = history
        .iter()
        .map(|h| h["status"].as_str().unwrap())
        .collect();
    assert_eq!(recorded, expected);

    // Unknown status is a validation failure, not a lifecycle error.
    let (status, body) = transition(&app, &bob, id, "Reopened").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_failed");
}

#[tokio::test]
async fn owner_never_transitions_own_complaint() {
    let state = test_state();
    let app = redress_api::router(state.clone());

    let (alice_id, alice) = register(&app, "alice@campus.edu", "Alice Kurian").await;
    // Even holding a staff role does not allow self-transition.
    grant_role(&state, alice_id, "staff");

    let id = file_complaint(&app, &alice, "Unfair grading in CS101", false).await;

    let (status, body) = transition(&app, &alice, id, "In Review").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    // A plain student who is not the owner is also rejected.
    let (_carol_id, carol) = register(&app, "carol@campus.edu", "Carol Mathew").await;
    let (status, _) = transition(&app, &carol, id, "In Review").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn anonymity_projection_redacts_and_conflates() {
    let state = test_state();
    let app = redress_api::router(state.clone());

    let (_alice_id, alice) = register(&app, "alice@campus.edu", "Alice Kurian").await;
    let (bob_id, bob) = register(&app, "bob@campus.edu", "Bob Staffer").await;
    let (_carol_id, carol) = register(&app, "carol@campus.edu", "Carol Mathew").await;
    grant_role(&state, bob_id, "staff");

    let id = file_complaint(&app, &alice, "Harassment by a senior student", true).await;

    // The owner always sees their own identity.
    let (status, body) = request(&app, "GET", &format!("/complaints/{id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reporter"]["full_name"], "Alice Kurian");

    // Staff can view, but the reporter field is present and null.
    let (status, body) = request(&app, "GET", &format!("/complaints/{id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("reporter").is_some());
    assert!(body["reporter"].is_null());

    // A different student gets NotFound, not Forbidden: existence must not leak.
    let (status, body) = request(&app, "GET", &format!("/complaints/{id}"), Some(&carol), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    // The listing view applies the same projection.
    let (_, listing) = request(&app, "GET", "/complaints", Some(&bob), None).await;
    let listed = listing
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["id"] == body_id(id))
        .cloned();
    let listed = listed.unwrap();
    assert!(listed["reporter"].is_null());
    assert_eq!(listed["is_anonymous"], true);

    // Scope is enforced: a student cannot request the full queue, and the
    // owner's own listing still carries their complaint.
    let (status, _) = request(&app, "GET", "/complaints?scope=all", Some(&carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, mine) = request(&app, "GET", "/complaints?scope=mine", Some(&alice), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn messages_preserve_commit_order_and_derive_staff_flag() {
    let state = test_state();
    let app = redress_api::router(state.clone());

    let (_alice_id, alice) = register(&app, "alice@campus.edu", "Alice Kurian").await;
    let (bob_id, bob) = register(&app, "bob@campus.edu", "Bob Staffer").await;
    grant_role(&state, bob_id, "staff");

    let id = file_complaint(&app, &alice, "Wi-Fi keeps dropping in hostel", false).await;
    let path = format!("/complaints/{id}/messages");

    // The payload tries to claim staff status; the flag is derived, not read.
    let (status, body) = request(
        &app,
        "POST",
        &path,
        Some(&alice),
        Some(json!({ "body": "first", "is_staff": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_staff"], false);

    let (status, body) = request(&app, "POST", &path, Some(&bob), Some(json!({ "body": "second" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_staff"], true);

    let (status, _) = request(&app, "POST", &path, Some(&alice), Some(json!({ "body": "third" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    // Three messages from two actors come back in submission order.
    let (status, listing) = request(&app, "GET", &path, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    let bodies: Vec<&str> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, ["first", "second", "third"]);
    assert_eq!(listing[0]["author_name"], "Alice Kurian");
    assert_eq!(listing[1]["author_name"], "Bob Staffer");

    // Validation: empty and oversized bodies never land in the log.
    let (status, body) = request(&app, "POST", &path, Some(&alice), Some(json!({ "body": "   " }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_failed");

    let long = "x".repeat(2001);
    let (status, _) = request(&app, "POST", &path, Some(&alice), Some(json!({ "body": long }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // A student with no stake in the complaint cannot read the thread.
    let (_carol_id, carol) = register(&app, "carol@campus.edu", "Carol Mathew").await;
    let (status, _) = request(&app, "GET", &path, Some(&carol), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn notifications_record_lifecycle_and_message_events() {
    let state = test_state();
    let app = redress_api::router(state.clone());

    let (_alice_id, alice) = register(&app, "alice@campus.edu", "Alice Kurian").await;
    let (bob_id, bob) = register(&app, "bob@campus.edu", "Bob Staffer").await;
    grant_role(&state, bob_id, "staff");

    let id = file_complaint(&app, &alice, "Broken projector in room 204", false).await;

    // Staff transition notifies the owner, synchronously with the action.
    let (status, _) = transition(&app, &bob, id, "In Review").await;
    assert_eq!(status, StatusCode::OK);

    let (_, feed) = request(&app, "GET", "/notifications", Some(&alice), None).await;
    let feed = feed.as_array().unwrap().clone();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["kind"], "status_update");
    assert_eq!(feed[0]["complaint_id"], body_id(id));
    assert_eq!(feed[0]["is_read"], false);

    // Owner message with no assignee notifies the staff pool.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/complaints/{id}/messages"),
        Some(&alice),
        Some(json!({ "body": "Any update on this?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, staff_feed) = request(&app, "GET", "/notifications", Some(&bob), None).await;
    let staff_feed = staff_feed.as_array().unwrap().clone();
    assert_eq!(staff_feed.len(), 1);
    assert_eq!(staff_feed[0]["kind"], "new_message");

    // Only the recipient can flip the read flag.
    let notification_id = feed[0]["id"].as_str().unwrap();
    let read_path = format!("/notifications/{notification_id}/read");
    let (status, _) = request(&app, "POST", &read_path, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(&app, "POST", &read_path, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, feed) = request(&app, "GET", "/notifications", Some(&alice), None).await;
    assert_eq!(feed[0]["is_read"], true);
}

#[tokio::test]
async fn role_management_is_admin_only_and_takes_effect_immediately() {
    let state = test_state();
    let app = redress_api::router(state.clone());

    let (adele_id, adele) = register(&app, "adele@campus.edu", "Adele Admin").await;
    grant_role(&state, adele_id, "admin");
    let (carol_id, carol) = register(&app, "carol@campus.edu", "Carol Mathew").await;
    let (_alice_id, alice) = register(&app, "alice@campus.edu", "Alice Kurian").await;

    // Non-admins cannot list users or grant roles.
    let (status, _) = request(&app, "GET", "/users", Some(&carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = request(
        &app,
        "POST",
        &format!("/users/{carol_id}/role"),
        Some(&carol),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins cannot modify their own role (self-lockout guard).
    let (status, _) = request(
        &app,
        "POST",
        &format!("/users/{adele_id}/role"),
        Some(&adele),
        Some(json!({ "role": "student" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Unknown roles are a validation failure.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/users/{carol_id}/role"),
        Some(&adele),
        Some(json!({ "role": "warden" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Grant staff to Carol; the user listing reflects it.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/users/{carol_id}/role"),
        Some(&adele),
        Some(json!({ "role": "staff", "department": "CSE" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let roles: Vec<&str> = body["roles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["role"].as_str().unwrap())
        .collect();
    assert!(roles.contains(&"staff"));

    // The grant is visible to Carol's very next request without re-login.
    let id = file_complaint(&app, &alice, "Canteen food quality declining", false).await;
    let (status, _) = transition(&app, &carol, id, "In Review").await;
    assert_eq!(status, StatusCode::OK);

    // Users with no explicit role rows list as students.
    let (_, users) = request(&app, "GET", "/users", Some(&adele), None).await;
    let alice_entry = users
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == "alice@campus.edu")
        .cloned()
        .unwrap();
    assert_eq!(alice_entry["roles"][0]["role"], "student");
}
