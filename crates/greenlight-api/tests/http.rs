use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use greenlight_api::{AppState, AppStateInner, router};
use greenlight_db::Database;
use greenlight_types::events::RealtimeEvent;

struct TestApp {
    app: Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let state: AppState = Arc::new(AppStateInner::new(db, "test-secret"));
        Self {
            app: router(state.clone()),
            state,
        }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Registers a user and returns `(user_id, token)`.
    async fn register(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "username": username, "password": "correct-horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["user_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    async fn create_light(&self, token: &str, body: Value) -> String {
        let (status, light) = self.call(Method::POST, "/api/lights", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", light);
        light["id"].as_str().unwrap().to_string()
    }

    async fn unread(&self, token: &str) -> u64 {
        let (_, count) = self.call(Method::GET, "/api/notifications/count", Some(token), None).await;
        count["unread"].as_u64().unwrap()
    }
}

fn light_body(title: &str, start_in: Duration, max_limit: Option<u32>) -> Value {
    let start = Utc::now() + start_in;
    json!({
        "title": title,
        "location": "Riverside park",
        "start_time": start,
        "end_time": start + Duration::hours(2),
        "max_limit": max_limit,
    })
}

#[tokio::test]
async fn test_register_login_and_auth_gate() {
    let t = TestApp::new();
    let (user_id, _) = t.register("ada").await;

    let (status, _) = t
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "ada", "password": "another-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "ada", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "ada", "password": "correct-horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id);
    let token = body["token"].as_str().unwrap();

    let (status, _) = t.call(Method::GET, "/api/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, me) = t.call(Method::GET, "/api/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "ada");

    let (status, health) = t.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_invite_via_list_dedupes_and_notifies() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;
    let (cid, _) = t.register("cat").await;

    let (status, list) = t
        .call(
            Method::POST,
            "/api/lists",
            Some(&host),
            Some(json!({ "name": "Climbing", "member_ids": [bob_id, cid] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(list["members"].as_array().unwrap().len(), 2);

    let list_id = list["id"].clone();
    let light_id = t.create_light(&host, light_body("Bouldering", Duration::days(2), None)).await;
    let uri = format!("/api/lights/{}/invitations", light_id);

    // Bob is both a list member and named directly.
    let (status, res) = t
        .call(
            Method::POST,
            &uri,
            Some(&host),
            Some(json!({ "list_ids": [list_id], "user_ids": [bob_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["invited"].as_array().unwrap().len(), 2);
    assert_eq!(res["already_invited"], 0);

    let (_, again) = t
        .call(Method::POST, &uri, Some(&host), Some(json!({ "user_ids": [bob_id] })))
        .await;
    assert_eq!(again["invited"].as_array().unwrap().len(), 0);
    assert_eq!(again["already_invited"], 1);

    let (_, invitations) = t.call(Method::GET, &uri, Some(&host), None).await;
    assert_eq!(invitations.as_array().unwrap().len(), 2);

    let (_, page) = t.call(Method::GET, "/api/notifications", Some(&bob), None).await;
    let notes = page["notifications"].as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["type"], "light_invitation");
    assert_eq!(notes[0]["message"], "host invited you to \"Bouldering\"");

    // Invitees may read the light; the invite endpoint stays with the author.
    let (status, detail) = t
        .call(Method::GET, &format!("/api/lights/{}", light_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["my_status"], "pending");
    assert_eq!(detail["counts"]["pending"], 2);

    let (status, _) = t
        .call(Method::POST, &uri, Some(&bob), Some(json!({ "user_ids": [cid] })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_accept_enforces_capacity_and_schedules_reminder() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;
    let (cat_id, cat) = t.register("cat").await;

    let mut body = light_body("Dinner", Duration::days(1), Some(1));
    body["invite"] = json!({ "user_ids": [bob_id, cat_id] });
    let light_id = t.create_light(&host, body).await;
    let respond = format!("/api/lights/{}/respond", light_id);

    let (status, inv) = t
        .call(Method::POST, &respond, Some(&bob), Some(json!({ "status": "accepted" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inv["status"], "accepted");

    let (status, _) = t
        .call(Method::POST, &respond, Some(&cat), Some(json!({ "status": "accepted" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .call(Method::POST, &respond, Some(&cat), Some(json!({ "status": "pending" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Host hears about the acceptance.
    let (_, page) = t.call(Method::GET, "/api/notifications", Some(&host), None).await;
    assert_eq!(page["notifications"][0]["type"], "light_attending");

    let (_, reminders) = t.call(Method::GET, "/api/reminders", Some(&bob), None).await;
    let reminders = reminders.as_array().unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0]["advance_hours"], 1);

    // Declining drops the reminder and frees the seat.
    let (status, _) = t
        .call(Method::POST, &respond, Some(&bob), Some(json!({ "status": "declined" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, reminders) = t.call(Method::GET, "/api/reminders", Some(&bob), None).await;
    assert!(reminders.as_array().unwrap().is_empty());

    let (status, _) = t
        .call(Method::POST, &respond, Some(&cat), Some(json!({ "status": "accepted" })))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_active_and_past_views() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;

    let mut upcoming = light_body("Upcoming", Duration::days(1), None);
    upcoming["invite"] = json!({ "user_ids": [bob_id] });
    let upcoming_id = t.create_light(&host, upcoming).await;

    let mut finished = light_body("Finished", -Duration::days(1), None);
    finished["invite"] = json!({ "user_ids": [bob_id] });
    let finished_id = t.create_light(&host, finished).await;

    let (_, active) = t.call(Method::GET, "/api/lights/active", Some(&bob), None).await;
    let active: Vec<&str> = active
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["light"]["id"].as_str().unwrap())
        .collect();
    assert_eq!(active, vec![upcoming_id.as_str()]);

    let (_, past) = t.call(Method::GET, "/api/lights/past", Some(&bob), None).await;
    let past: Vec<&str> = past
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["light"]["id"].as_str().unwrap())
        .collect();
    assert_eq!(past, vec![finished_id.as_str()]);

    // The host sees their own upcoming light as accepted.
    let (_, hosted) = t.call(Method::GET, "/api/lights/active", Some(&host), None).await;
    assert_eq!(hosted[0]["is_owner"], true);
    assert_eq!(hosted[0]["status"], "accepted");

    // Accepting an ended light is refused.
    let (status, _) = t
        .call(
            Method::POST,
            &format!("/api/lights/{}/respond", finished_id),
            Some(&bob),
            Some(json!({ "status": "accepted" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_messages_fan_out_and_respect_preferences() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;
    let (cat_id, cat) = t.register("cat").await;

    let mut body = light_body("Movie night", Duration::days(3), None);
    body["invite"] = json!({ "user_ids": [bob_id, cat_id] });
    let light_id = t.create_light(&host, body).await;
    for token in [&bob, &cat] {
        t.call(
            Method::POST,
            &format!("/api/lights/{}/respond", light_id),
            Some(token.as_str()),
            Some(json!({ "status": "accepted" })),
        )
        .await;
    }

    // Cat opts out of attendee message notices.
    let (status, prefs) = t
        .call(
            Method::PUT,
            "/api/preferences",
            Some(&cat),
            Some(json!({ "light_message_attending": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prefs["light_message_attending"], false);
    assert_eq!(prefs["light_invitation"], true);

    let before_host = t.unread(&host).await;
    let before_cat = t.unread(&cat).await;

    let messages = format!("/api/lights/{}/messages", light_id);
    let (status, msg) = t
        .call(Method::POST, &messages, Some(&bob), Some(json!({ "message": "  popcorn?  " })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(msg["message"], "popcorn?");
    assert_eq!(msg["user"]["username"], "bob");

    assert_eq!(t.unread(&host).await, before_host + 1);
    assert_eq!(t.unread(&cat).await, before_cat);

    let (status, _) = t
        .call(Method::POST, &messages, Some(&bob), Some(json!({ "message": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Only the poster may edit; the host may delete.
    let msg_uri = format!("{}/{}", messages, msg["id"].as_str().unwrap());
    let (status, _) = t
        .call(Method::PATCH, &msg_uri, Some(&cat), Some(json!({ "message": "mine now" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.call(Method::DELETE, &msg_uri, Some(&host), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t
        .call(
            Method::PUT,
            "/api/preferences",
            Some(&cat),
            Some(json!({ "light_reminder_advance_hours": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_notifies_invitees_who_had_not_declined() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;
    let (cat_id, cat) = t.register("cat").await;

    let mut body = light_body("Hike", Duration::days(1), None);
    body["invite"] = json!({ "user_ids": [bob_id, cat_id] });
    let light_id = t.create_light(&host, body).await;
    t.call(
        Method::POST,
        &format!("/api/lights/{}/respond", light_id),
        Some(&cat),
        Some(json!({ "status": "declined" })),
    )
    .await;

    let (status, _) = t
        .call(Method::DELETE, &format!("/api/lights/{}", light_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .call(Method::DELETE, &format!("/api/lights/{}", light_id), Some(&host), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, bob_page) = t.call(Method::GET, "/api/notifications", Some(&bob), None).await;
    assert_eq!(bob_page["notifications"][0]["type"], "light_cancelled");
    let (_, cat_page) = t.call(Method::GET, "/api/notifications", Some(&cat), None).await;
    assert!(
        cat_page["notifications"]
            .as_array()
            .unwrap()
            .iter()
            .all(|n| n["type"] != "light_cancelled")
    );

    let (status, _) = t
        .call(Method::GET, &format!("/api/lights/{}", light_id), Some(&host), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cron_sweep_sends_lead_time_reminder_once() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;

    // Starts a minute past the one-hour mark, inside the default scan window.
    let mut body = light_body("Standup", Duration::hours(1) + Duration::minutes(1), None);
    body["invite"] = json!({ "user_ids": [bob_id] });
    let light_id = t.create_light(&host, body).await;
    t.call(
        Method::POST,
        &format!("/api/lights/{}/respond", light_id),
        Some(&bob),
        Some(json!({ "status": "accepted" })),
    )
    .await;

    let (status, first) = t.call(Method::POST, "/api/cron/reminders", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["message"], "Reminders processed successfully");
    assert_eq!(first["report"]["sent"], 1);

    let (_, second) = t.call(Method::GET, "/api/cron/reminders", None, None).await;
    assert_eq!(second["message"], "Manual reminder processing completed");
    assert_eq!(second["report"]["sent"], 0);

    let (_, page) = t.call(Method::GET, "/api/notifications", Some(&bob), None).await;
    let reminders: Vec<&Value> = page["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["type"] == "light_reminder")
        .collect();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0]["message"], "\"Standup\" starts in 1 hour");

    let (_, logs) = t
        .call(Method::GET, &format!("/api/admin/reminder-logs?user_id={}", bob_id), None, None)
        .await;
    assert_eq!(logs["count"], 1);
    assert_eq!(logs["logs"][0]["reminder_type"], "1h");

    let (_, diag) = t.call(Method::GET, "/api/diagnostics/events", None, None).await;
    assert_eq!(diag["events_found"], 1);
    assert_eq!(diag["events"][0]["accepted_attendees"], 1);
}

#[tokio::test]
async fn test_service_routes_require_token_when_configured() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut inner = AppStateInner::new(db, "test-secret");
    inner.service_token = Some("cron-token".into());
    let state: AppState = Arc::new(inner);
    let t = TestApp {
        app: router(state.clone()),
        state,
    };

    let (status, _) = t.call(Method::POST, "/api/cron/reminders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t
        .call(Method::POST, "/api/cron/reminders", Some("wrong"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = t
        .call(Method::POST, "/api/cron/reminders", Some("cron-token"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["sent"], 0);
    assert!(t.state.service_token.is_some());
}

#[tokio::test]
async fn test_friends_and_lists_are_private() {
    let t = TestApp::new();
    let (ada_id, ada) = t.register("ada").await;
    let (bob_id, bob) = t.register("bob").await;

    let (status, _) = t
        .call(Method::POST, "/api/friends", Some(&ada), Some(json!({ "friend_id": ada_id })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = t
        .call(Method::POST, "/api/friends", Some(&ada), Some(json!({ "friend_id": bob_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = t
        .call(Method::POST, "/api/friends", Some(&ada), Some(json!({ "friend_id": bob_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, users) = t.call(Method::GET, "/api/users", Some(&ada), None).await;
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["is_friend"], true);

    let (_, list) = t
        .call(Method::POST, "/api/lists", Some(&ada), Some(json!({ "name": "Crew" })))
        .await;
    let list_uri = format!("/api/lists/{}", list["id"].as_str().unwrap());

    let (status, _) = t.call(Method::GET, &list_uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, detail) = t
        .call(
            Method::POST,
            &format!("{}/members", list_uri),
            Some(&ada),
            Some(json!({ "user_id": bob_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(detail["members"][0]["username"], "bob");

    let (_, lists) = t.call(Method::GET, "/api/lists", Some(&ada), None).await;
    assert_eq!(lists[0]["member_count"], 1);

    let (status, _) = t
        .call(Method::DELETE, &format!("/api/friends/{}", bob_id), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t
        .call(Method::DELETE, &format!("/api/friends/{}", bob_id), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_registration_of_one_name_conflicts() {
    let t = TestApp::new();
    let body = || Some(json!({ "username": "racer", "password": "correct-horse" }));

    let (a, b) = tokio::join!(
        t.call(Method::POST, "/api/auth/register", None, body()),
        t.call(Method::POST, "/api/auth/register", None, body()),
    );
    let mut statuses = vec![a.0.as_u16(), b.0.as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![201, 409]);
}

#[tokio::test]
async fn test_change_password() {
    let t = TestApp::new();
    let (_, token) = t.register("ada").await;
    let uri = "/api/me/password";

    let (status, _) = t
        .call(
            Method::POST,
            uri,
            Some(&token),
            Some(json!({ "current_password": "correct-horse", "new_password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .call(
            Method::POST,
            uri,
            Some(&token),
            Some(json!({ "current_password": "not-my-password", "new_password": "battery-staple" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .call(
            Method::POST,
            uri,
            None,
            Some(json!({ "current_password": "correct-horse", "new_password": "battery-staple" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .call(
            Method::POST,
            uri,
            Some(&token),
            Some(json!({ "current_password": "correct-horse", "new_password": "battery-staple" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let login = |password: &'static str| {
        t.call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "ada", "password": password })),
        )
    };
    assert_eq!(login("correct-horse").await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(login("battery-staple").await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_moving_a_light_moves_its_reminders() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;

    let mut body = light_body("Dinner", Duration::days(1), None);
    body["invite"] = json!({ "user_ids": [bob_id] });
    let light_id = t.create_light(&host, body).await;
    let (status, _) = t
        .call(
            Method::POST,
            &format!("/api/lights/{}/respond", light_id),
            Some(&bob),
            Some(json!({ "status": "accepted" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let reminder_time = |r: &Value| r["reminder_time"].as_str().unwrap().parse::<DateTime<Utc>>().unwrap();
    let (_, before) = t.call(Method::GET, "/api/reminders", Some(&bob), None).await;
    let before = reminder_time(&before[0]);

    let new_start = Utc::now() + Duration::days(3);
    let (status, light) = t
        .call(
            Method::PATCH,
            &format!("/api/lights/{}", light_id),
            Some(&host),
            Some(json!({ "start_time": new_start, "end_time": new_start + Duration::hours(2) })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", light);

    let (_, after) = t.call(Method::GET, "/api/reminders", Some(&bob), None).await;
    let after = after.as_array().unwrap();
    assert_eq!(after.len(), 1);
    let moved = reminder_time(&after[0]);
    assert!(moved > before + Duration::days(1));
    let start = after[0]["event_start_time"].as_str().unwrap().parse::<DateTime<Utc>>().unwrap();
    assert_eq!(start - moved, Duration::hours(1));

    // Invitees cannot edit.
    let (status, _) = t
        .call(
            Method::PATCH,
            &format!("/api/lights/{}", light_id),
            Some(&bob),
            Some(json!({ "title": "Mine now" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_author_sets_and_removes_invitations() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;

    let mut body = light_body("Dinner", Duration::days(1), None);
    body["invite"] = json!({ "user_ids": [bob_id] });
    let light_id = t.create_light(&host, body).await;

    let (_, invitations) = t
        .call(Method::GET, &format!("/api/lights/{}/invitations", light_id), Some(&host), None)
        .await;
    let invitation_id = invitations[0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/lights/{}/invitations/{}", light_id, invitation_id);

    // Only the author may override an RSVP.
    let (status, _) = t
        .call(Method::PATCH, &uri, Some(&bob), Some(json!({ "status": "accepted" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, inv) = t
        .call(Method::PATCH, &uri, Some(&host), Some(json!({ "status": "accepted" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inv["status"], "accepted");
    let (_, reminders) = t.call(Method::GET, "/api/reminders", Some(&bob), None).await;
    assert_eq!(reminders.as_array().unwrap().len(), 1);

    let bob_uuid: uuid::Uuid = bob_id.parse().unwrap();
    let (_, mut rx) = t.state.dispatcher.register_user_channel(bob_uuid).await;

    let (status, _) = t.call(Method::DELETE, &uri, Some(&host), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    match rx.try_recv() {
        Ok(RealtimeEvent::InvitationUpdate { user_id, status, .. }) => {
            assert_eq!(user_id, bob_uuid);
            assert_eq!(status, None);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    let (_, reminders) = t.call(Method::GET, "/api/reminders", Some(&bob), None).await;
    assert!(reminders.as_array().unwrap().is_empty());
    let (status, _) = t
        .call(Method::GET, &format!("/api/lights/{}", light_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_repeated_accept_after_light_ended_is_silent() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;
    let (cat_id, cat) = t.register("cat").await;

    let mut body = light_body("Brunch", Duration::hours(3), None);
    body["invite"] = json!({ "user_ids": [bob_id, cat_id] });
    let light_id = t.create_light(&host, body).await;
    let respond = format!("/api/lights/{}/respond", light_id);
    let accept = || Some(json!({ "status": "accepted" }));

    let (status, _) = t.call(Method::POST, &respond, Some(&bob), accept()).await;
    assert_eq!(status, StatusCode::OK);

    let start = Utc::now() - Duration::hours(5);
    let (status, _) = t
        .call(
            Method::PATCH,
            &format!("/api/lights/{}", light_id),
            Some(&host),
            Some(json!({ "start_time": start, "end_time": start + Duration::hours(2) })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, mut rx) = t.state.dispatcher.register_user_channel(bob_id.parse().unwrap()).await;
    let mut followers = t.state.dispatcher.subscribe();

    let (status, inv) = t.call(Method::POST, &respond, Some(&bob), accept()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inv["status"], "accepted");
    assert!(rx.try_recv().is_err());
    assert!(followers.try_recv().is_err());

    // A real change on an ended light is still refused.
    let (status, _) = t.call(Method::POST, &respond, Some(&cat), accept()).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_read_all_clears_unread_count() {
    let t = TestApp::new();
    let (_, host) = t.register("host").await;
    let (bob_id, bob) = t.register("bob").await;

    for title in ["One", "Two"] {
        let mut body = light_body(title, Duration::days(1), None);
        body["invite"] = json!({ "user_ids": [bob_id] });
        t.create_light(&host, body).await;
    }
    assert_eq!(t.unread(&bob).await, 2);

    let (status, res) = t.call(Method::POST, "/api/notifications/read-all", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["updated"], 2);
    assert_eq!(t.unread(&bob).await, 0);

    let (_, again) = t.call(Method::POST, "/api/notifications/read-all", Some(&bob), None).await;
    assert_eq!(again["updated"], 0);
}

#[tokio::test]
async fn test_operator_system_notice() {
    let t = TestApp::new();
    let (ada_id, ada) = t.register("ada").await;
    let (bob_id, bob) = t.register("bob").await;

    let (status, _) = t
        .call(Method::PUT, "/api/preferences", Some(&bob), Some(json!({ "system": false })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, res) = t
        .call(
            Method::POST,
            "/api/admin/notifications",
            None,
            Some(json!({
                "user_ids": [ada_id, bob_id],
                "title": "Maintenance",
                "message": "Back in an hour",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["sent"], 1);
    assert_eq!(res["suppressed"], 1);

    let (_, page) = t.call(Method::GET, "/api/notifications", Some(&ada), None).await;
    assert_eq!(page["notifications"][0]["type"], "system");
    assert_eq!(page["notifications"][0]["title"], "Maintenance");
    assert_eq!(t.unread(&bob).await, 0);

    let (status, _) = t
        .call(
            Method::POST,
            "/api/admin/notifications",
            None,
            Some(json!({ "user_ids": [ada_id], "title": " ", "message": "x" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
