//! Integration tests for the link shortener API
//!
//! These tests drive the whole stack:
//! - HTTP routing and middleware
//! - Request/response handling
//! - redb storage
//! - Error envelopes

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use byteurl::config::{AppConfig, AuthConfig};
use byteurl::database::{init_db, RedbStore};
use byteurl::route::create_app;
use byteurl::state::AppState;

/// Helper function to create a test application with a temporary database
fn setup_test_app() -> (Router, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db = init_db(temp_db.path().to_str().unwrap()).expect("Failed to initialize test database");

    let config = AppConfig {
        cors_origin: "http://app.test".to_string(),
        auth: AuthConfig {
            jwt_secret: "integration-test-secret".to_string(),
            ..AuthConfig::default()
        },
        ..AppConfig::default()
    };
    let state = AppState::new(config, Arc::new(RedbStore::new(db)));

    (create_app(state), temp_db)
}

/// Helper function to parse response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

/// A signed-in user: id and `Authorization` header value
struct Session {
    id: u64,
    bearer: String,
}

async fn signup(app: &Router, name: &str, email: &str) -> Session {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/signup")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "name": name, "email": email, "password": "longenough1" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response.into_body()).await;
    Session {
        id: body["user"]["id"].as_u64().unwrap(),
        bearer: format!("Bearer {}", body["user"]["token"].as_str().unwrap()),
    }
}

fn authed(session: &Session, method: &str, uri: &str, payload: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", &session.bearer);

    match payload {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn create_link(app: &Router, session: &Session, title: &str, url: &str) -> Value {
    let response = app
        .clone()
        .oneshot(authed(
            session,
            "POST",
            &format!("/api/admin/users/{}/links", session.id),
            Some(json!({ "title": title, "originalUrl": url })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response.into_body()).await
}

async fn get_link(app: &Router, session: &Session, link_id: u64) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(authed(
            session,
            "GET",
            &format!("/api/admin/users/{}/links/{}", session.id, link_id),
            None,
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, response_json(response.into_body()).await)
}

async fn follow(app: &Router, code: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/redirect/{code}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, response_json(response.into_body()).await)
}

#[tokio::test]
async fn test_home_banner() {
    let (app, _temp_db) = setup_test_app();

    for uri in ["/api", "/api/"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response.into_body()).await;
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
    }
}

#[tokio::test]
async fn test_end_to_end_link_lifecycle() {
    let (app, _temp_db) = setup_test_app();
    let ann = signup(&app, "Ann", "ann@example.com").await;

    let link = create_link(&app, &ann, "Example", "https://example.com/page").await;
    assert_eq!(link["id"], 1);
    assert_eq!(link["userId"], ann.id);
    assert_eq!(link["clicks"], 0);
    let code = link["shortenUrl"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 10);

    // Following the short code returns the destination and counts the click
    let (status, body) = follow(&app, &code).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["originalUrl"], "https://example.com/page");

    let (_, stored) = get_link(&app, &ann, 1).await;
    assert_eq!(stored["clicks"], 1);

    // Visitor details land in the history
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/redirect/{code}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "device": "Desktop",
                        "browser": "Firefox",
                        "ipAddress": "203.0.113.7",
                        "location": "Berlin"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response.into_body()).await["message"], "success");

    let response = app
        .clone()
        .oneshot(authed(
            &ann,
            "GET",
            &format!("/api/admin/users/{}/history", ann.id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = response_json(response.into_body()).await;
    assert_eq!(history[0]["shortenUrl"], code.as_str());
    assert_eq!(history[0]["redirectHistory"][0]["id"], 1);
    assert_eq!(history[0]["redirectHistory"][0]["ipAddress"], "203.0.113.7");

    // Editing keeps the code and the click count
    let response = app
        .clone()
        .oneshot(authed(
            &ann,
            "PATCH",
            &format!("/api/admin/users/{}/links/1", ann.id),
            Some(json!({ "title": "Renamed", "originalUrl": "https://example.org" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = response_json(response.into_body()).await;
    assert_eq!(updated["title"], "Renamed");
    assert_eq!(updated["shortenUrl"], code.as_str());
    assert_eq!(updated["clicks"], 1);

    let response = app
        .clone()
        .oneshot(authed(
            &ann,
            "DELETE",
            &format!("/api/admin/users/{}/links/1", ann.id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["deleted_id"], 1);

    let (status, _) = get_link(&app, &ann, 1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = follow(&app, &code).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_link_ids_are_per_user_and_scoped() {
    let (app, _temp_db) = setup_test_app();
    let ann = signup(&app, "Ann", "ann@example.com").await;
    let bob = signup(&app, "Bob", "bob@example.com").await;

    let first = create_link(&app, &ann, "Ann one", "https://example.com/1").await;
    let second = create_link(&app, &ann, "Ann two", "https://example.com/2").await;
    let bobs = create_link(&app, &bob, "Bob one", "https://example.net").await;

    assert_eq!(first["id"], 1);
    assert_eq!(second["id"], 2);
    assert_eq!(bobs["id"], 1);
    assert_ne!(first["shortenUrl"], bobs["shortenUrl"]);

    // Bob's view of link 2 is empty: Ann's link 2 is not his
    let (status, _) = get_link(&app, &bob, 2).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get_link(&app, &bob, 1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Bob one");

    let response = app
        .clone()
        .oneshot(authed(
            &ann,
            "GET",
            &format!("/api/admin/users/{}/links", ann.id),
            None,
        ))
        .await
        .unwrap();
    let links = response_json(response.into_body()).await;
    assert_eq!(links.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_put_also_creates_links() {
    let (app, _temp_db) = setup_test_app();
    let ann = signup(&app, "Ann", "ann@example.com").await;

    let response = app
        .oneshot(authed(
            &ann,
            "PUT",
            &format!("/api/admin/users/{}/links", ann.id),
            Some(json!({ "title": "Via put", "originalUrl": "https://example.com" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_link_input() {
    let (app, _temp_db) = setup_test_app();
    let ann = signup(&app, "Ann", "ann@example.com").await;
    let uri = format!("/api/admin/users/{}/links", ann.id);

    for (payload, message) in [
        (
            json!({ "title": "ab", "originalUrl": "https://example.com" }),
            Some("title must be at least 3 characters"),
        ),
        (
            json!({ "title": "Example", "originalUrl": "" }),
            Some("originalUrl cannot be empty"),
        ),
        (json!({ "title": "Example", "originalUrl": "not a url" }), None),
        (json!({ "title": "Example" }), None),
    ] {
        let response = app
            .clone()
            .oneshot(authed(&ann, "POST", &uri, Some(payload)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response_json(response.into_body()).await;
        assert_eq!(body["code"], "validation_error");
        if let Some(message) = message {
            assert_eq!(body["error"], message);
        }
    }

    let response = app
        .oneshot(authed(
            &ann,
            "GET",
            &format!("/api/admin/users/{}/links/abc", ann.id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_undecodable_short_code_gets_json_error() {
    let (app, _temp_db) = setup_test_app();

    for method in ["GET", "POST"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/api/redirect/%FF%FE")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response_json(response.into_body()).await;
        assert_eq!(body["code"], "validation_error");
        assert_eq!(body["error"], "invalid path parameter");
    }
}

#[tokio::test]
async fn test_sequential_redirects_count_every_click() {
    let (app, _temp_db) = setup_test_app();
    let ann = signup(&app, "Ann", "ann@example.com").await;
    let link = create_link(&app, &ann, "Example", "https://example.com").await;
    let code = link["shortenUrl"].as_str().unwrap();

    for _ in 0..5 {
        let (status, _) = follow(&app, code).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, stored) = get_link(&app, &ann, 1).await;
    assert_eq!(stored["clicks"], 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redirects_do_not_lose_clicks() {
    let (app, _temp_db) = setup_test_app();
    let ann = signup(&app, "Ann", "ann@example.com").await;
    let link = create_link(&app, &ann, "Example", "https://example.com").await;
    let code = link["shortenUrl"].as_str().unwrap().to_string();

    let requests = 40;
    let tasks: Vec<_> = (0..requests)
        .map(|_| {
            let app = app.clone();
            let code = code.clone();
            tokio::spawn(async move { follow(&app, &code).await.0 })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let (_, stored) = get_link(&app, &ann, 1).await;
    assert_eq!(stored["clicks"], requests);
}

#[tokio::test]
async fn test_cors_preflight_and_origin_header() {
    let (app, _temp_db) = setup_test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/admin/users/1/links")
                .header(header::ORIGIN, "http://app.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://app.test");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert!(headers[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .contains("PATCH"));
    assert!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .contains("Authorization"));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());

    let response = app
        .oneshot(Request::builder().uri("/api").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://app.test"
    );
}
