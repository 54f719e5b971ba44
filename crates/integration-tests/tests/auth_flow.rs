//! Sign-in, guard and sign-out through the full router.

use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::http::{Request, StatusCode};

use table1837_core::Role;
use table1837_integration_tests::{PASSWORD, TestApp, body_text, location};

#[tokio::test]
async fn test_login_page_renders_form() {
    let app = TestApp::new();

    let response = app.get("/", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.contains("TABLE 1837"));
    assert!(body.contains("Glen Rock Mill Inn"));
    assert!(body.contains("ACCESS INVENTORY SYSTEM"));
}

#[tokio::test]
async fn test_correct_credentials_reach_dashboard() {
    let app = TestApp::new();
    app.add_user("host@table1837.test", Role::Staff);

    let (response, cookie) = app.login("host@table1837.test", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/dashboard"));

    let response = app.get("/dashboard", cookie.as_deref()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Daily Dashboard"));
    assert!(body.contains("host@table1837.test (staff)"));
}

#[tokio::test]
async fn test_wrong_credentials_stay_on_login() {
    let app = TestApp::new();
    app.add_user("host@table1837.test", Role::Staff);

    let (response, cookie) = app.login("host@table1837.test", "wrong password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(location(&response).is_none());

    let body = body_text(response).await;
    assert!(body.contains("Invalid login credentials"));
    assert!(body.contains("value=\"host@table1837.test\""));

    // No session was created
    let response = app.get("/dashboard", cookie.as_deref()).await;
    assert_eq!(location(&response).as_deref(), Some("/"));
}

#[tokio::test]
async fn test_unreachable_provider_shows_generic_error() {
    let app = TestApp::new();
    app.add_user("host@table1837.test", Role::Staff);
    app.identity.unreachable.store(true, Ordering::SeqCst);

    let (response, cookie) = app.login("host@table1837.test", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(cookie.is_none());
    assert!(body_text(response).await.contains("An unexpected error occurred"));

    // The context behind the unsaved session is not kept around
    assert!(app.state.clients().is_empty());
}

#[tokio::test]
async fn test_malformed_email_is_rejected_locally() {
    let app = TestApp::new();

    let (response, _cookie) = app.login("not-an-email", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.identity.sign_in_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_guard_redirects_without_session() {
    let app = TestApp::new();

    for path in ["/dashboard", "/cocktails", "/staff", "/admin", "/wine", "/inventory"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&response).as_deref(), Some("/"), "{path}");
        assert!(body_text(response).await.is_empty(), "{path} leaked content");
    }
}

#[tokio::test]
async fn test_guard_redirects_partial_requests_by_header() {
    let app = TestApp::new();

    let request = Request::builder()
        .uri("/dashboard")
        .header("hx-request", "true")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers().get("hx-redirect").unwrap(), "/");
}

#[tokio::test]
async fn test_guard_serves_loading_page_while_session_restores() {
    let app = TestApp::new();
    app.add_user("host@table1837.test", Role::Staff);
    let cookie = app.signed_in("host@table1837.test").await;

    // The server forgot the client, the cookie session still holds its tokens
    app.state.clients().clear().await;
    app.identity.hold_lookups.store(true, Ordering::SeqCst);

    let response = app.get("/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("http-equiv=\"refresh\""));
    assert!(body.contains("Loading..."));
    assert!(!body.contains("Daily Dashboard"));
    assert!(!body.contains("host@table1837.test"));

    app.identity.release_lookups();

    let body = body_text(app.get("/dashboard", Some(&cookie)).await).await;
    assert!(body.contains("Daily Dashboard"));
    assert!(body.contains("host@table1837.test (staff)"));
}

#[tokio::test]
async fn test_signed_in_login_page_redirects_to_dashboard() {
    let app = TestApp::new();
    app.add_user("host@table1837.test", Role::Viewer);
    let cookie = app.signed_in("host@table1837.test").await;

    let response = app.get("/", Some(&cookie)).await;
    assert_eq!(location(&response).as_deref(), Some("/dashboard"));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = TestApp::new();
    app.add_user("host@table1837.test", Role::Staff);
    let cookie = app.signed_in("host@table1837.test").await;

    let response = app.post_form("/logout", &[], Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_deref(), Some("/"));
    assert_eq!(app.identity.sign_out_calls.load(Ordering::SeqCst), 1);

    let response = app.get("/dashboard", Some(&cookie)).await;
    assert_eq!(location(&response).as_deref(), Some("/"));
}

#[tokio::test]
async fn test_logout_succeeds_when_provider_fails() {
    let app = TestApp::new();
    app.add_user("host@table1837.test", Role::Staff);
    let cookie = app.signed_in("host@table1837.test").await;
    app.identity.sign_out_fails.store(true, Ordering::SeqCst);

    let response = app.post_form("/logout", &[], Some(&cookie)).await;
    assert_eq!(location(&response).as_deref(), Some("/"));

    let response = app.get("/dashboard", Some(&cookie)).await;
    assert_eq!(location(&response).as_deref(), Some("/"));
}

#[tokio::test]
async fn test_missing_role_row_signs_in_as_viewer() {
    let app = TestApp::new();
    app.identity.add_user("new@table1837.test", PASSWORD);

    let cookie = app.signed_in("new@table1837.test").await;
    let body = body_text(app.get("/dashboard", Some(&cookie)).await).await;
    assert!(body.contains("new@table1837.test (viewer)"));
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");

    assert_eq!(app.get("/health/ready", None).await.status(), StatusCode::OK);

    app.identity.unreachable.store(true, Ordering::SeqCst);
    assert_eq!(
        app.get("/health/ready", None).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_responses_carry_security_headers() {
    let app = TestApp::new();

    let response = app.get("/", None).await;
    let headers = response.headers();
    assert!(headers.contains_key("content-security-policy"));
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.contains_key("x-request-id"));
}
