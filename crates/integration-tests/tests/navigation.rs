//! Role-based navigation and the admin-only section.

use axum::http::StatusCode;

use table1837_core::Role;
use table1837_integration_tests::{TestApp, body_text};

#[tokio::test]
async fn test_admin_sees_every_tab_in_order() {
    let app = TestApp::new();
    app.add_user("owner@table1837.test", Role::Admin);
    let cookie = app.signed_in("owner@table1837.test").await;

    let body = body_text(app.get("/dashboard", Some(&cookie)).await).await;

    let positions: Vec<usize> = [
        "href=\"/dashboard\"",
        "href=\"/cocktails\"",
        "href=\"/staff\"",
        "href=\"/admin\"",
        "href=\"/wine\"",
        "href=\"/inventory\"",
    ]
    .iter()
    .map(|href| body.find(href).unwrap_or_else(|| panic!("missing {href}")))
    .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn test_staff_never_sees_admin_tab() {
    let app = TestApp::new();
    app.add_user("bar@table1837.test", Role::Staff);
    let cookie = app.signed_in("bar@table1837.test").await;

    for path in ["/dashboard", "/cocktails", "/staff", "/wine", "/inventory"] {
        let response = app.get(path, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        let body = body_text(response).await;
        assert!(!body.contains("href=\"/admin\""), "{path} shows the admin tab");
        assert!(body.contains("href=\"/inventory\""), "{path}");
    }
}

#[tokio::test]
async fn test_admin_page_refuses_other_roles() {
    let app = TestApp::new();
    app.add_user("viewer@table1837.test", Role::Viewer);
    let cookie = app.signed_in("viewer@table1837.test").await;

    let response = app.get("/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_page_renders_for_admin() {
    let app = TestApp::new();
    app.add_user("owner@table1837.test", Role::Admin);
    let cookie = app.signed_in("owner@table1837.test").await;

    let response = app.get("/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("class=\"nav-tab active\">Admin"));
}

#[tokio::test]
async fn test_active_tab_follows_path() {
    let app = TestApp::new();
    app.add_user("bar@table1837.test", Role::Staff);
    let cookie = app.signed_in("bar@table1837.test").await;

    let body = body_text(app.get("/wine", Some(&cookie)).await).await;
    assert!(body.contains("href=\"/wine\" class=\"nav-tab active\""));
    assert!(body.contains("href=\"/dashboard\" class=\"nav-tab\""));
}
