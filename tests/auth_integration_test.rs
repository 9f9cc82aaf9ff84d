mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, data, TestApp};
use serde_json::json;

#[tokio::test]
async fn registration_returns_a_working_token() {
    let app = TestApp::new().await;
    let (token, user_id) = app
        .register_customer("Nisha Verma", "Nisha@Example.com", "9222222222")
        .await;

    let response = app.request(Method::GET, "/auth/me", None, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let me = data(response).await;
    assert_eq!(me["id"], user_id.to_string());
    assert_eq!(me["email"], "nisha@example.com");
    assert_eq!(me["role"], "customer");
    assert!(me.get("password_hash").is_none());

    let profile = app.customer_profile_id("nisha@example.com").await;
    let response = app
        .as_staff(Method::GET, &format!("/api/v1/customers/{}", profile), None)
        .await;
    assert_eq!(data(response).await["user_id"], user_id.to_string());
}

#[tokio::test]
async fn login_checks_the_password() {
    let app = TestApp::new().await;
    app.register_customer("Nisha Verma", "nisha@example.com", "9222222222")
        .await;

    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "NISHA@example.com", "password": "customer-pass-1" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let login = data(response).await;
    assert_eq!(login["token_type"], "Bearer");
    assert!(login["expires_in"].as_i64().unwrap_or_default() > 0);

    for (email, password) in [
        ("nisha@example.com", "wrong-password"),
        ("nobody@example.com", "customer-pass-1"),
    ] {
        let response = app
            .request(
                Method::POST,
                "/auth/login",
                Some(json!({ "email": email, "password": password })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn staff_accounts_can_log_in() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "staff@stitch.test", "password": "staff-password-1" })),
            None,
        )
        .await;
    let login = data(response).await;
    assert_eq!(login["user"]["role"], "staff");

    let token = login["access_token"].as_str().unwrap();
    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some(token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = TestApp::new().await;
    app.register_customer("Nisha Verma", "nisha@example.com", "9222222222")
        .await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "name": "Someone Else",
                "email": "nisha@example.com",
                "password": "another-pass-1",
                "phone": "9111111111"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn registration_validates_input() {
    let app = TestApp::new().await;
    for body in [
        json!({ "name": "A", "email": "a@example.com", "password": "short", "phone": "9111111111" }),
        json!({ "name": "A", "email": "not-an-email", "password": "long-enough-1", "phone": "9111111111" }),
        json!({ "name": "", "email": "a@example.com", "password": "long-enough-1", "phone": "9111111111" }),
    ] {
        let response = app
            .request(Method::POST, "/auth/register", Some(body), None)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn tokens_are_validated() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/auth/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/auth/me", None, Some("not.a.jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let claims = app
        .auth()
        .validate_token(app.staff_token())
        .expect("staff token validates");
    assert_eq!(claims.sub, app.staff_id.to_string());
}

#[tokio::test]
async fn customers_cannot_reach_staff_routes() {
    let app = TestApp::new().await;
    let (token, _) = app
        .register_customer("Nisha Verma", "nisha@example.com", "9222222222")
        .await;

    for (method, uri) in [
        (Method::GET, "/api/v1/orders"),
        (Method::GET, "/api/v1/customers"),
        (Method::POST, "/api/v1/payments"),
    ] {
        let response = app
            .request(method, uri, Some(json!({})), Some(&token))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
    }

    let response = app
        .request(Method::GET, "/api/v1/me/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
