mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, data, TestApp};
use serde_json::json;

async fn seeded_order(app: &TestApp) -> serde_json::Value {
    app.create_order(json!({
        "customer_name": "Farah Khan",
        "phone_number": "9555555555",
        "email": "farah@example.com",
        "address": "12 Lake Road",
        "notes": "internal: fabric from stock shelf B",
        "items": [{ "garment_type": "dress", "price": "3200", "description": "silk A-line" }],
        "advance_amount": "1000"
    }))
    .await
}

#[tokio::test]
async fn tracking_is_public_and_case_insensitive() {
    let app = TestApp::new().await;
    let order = seeded_order(&app).await;
    let barcode = order["barcode"].as_str().unwrap();

    for candidate in [barcode.to_string(), barcode.to_ascii_lowercase()] {
        let response = app
            .request(Method::GET, &format!("/track/{}", candidate), None, None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let view = data(response).await;
        assert_eq!(view["barcode"], barcode);
        assert_eq!(view["status"], "pending");
        assert_eq!(view["status_label"], "Pending");
        assert_eq!(view["payment_status"], "partial");
        assert_eq!(view["items"][0]["garment_type"], "dress");
    }
}

#[tokio::test]
async fn tracking_view_hides_contact_details_and_staff() {
    let app = TestApp::new().await;
    let order = seeded_order(&app).await;
    let barcode = order["barcode"].as_str().unwrap();

    app.as_staff(
        Method::PATCH,
        &format!("/api/v1/orders/{}/status", order["id"].as_str().unwrap()),
        Some(json!({ "status": "measurement-taken", "note": "staff only note" })),
    )
    .await;

    let response = app
        .request(Method::GET, &format!("/track/{}", barcode), None, None)
        .await;
    let view = data(response).await;
    let raw = view.to_string();

    for secret in [
        "9555555555",
        "farah@example.com",
        "12 Lake Road",
        "fabric from stock shelf B",
        "staff only note",
        "Ravi Staff",
    ] {
        assert!(!raw.contains(secret), "tracking view leaked {}", secret);
    }
    assert!(view.get("phone_number").is_none());
    assert!(view.get("email").is_none());

    let history = view["status_history"].as_array().expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["label"], "Measurement Taken");
}

#[tokio::test]
async fn unknown_barcode_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/track/TTDOESNOTEXIST", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn tracking_barcode_image_is_served() {
    let app = TestApp::new().await;
    let order = seeded_order(&app).await;
    let barcode = order["barcode"].as_str().unwrap().to_ascii_lowercase();

    let response = app
        .request(
            Method::GET,
            &format!("/track/{}/barcode.png", barcode),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("image/png")
    );

    let response = app
        .request(Method::GET, "/track/TTMISSING/barcode.png", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health/live", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}
