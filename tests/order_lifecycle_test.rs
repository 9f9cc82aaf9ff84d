mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, data, decimal, eventually, TestApp};
use chrono::Local;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;
use tailortrack::entities::order;
use uuid::Uuid;

fn multi_item_order() -> serde_json::Value {
    json!({
        "customerName": "Meera Iyer",
        "phoneNumber": "98765 43210",
        "email": "meera@example.com",
        "items": [
            { "clothType": "shirt", "quantity": 2, "price": "800", "measurements": { "chest": 38, "fit": "slim" } },
            { "garment_type": "pants", "price": "1200" }
        ],
        "discount": "200",
        "advancePayment": "500"
    })
}

#[tokio::test]
async fn create_order_computes_derived_fields_and_notifies() {
    let app = TestApp::new().await;
    let order = app.create_order(multi_item_order()).await;

    assert_eq!(decimal(&order["subtotal"]), dec!(2800));
    assert_eq!(decimal(&order["amount"]), dec!(2600));
    assert_eq!(decimal(&order["advance_amount"]), dec!(500));
    assert_eq!(decimal(&order["balance_amount"]), dec!(2100));
    assert_eq!(order["payment_status"], "partial");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(order["items"][1]["quantity"], 1);

    let barcode = order["barcode"].as_str().expect("barcode");
    assert!(barcode.starts_with("TT"), "barcode {}", barcode);
    assert_eq!(
        order["tracking_link"],
        format!("https://track.stitch.test/track/{}", barcode)
    );

    let history = order["status_history"].as_array().expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["status"], "pending");
    assert_eq!(history[0]["sequence"], 1);

    let text = eventually(|| async {
        app.sms
            .sent()
            .into_iter()
            .find(|t| t.body.contains(barcode))
    })
    .await;
    assert_eq!(text.to, "+919876543210");
    assert!(text.body.contains("Stitch Co"));
    assert!(text.body.contains(&format!("/track/{}", barcode)));

    // The confirmation flag is written once the provider acknowledges
    let id = order["id"].as_str().expect("id").to_string();
    eventually(|| async {
        let response = app
            .as_staff(Method::GET, &format!("/api/v1/orders/{}", id), None)
            .await;
        let body = data(response).await;
        (body["sms_sent"] == true).then_some(())
    })
    .await;
}

#[tokio::test]
async fn single_garment_order_uses_supplied_amount() {
    let app = TestApp::new().await;
    let order = app
        .create_order(json!({
            "customer_name": "Arjun",
            "phone_number": "9000000001",
            "garment_type": "kurta",
            "amount": "1500",
            "discount": "300",
            "advance_amount": "1500"
        }))
        .await;

    assert_eq!(decimal(&order["amount"]), dec!(1500));
    assert_eq!(decimal(&order["balance_amount"]), dec!(0));
    assert_eq!(order["payment_status"], "paid");
    assert_eq!(order["garment_type"], "kurta");
    assert!(order["items"].as_array().map(Vec::is_empty).unwrap_or(false));
}

#[tokio::test]
async fn order_without_garments_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .as_staff(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "customer_name": "Nobody", "phone_number": "9000000002" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .as_staff(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "customer_name": "Negative",
                "phone_number": "9000000003",
                "items": [{ "garment_type": "shirt", "price": "-10" }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_numbers_and_barcodes_are_unique() {
    let app = TestApp::new().await;
    let mut numbers = std::collections::HashSet::new();
    let mut barcodes = std::collections::HashSet::new();
    for i in 0..5 {
        let order = app
            .create_order(json!({
                "customer_name": format!("Customer {}", i),
                "phone_number": format!("900000010{}", i),
                "garment_type": "shirt",
                "amount": "500"
            }))
            .await;
        assert!(numbers.insert(order["order_number"].as_str().unwrap().to_string()));
        assert!(barcodes.insert(order["barcode"].as_str().unwrap().to_string()));
    }
}

#[tokio::test]
async fn order_numbers_keep_their_own_prefix_and_stop_at_the_daily_cap() {
    let app = TestApp::with_config(|cfg| cfg.barcode_prefix = "AB".to_string()).await;
    let today = Local::now().format("%Y%m%d").to_string();
    let new_order = || {
        json!({
            "customer_name": "Kiran Das",
            "phone_number": "9000000201",
            "garment_type": "shirt",
            "amount": "500"
        })
    };

    let first = app.create_order(new_order()).await;
    assert_eq!(first["order_number"], format!("TT-{}-0001", today));
    assert!(first["barcode"].as_str().unwrap().starts_with("AB"));

    let id: Uuid = first["id"].as_str().unwrap().parse().unwrap();
    let mut active: order::ActiveModel = order::Entity::find_by_id(id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap()
        .into();
    active.order_number = Set(format!("TT-{}-9999", today));
    active.update(&*app.state.db).await.unwrap();

    let response = app
        .as_staff(Method::POST, "/api/v1/orders", Some(new_order()))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("exhausted"));
}

#[tokio::test]
async fn status_changes_append_history_and_repeat_is_a_no_op() {
    let app = TestApp::new().await;
    let order = app.create_order(multi_item_order()).await;
    let id = order["id"].as_str().unwrap();
    let uri = format!("/api/v1/orders/{}/status", id);

    let response = app
        .as_staff(
            Method::PATCH,
            &uri,
            Some(json!({ "status": "stitching-in-progress", "note": "cutting finished" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = data(response).await;
    assert_eq!(updated["status"], "stitching-in-progress");

    let response = app
        .as_staff(Method::PATCH, &uri, Some(json!({ "status": "stitching-in-progress" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .as_staff(Method::GET, &format!("/api/v1/orders/{}/history", id), None)
        .await;
    let history = data(response).await;
    let history = history.as_array().expect("history array");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["status"], "stitching-in-progress");
    assert_eq!(history[1]["sequence"], 2);
    assert_eq!(history[1]["note"], "cutting finished");
    assert_eq!(history[1]["actor_id"], app.staff_id.to_string());
    assert_eq!(history[1]["actor_name"], "Ravi Staff");

    let response = app
        .as_staff(Method::PATCH, &uri, Some(json!({ "status": "sewing" })))
        .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn ready_status_sends_email_and_delivery_stamps_date() {
    let app = TestApp::new().await;
    let order = app.create_order(multi_item_order()).await;
    let id = order["id"].as_str().unwrap();
    let barcode = order["barcode"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/orders/{}/status", id);

    let response = app
        .as_staff(Method::PATCH, &uri, Some(json!({ "status": "ready-for-delivery" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let email = eventually(|| async {
        app.email
            .sent()
            .into_iter()
            .find(|e| e.subject.contains(&barcode))
    })
    .await;
    assert_eq!(email.to, "meera@example.com");
    assert!(email.subject.contains("ready for pickup"));

    let ready_text = eventually(|| async {
        app.sms
            .sent()
            .into_iter()
            .find(|t| t.body.contains("ready for pickup"))
    })
    .await;
    assert!(ready_text.body.contains(&barcode));

    let response = app
        .as_staff(Method::PATCH, &uri, Some(json!({ "status": "delivered" })))
        .await;
    let delivered = data(response).await;
    assert_eq!(delivered["status"], "delivered");
    assert!(delivered["delivery_date"].is_string());
    assert_eq!(delivered["status_history"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn editing_an_order_recomputes_totals() {
    let app = TestApp::new().await;
    let order = app.create_order(multi_item_order()).await;
    let id = order["id"].as_str().unwrap();

    let response = app
        .as_staff(
            Method::PUT,
            &format!("/api/v1/orders/{}", id),
            Some(json!({
                "items": [{ "garment_type": "suit", "quantity": 1, "price": "5000" }],
                "discount": "0",
                "notes": "client wants peak lapels"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = data(response).await;
    assert_eq!(decimal(&updated["amount"]), dec!(5000));
    assert_eq!(decimal(&updated["balance_amount"]), dec!(4500));
    assert_eq!(updated["payment_status"], "partial");
    assert_eq!(updated["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(updated["notes"], "client wants peak lapels");
    assert_eq!(updated["barcode"], order["barcode"]);
}

#[tokio::test]
async fn list_filters_by_status_and_search() {
    let app = TestApp::new().await;
    let first = app.create_order(multi_item_order()).await;
    app.create_order(json!({
        "customer_name": "Kabir Singh",
        "phone_number": "9111111111",
        "garment_type": "suit",
        "amount": "9000"
    }))
    .await;

    let id = first["id"].as_str().unwrap();
    app.as_staff(
        Method::PATCH,
        &format!("/api/v1/orders/{}/status", id),
        Some(json!({ "status": "cutting-done" })),
    )
    .await;

    let response = app
        .as_staff(Method::GET, "/api/v1/orders?status=cutting-done", None)
        .await;
    let page = data(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], first["id"]);

    let response = app
        .as_staff(Method::GET, "/api/v1/orders?search=Kabir&limit=10", None)
        .await;
    let page = data(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["customer_name"], "Kabir Singh");
    assert_eq!(page["limit"], 10);
}

#[tokio::test]
async fn staff_lookup_by_barcode_ignores_case() {
    let app = TestApp::new().await;
    let order = app.create_order(multi_item_order()).await;
    let barcode = order["barcode"].as_str().unwrap().to_ascii_lowercase();

    let response = app
        .as_staff(
            Method::GET,
            &format!("/api/v1/orders/by-barcode/{}", barcode),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let found = data(response).await;
    assert_eq!(found["id"], order["id"]);

    let response = app
        .as_staff(Method::GET, "/api/v1/orders/by-barcode/TTNOPE0000", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_endpoints_require_staff_credentials() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(multi_item_order()), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (customer_token, _) = app
        .register_customer("Tara", "tara@example.com", "9222222222")
        .await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(multi_item_order()),
            Some(&customer_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some("not-a-token"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["error"]["code"].is_string());
}

#[tokio::test]
async fn customers_see_their_own_orders() {
    let app = TestApp::new().await;
    let (token, _) = app
        .register_customer("Nisha", "nisha@example.com", "9333333333")
        .await;
    let customer_id = app.customer_profile_id("nisha@example.com").await;

    let order = app
        .create_order(json!({
            "customer_id": customer_id,
            "garment_type": "blouse",
            "amount": "700"
        }))
        .await;
    assert_eq!(order["customer_name"], "Nisha");
    assert_eq!(order["phone_number"], "9333333333");

    app.create_order(json!({
        "customer_name": "Someone Else",
        "phone_number": "9444444444",
        "garment_type": "shirt",
        "amount": "400"
    }))
    .await;

    let response = app
        .request(Method::GET, "/api/v1/me/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = data(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], order["id"]);

    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn order_barcode_image_is_png() {
    let app = TestApp::new().await;
    let order = app.create_order(multi_item_order()).await;
    let response = app
        .as_staff(
            Method::GET,
            &format!("/api/v1/orders/{}/barcode.png", order["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("image/png")
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}
