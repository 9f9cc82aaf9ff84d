#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tailortrack::{
    app_router,
    auth::AuthService,
    config::AppConfig,
    db::{self, DbConfig},
    entities::UserRole,
    events::{self, EventSender},
    notifications::{EmailProvider, NotificationDispatcher, NotificationError, SmsProvider},
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration_secret_key_for_tailortrack_tests_0042";
pub const CHECKOUT_SECRET: &str = "checkout_secret_for_tests";
pub const WEBHOOK_SECRET: &str = "webhook_secret_for_tests";

/// A text message captured by [`RecordingSms`].
#[derive(Debug, Clone)]
pub struct SentText {
    pub to: String,
    pub body: String,
}

/// An email captured by [`RecordingEmail`].
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<SentText>>,
}

impl RecordingSms {
    pub fn sent(&self) -> Vec<SentText> {
        self.sent.lock().expect("sms log lock").clone()
    }
}

#[async_trait]
impl SmsProvider for RecordingSms {
    fn channel(&self) -> &'static str {
        "sms"
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<String, NotificationError> {
        let mut sent = self.sent.lock().expect("sms log lock");
        sent.push(SentText {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(format!("SM{}", sent.len()))
    }
}

#[derive(Default)]
pub struct RecordingEmail {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingEmail {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("email log lock").clone()
    }
}

#[async_trait]
impl EmailProvider for RecordingEmail {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, NotificationError> {
        let mut sent = self.sent.lock().expect("email log lock");
        sent.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(format!("EM{}", sent.len()))
    }
}

/// Full application over a throwaway SQLite file, with recording providers
/// in place of the real SMS and email backends.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub sms: Arc<RecordingSms>,
    pub email: Arc<RecordingEmail>,
    pub admin_id: Uuid,
    pub staff_id: Uuid,
    admin_token: String,
    staff_token: String,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Gateway secrets set; `gateway_url` points the checkout client at a mock.
    pub async fn with_gateway(gateway_url: Option<String>) -> Self {
        Self::with_config(move |cfg| {
            cfg.gateway_api_url = gateway_url;
            cfg.gateway_key_id = Some("rzp_test_key".to_string());
            cfg.gateway_key_secret = Some(CHECKOUT_SECRET.to_string());
            cfg.gateway_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        })
        .await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("tailortrack_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.public_base_url = "https://track.stitch.test".to_string();
        cfg.shop_name = "Stitch Co".to_string();
        customize(&mut cfg);

        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let cfg = Arc::new(cfg);

        let sms = Arc::new(RecordingSms::default());
        let email = Arc::new(RecordingEmail::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            db.clone(),
            Some(sms.clone() as Arc<dyn SmsProvider>),
            Some(email.clone() as Arc<dyn EmailProvider>),
            cfg.shop_name.clone(),
            "+91",
        ));

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx, dispatcher));

        let state = AppState::new(
            db,
            cfg,
            EventSender::new(event_tx),
            reqwest::Client::new(),
        );

        let admin = state
            .auth
            .upsert_staff("admin@stitch.test", "admin-password-1", "Asha Admin", UserRole::Admin)
            .await
            .expect("seed admin");
        let staff = state
            .auth
            .upsert_staff("staff@stitch.test", "staff-password-1", "Ravi Staff", UserRole::Staff)
            .await
            .expect("seed staff");

        let admin_token = state
            .auth
            .issue_token(admin.id, &admin.name, &admin.email, UserRole::Admin)
            .expect("admin token");
        let staff_token = state
            .auth
            .issue_token(staff.id, &staff.name, &staff.email, UserRole::Staff)
            .expect("staff token");

        let router = app_router(state.clone());

        Self {
            router,
            state,
            sms,
            email,
            admin_id: admin.id,
            staff_id: staff.id,
            admin_token,
            staff_token,
            _dir: dir,
            _event_task: event_task,
        }
    }

    pub fn auth(&self) -> Arc<AuthService> {
        self.state.auth.clone()
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn staff_token(&self) -> &str {
        &self.staff_token
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Raw body with extra headers, for signed webhook deliveries.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn as_staff(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.staff_token())).await
    }

    pub async fn as_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.admin_token())).await
    }

    /// Creates an order as staff and returns the `data` payload.
    pub async fn create_order(&self, body: Value) -> Value {
        let response = self.as_staff(Method::POST, "/api/v1/orders", Some(body)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        data(response).await
    }

    /// Registers a customer account; returns `(token, user_id)`.
    pub async fn register_customer(&self, name: &str, email: &str, phone: &str) -> (String, Uuid) {
        let response = self
            .request(
                Method::POST,
                "/auth/register",
                Some(serde_json::json!({
                    "name": name,
                    "email": email,
                    "password": "customer-pass-1",
                    "phone": phone,
                })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = data(response).await;
        let token = body["access_token"].as_str().expect("token").to_string();
        let user_id = body["user"]["id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .expect("user id");
        (token, user_id)
    }

    /// Customer profile created alongside a registered account.
    pub async fn customer_profile_id(&self, email: &str) -> Uuid {
        let response = self
            .as_staff(
                Method::GET,
                &format!("/api/v1/customers?search={}", email),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = data(response).await;
        body["items"][0]["id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .expect("customer profile id")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// The `data` field of an `ApiResponse` envelope.
pub async fn data(response: axum::response::Response) -> Value {
    let mut body = body_json(response).await;
    assert_eq!(body["success"], Value::Bool(true), "unexpected envelope: {}", body);
    body["data"].take()
}

pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {}", other),
    }
}

/// Polls `check` until it returns `Some`, for effects of background dispatch.
pub async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for _ in 0..100 {
        if let Some(value) = check().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within timeout");
}
