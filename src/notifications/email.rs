use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sms::non_empty;
use super::{EmailProvider, NotificationError};
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

/// Transactional email over a JSON HTTP API with bearer-key auth.
#[derive(Clone)]
pub struct HttpEmailProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailProvider {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }

    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Option<Self> {
        Some(Self::new(
            client,
            non_empty(&config.email_api_url)?,
            non_empty(&config.email_api_key)?,
            non_empty(&config.email_from)?,
        ))
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, NotificationError> {
        if !to.contains('@') {
            return Err(NotificationError::InvalidRecipient(to.to_string()));
        }
        debug!(to = %to, subject = %subject, "Sending email");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SendEmailRequest {
                from: &self.from,
                to: [to],
                subject,
                text: body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendEmailResponse = response.json().await?;
        Ok(parsed.id.unwrap_or_else(|| "accepted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_json_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer key-1"))
            .and(body_partial_json(serde_json::json!({
                "to": ["asha@example.com"],
                "subject": "Ready"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "em_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpEmailProvider::new(
            reqwest::Client::new(),
            server.uri(),
            "key-1",
            "shop@example.com",
        );
        let id = provider
            .send_email("asha@example.com", "Ready", "Your order is ready")
            .await
            .unwrap();
        assert_eq!(id, "em_1");
    }

    #[tokio::test]
    async fn rejects_recipient_without_at_sign() {
        let provider = HttpEmailProvider::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "key",
            "shop@example.com",
        );
        let err = provider.send_email("nobody", "s", "b").await.unwrap_err();
        assert!(matches!(err, NotificationError::InvalidRecipient(_)));
    }
}
