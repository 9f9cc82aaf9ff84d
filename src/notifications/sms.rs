use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{NotificationError, SmsProvider};
use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextChannel {
    Sms,
    WhatsApp,
}

impl TextChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextChannel::Sms => "sms",
            TextChannel::WhatsApp => "whatsapp",
        }
    }

    fn address(&self, number: &str) -> String {
        match self {
            TextChannel::Sms => number.to_string(),
            TextChannel::WhatsApp => format!("whatsapp:{}", number),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

/// Text messages over a Twilio-style REST endpoint.
///
/// Posts a form with `To`, `From` and `Body`, authenticated with HTTP basic
/// auth using the account SID and auth token.
#[derive(Clone)]
pub struct HttpSmsProvider {
    client: reqwest::Client,
    endpoint: String,
    account_sid: String,
    auth_token: String,
    from: String,
    channel: TextChannel,
}

impl HttpSmsProvider {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from: impl Into<String>,
        channel: TextChannel,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from: from.into(),
            channel,
        }
    }

    /// Builds a provider when every credential is present.
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Option<Self> {
        let channel = if config.sms_channel.eq_ignore_ascii_case("whatsapp") {
            TextChannel::WhatsApp
        } else {
            TextChannel::Sms
        };
        Some(Self::new(
            client,
            non_empty(&config.sms_api_url)?,
            non_empty(&config.sms_account_sid)?,
            non_empty(&config.sms_auth_token)?,
            non_empty(&config.sms_from)?,
            channel,
        ))
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SmsProvider for HttpSmsProvider {
    fn channel(&self) -> &'static str {
        self.channel.as_str()
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<String, NotificationError> {
        let to = self.channel.address(to);
        let from = self.channel.address(&self.from);
        debug!(channel = self.channel.as_str(), to = %to, "Sending text message");

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", body)])
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

        let parsed: MessageResponse = response.json().await?;
        Ok(parsed.sid.unwrap_or_else(|| "accepted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, channel: TextChannel) -> HttpSmsProvider {
        HttpSmsProvider::new(
            reqwest::Client::new(),
            format!("{}/Messages.json", server.uri()),
            "AC123",
            "token",
            "+15550001111",
            channel,
        )
    }

    #[tokio::test]
    async fn returns_provider_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Messages.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B919876543210"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "SM42"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = provider(&server, TextChannel::Sms)
            .send_text("+919876543210", "hello")
            .await
            .unwrap();
        assert_eq!(id, "SM42");
    }

    #[tokio::test]
    async fn whatsapp_prefixes_addresses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("To=whatsapp%3A%2B919876543210"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "SM7"})))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server, TextChannel::WhatsApp);
        assert_eq!(provider.channel(), "whatsapp");
        provider.send_text("+919876543210", "hi").await.unwrap();
    }

    #[tokio::test]
    async fn provider_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let err = provider(&server, TextChannel::Sms)
            .send_text("+919876543210", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Provider { status: 401, .. }));
    }

    #[test]
    fn missing_credentials_disable_provider() {
        let config = AppConfig::new(
            "sqlite::memory:".into(),
            "a_perfectly_reasonable_secret_for_unit_tests_42".into(),
            60,
            "127.0.0.1".into(),
            0,
            "development".into(),
        );
        assert!(HttpSmsProvider::from_config(&config, reqwest::Client::new()).is_none());
    }
}
