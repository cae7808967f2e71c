//! Outbound SMS through the facility's HTTP gateway.

use crate::config::{keys, ConfigProvider};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway settings read from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsSettings {
    pub url: String,
    pub api_token: String,
    pub sender_id: Option<String>,
    pub gateway: Option<String>,
}

impl SmsSettings {
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the URL or API token is missing.
    pub fn from_config(config: &dyn ConfigProvider) -> crate::Result<Self> {
        Ok(Self {
            url: config.require(keys::SMS_URL)?,
            api_token: config.require(keys::SMS_API_TOKEN)?,
            sender_id: config.get(keys::SMS_SENDER_ID),
            gateway: config.get(keys::SMS_GATEWAY),
        })
    }
}

#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    destination: &'a str,
    msg: &'a str,
    sender_id: Option<&'a str>,
    gateway: Option<&'a str>,
}

/// What the gateway said about one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsDelivery {
    /// `true` only for an HTTP 200 answer
    pub delivered: bool,
    pub status: u16,
    /// Raw response body
    pub body: String,
}

impl SmsDelivery {
    /// Human-readable summary, as shown to the operator.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.delivered {
            format!("SMS sent successfully {}", self.body)
        } else {
            format!("Failed to send SMS {}", self.body)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmsClient {
    http: Client,
    settings: SmsSettings,
}

impl SmsClient {
    /// # Errors
    ///
    /// Returns [`crate::Error::Sms`] if the HTTP client cannot be built.
    pub fn new(settings: SmsSettings) -> crate::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, settings })
    }

    #[must_use]
    pub fn settings(&self) -> &SmsSettings {
        &self.settings
    }

    /// Posts one message to the gateway.
    ///
    /// A non-200 answer is not an error; it comes back as an undelivered
    /// [`SmsDelivery`] carrying the gateway's response body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Sms`] if the gateway cannot be reached or the
    /// response body cannot be read.
    #[instrument(skip(self, message), fields(gateway = ?self.settings.gateway))]
    pub async fn send(&self, recipient: &str, message: &str) -> crate::Result<SmsDelivery> {
        let payload = SmsPayload {
            destination: recipient,
            msg: message,
            sender_id: self.settings.sender_id.as_deref(),
            gateway: self.settings.gateway.as_deref(),
        };

        let response = self
            .http
            .post(&self.settings.url)
            .header("api-token", &self.settings.api_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let delivered = status == StatusCode::OK;

        if delivered {
            info!(status = status.as_u16(), "SMS sent");
        } else {
            warn!(status = status.as_u16(), %body, "SMS gateway rejected message");
        }

        Ok(SmsDelivery {
            delivered,
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfig;
    use crate::Error;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(url: String) -> SmsSettings {
        SmsSettings {
            url,
            api_token: "secret".into(),
            sender_id: Some("CLINIC".into()),
            gateway: None,
        }
    }

    #[test]
    fn test_settings_from_config() {
        let config = StaticConfig::new()
            .with(keys::SMS_URL, "https://sms.example/send")
            .with(keys::SMS_API_TOKEN, "t0ken")
            .with(keys::SMS_GATEWAY, "safaricom");
        let settings = SmsSettings::from_config(&config).unwrap();
        assert_eq!(settings.url, "https://sms.example/send");
        assert_eq!(settings.sender_id, None);
        assert_eq!(settings.gateway.as_deref(), Some("safaricom"));
    }

    #[test]
    fn test_settings_require_url() {
        let config = StaticConfig::new().with(keys::SMS_API_TOKEN, "t0ken");
        assert!(matches!(SmsSettings::from_config(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_delivered_on_200() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sms"))
            .and(header("api-token", "secret"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "destination": "+254700000000",
                "msg": "Your appointment is tomorrow",
                "sender_id": "CLINIC",
                "gateway": null
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("queued"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = SmsClient::new(settings(format!("{}/sms", mock_server.uri()))).unwrap();
        let delivery = client.send("+254700000000", "Your appointment is tomorrow").await.unwrap();

        assert!(delivery.delivered);
        assert_eq!(delivery.body, "queued");
        assert_eq!(delivery.summary(), "SMS sent successfully queued");
    }

    #[tokio::test]
    async fn test_rejected_is_not_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sms"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad token"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = SmsClient::new(settings(format!("{}/sms", mock_server.uri()))).unwrap();
        let delivery = client.send("+254700000000", "hello").await.unwrap();

        assert!(!delivery.delivered);
        assert_eq!(delivery.status, 403);
        assert_eq!(delivery.summary(), "Failed to send SMS bad token");
    }

    #[tokio::test]
    async fn test_unreachable_gateway() {
        let client = SmsClient::new(settings("http://127.0.0.1:1/sms".into())).unwrap();
        let err = client.send("+254700000000", "hello").await.unwrap_err();
        assert!(matches!(err, Error::Sms(_)));
    }
}
