use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::PushoverCredentials;
use crate::plugins::traits::{NotificationEvent, NotificationResult, NotifierPlugin};
use crate::utils::error::AppError;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct PushoverResponse {
    #[serde(default)]
    request: Option<String>,
}

/// Pushover message API. One POST per event, never retried.
pub struct PushoverNotifier {
    client: Client,
    credentials: PushoverCredentials,
    api_url: String,
}

impl PushoverNotifier {
    pub fn new(credentials: PushoverCredentials, api_url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            credentials,
            api_url: api_url.into(),
        })
    }

    fn form(&self, event: &NotificationEvent) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("token", self.credentials.token.clone()),
            ("user", self.credentials.user.clone()),
            ("title", event.title.clone()),
            ("message", event.message.clone()),
        ];
        if let Some(url) = &event.url {
            form.push(("url", url.clone()));
        }
        form
    }
}

#[async_trait]
impl NotifierPlugin for PushoverNotifier {
    fn name(&self) -> &str {
        "Pushover Notifier"
    }

    fn plugin_type(&self) -> &str {
        "pushover"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult, AppError> {
        let response = self.client.post(&self.api_url).form(&self.form(event)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notification {
                notifier: self.plugin_type().to_string(),
                message: format!("{} {}", status.as_u16(), body.trim()),
            });
        }

        // The receipt id is informational; an unexpected body is still a delivery
        let message_id = response
            .json::<PushoverResponse>()
            .await
            .ok()
            .and_then(|r| r.request);

        Ok(NotificationResult {
            success: true,
            message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::traits::EventKind;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> PushoverCredentials {
        PushoverCredentials {
            token: "app-token".to_string(),
            user: "user-key".to_string(),
        }
    }

    fn event() -> NotificationEvent {
        NotificationEvent {
            kind: EventKind::StockAlert,
            title: "Stock Alert".to_string(),
            message: "In stock: Vinyl Doll".to_string(),
            url: Some("https://shop.example/p/1".to_string()),
        }
    }

    #[test]
    fn test_form_fields() {
        let notifier = PushoverNotifier::new(credentials(), "https://api.example/1/messages.json").unwrap();
        let form = notifier.form(&event());
        assert!(form.contains(&("token", "app-token".to_string())));
        assert!(form.contains(&("user", "user-key".to_string())));
        assert!(form.contains(&("url", "https://shop.example/p/1".to_string())));
        assert_eq!(notifier.plugin_type(), "pushover");
    }

    #[test]
    fn test_form_without_url() {
        let notifier = PushoverNotifier::new(credentials(), "https://api.example/1/messages.json").unwrap();
        let mut event = event();
        event.url = None;
        assert!(!notifier.form(&event).iter().any(|(k, _)| *k == "url"));
    }

    #[tokio::test]
    async fn test_notify_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1/messages.json"))
            .and(body_string_contains("token=app-token"))
            .and(body_string_contains("title=Stock+Alert"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 1,
                "request": "5042853c-402d-4a18-abcb-168734a801de"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = PushoverNotifier::new(credentials(), format!("{}/1/messages.json", server.uri())).unwrap();
        let result = notifier.notify(&event()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.message_id.as_deref(), Some("5042853c-402d-4a18-abcb-168734a801de"));
    }

    #[tokio::test]
    async fn test_notify_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"user":"invalid","status":0}"#))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = PushoverNotifier::new(credentials(), server.uri()).unwrap();
        let err = notifier.notify(&event()).await.unwrap_err();
        match err {
            AppError::Notification { notifier, message } => {
                assert_eq!(notifier, "pushover");
                assert!(message.starts_with("400"));
                assert!(message.contains("invalid"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
