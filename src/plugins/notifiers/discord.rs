use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::plugins::traits::{EventKind, NotificationEvent, NotificationResult, NotifierPlugin};
use crate::utils::error::AppError;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    pub webhook_url: String,
    pub username: Option<String>,
}

impl DiscordWebhook {
    pub fn new(webhook_url: &str, username: Option<String>) -> Result<Self, String> {
        if !webhook_url.starts_with("https://discord.com/api/webhooks/") {
            return Err("Invalid Discord webhook URL format".to_string());
        }
        Ok(DiscordWebhook {
            webhook_url: webhook_url.to_string(),
            username,
        })
    }
}

pub struct DiscordNotifier {
    client: Client,
    config: DiscordWebhook,
}

impl DiscordNotifier {
    pub fn new(config: DiscordWebhook) -> Result<Self, AppError> {
        let client = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(DiscordNotifier { client, config })
    }

    fn get_embed_color(&self, kind: &EventKind) -> u32 {
        match kind {
            EventKind::StockAlert => 0x00ff00, // Green for restocks
            EventKind::StartupTest => 0x0099ff,
        }
    }

    fn get_emoji(&self, kind: &EventKind) -> &str {
        match kind {
            EventKind::StockAlert => "🛒",
            EventKind::StartupTest => "🧪",
        }
    }

    fn create_embed(&self, event: &NotificationEvent) -> serde_json::Value {
        let mut embed = json!({
            "title": format!("{} {}", self.get_emoji(&event.kind), event.title),
            "description": event.message,
            "color": self.get_embed_color(&event.kind),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(url) = &event.url {
            embed["url"] = json!(url);
        }

        embed["footer"] = json!({ "text": "Stock Watcher" });
        embed
    }

    fn create_webhook_payload(&self, event: &NotificationEvent) -> serde_json::Value {
        let mut payload = json!({
            "embeds": [self.create_embed(event)]
        });

        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }

        payload
    }
}

#[async_trait]
impl NotifierPlugin for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn plugin_type(&self) -> &str {
        "discord"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult, AppError> {
        let payload = self.create_webhook_payload(event);
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Notification {
                notifier: self.plugin_type().to_string(),
                message: format!("webhook returned {}", status.as_u16()),
            });
        }

        Ok(NotificationResult {
            success: true,
            message_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_event() -> NotificationEvent {
        NotificationEvent {
            kind: EventKind::StockAlert,
            title: "Stock Alert".to_string(),
            message: "In stock: Vinyl Doll".to_string(),
            url: Some("https://shop.example/p/1".to_string()),
        }
    }

    fn notifier_for(webhook_url: &str) -> DiscordNotifier {
        DiscordNotifier::new(DiscordWebhook {
            webhook_url: webhook_url.to_string(),
            username: Some("Stock Bot".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn test_config_rejects_foreign_webhook() {
        let config = DiscordWebhook::new("https://invalid-webhook-url.com", None);
        assert!(config.unwrap_err().contains("Invalid Discord webhook URL"));
    }

    #[test]
    fn test_config_accepts_discord_webhook() {
        let config = DiscordWebhook::new("https://discord.com/api/webhooks/123/token", None).unwrap();
        assert_eq!(config.webhook_url, "https://discord.com/api/webhooks/123/token");
    }

    #[test]
    fn test_embed_creation() {
        let notifier = notifier_for("https://discord.com/api/webhooks/123/token");
        let embed = notifier.create_embed(&create_test_event());

        assert!(embed["title"].as_str().unwrap().contains("Stock Alert"));
        assert!(embed["title"].as_str().unwrap().contains("🛒"));
        assert_eq!(embed["color"].as_u64().unwrap(), 0x00ff00);
        assert_eq!(embed["description"].as_str().unwrap(), "In stock: Vinyl Doll");
        assert_eq!(embed["url"].as_str().unwrap(), "https://shop.example/p/1");
        assert_eq!(embed["footer"]["text"].as_str().unwrap(), "Stock Watcher");
    }

    #[test]
    fn test_webhook_payload_creation() {
        let notifier = notifier_for("https://discord.com/api/webhooks/123/token");
        let payload = notifier.create_webhook_payload(&create_test_event());

        assert_eq!(payload["username"].as_str().unwrap(), "Stock Bot");
        assert_eq!(payload["embeds"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notify_posts_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/webhooks/123/token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier_for(&format!("{}/api/webhooks/123/token", server.uri()));
        let result = notifier.notify(&create_test_event()).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_notify_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let notifier = notifier_for(&server.uri());
        let err = notifier.notify(&create_test_event()).await.unwrap_err();
        assert!(err.to_string().contains("webhook returned 429"));
    }
}
