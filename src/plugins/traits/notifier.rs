use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::NotificationsConfig;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    StockAlert,
    StartupTest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub title: String,
    pub message: String,
    /// Deep link opened from the notification.
    pub url: Option<String>,
}

impl NotificationEvent {
    /// "In stock: <name>", plus the cart link when one is configured.
    pub fn stock_alert(config: &NotificationsConfig, product_url: &str, page_title: Option<&str>) -> Self {
        let name = page_title.unwrap_or(product_url);
        let mut message = format!("In stock: {}", name);
        if page_title.is_some() {
            message.push('\n');
            message.push_str(product_url);
        }
        if let Some(cart) = &config.cart_url {
            message.push_str(&format!("\nCart: {}", cart));
        }

        Self {
            kind: EventKind::StockAlert,
            title: config.title.clone(),
            message,
            url: Some(product_url.to_string()),
        }
    }

    pub fn startup_test(first_product: Option<&str>) -> Self {
        Self {
            kind: EventKind::StartupTest,
            title: "Watcher Test".to_string(),
            message: "Stock watcher started OK.".to_string(),
            url: first_product.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
}

/// Push channel. Implementations make exactly one attempt per event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult, AppError>;
}
