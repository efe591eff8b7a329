use tracing::{debug, info, warn};

use super::notifiers::{DiscordNotifier, DiscordWebhook, PushoverNotifier};
use super::traits::{NotificationEvent, NotifierPlugin};
use crate::config::NotificationsConfig;
use crate::utils::error::AppError;

pub type NotifierPluginBox = Box<dyn NotifierPlugin>;

/// How many channels were tried for one event and how many accepted it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub attempted: usize,
    pub delivered: usize,
}

impl DispatchOutcome {
    pub fn any_delivered(&self) -> bool {
        self.delivered > 0
    }
}

/// Fans an event out to every configured channel. A failed channel is
/// logged and skipped; dispatch itself never fails.
pub struct NotificationDispatcher {
    notifiers: Vec<NotifierPluginBox>,
}

impl NotificationDispatcher {
    pub fn new(notifiers: Vec<NotifierPluginBox>) -> Self {
        Self { notifiers }
    }

    /// Build the channels the configuration has credentials for.
    pub fn from_config(config: &NotificationsConfig) -> Result<Self, AppError> {
        let mut notifiers: Vec<NotifierPluginBox> = Vec::new();

        match config.pushover_credentials() {
            Some(credentials) => {
                notifiers.push(Box::new(PushoverNotifier::new(
                    credentials,
                    config.pushover.api_url.clone(),
                )?));
            }
            None => warn!("Pushover not configured; skipping push"),
        }

        if let Some(webhook_url) = &config.discord.webhook_url {
            let webhook = DiscordWebhook::new(webhook_url, Some(config.discord.username.clone()))
                .map_err(AppError::Validation)?;
            notifiers.push(Box::new(DiscordNotifier::new(webhook)?));
        }

        for notifier in &notifiers {
            info!("Notifier enabled: {}", notifier.name());
        }

        Ok(Self::new(notifiers))
    }

    pub fn is_enabled(&self) -> bool {
        !self.notifiers.is_empty()
    }

    pub fn channels(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.plugin_type()).collect()
    }

    pub async fn dispatch(&self, event: &NotificationEvent) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for notifier in &self.notifiers {
            outcome.attempted += 1;
            match notifier.notify(event).await {
                Ok(result) if result.success => {
                    outcome.delivered += 1;
                    debug!(
                        "{} delivered '{}' (id: {:?})",
                        notifier.plugin_type(),
                        event.title,
                        result.message_id
                    );
                }
                Ok(_) => warn!("{} did not accept '{}'", notifier.plugin_type(), event.title),
                Err(e) => warn!("{} failed to send '{}': {}", notifier.plugin_type(), event.title, e),
            }
        }

        outcome
    }
}
