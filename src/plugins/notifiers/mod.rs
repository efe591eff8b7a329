// Notifier plugin implementations
pub mod pushover;
pub mod discord;

pub use pushover::PushoverNotifier;
pub use discord::{DiscordNotifier, DiscordWebhook};
