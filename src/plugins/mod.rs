pub mod traits;
pub mod manager;
pub mod notifiers;

pub use manager::{DispatchOutcome, NotificationDispatcher};
pub use traits::{NotificationEvent, NotifierPlugin};
