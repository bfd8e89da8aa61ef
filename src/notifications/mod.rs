pub mod types;
pub mod webhook;

pub use types::{ErrorSeverity, Notification, NotificationType};
pub use webhook::WebhookNotifier;
