//! Outbound notifications produced by the notifier.

use serde::{Deserialize, Serialize};

/// A message to deliver to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Written back once delivered, so the warning is sent only once.
    pub ack: Option<NotificationAck>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAck {
    pub host_id: String,
    pub key: String,
}
