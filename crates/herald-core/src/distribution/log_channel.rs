use async_trait::async_trait;
use tracing::info;

use super::{ChannelError, Notification, NotificationChannel};

/// Method name of the built-in channel.
pub const LOG_CHANNEL: &str = "log";

/// Writes notifications to the tracing log. Always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(
        &self,
        recipients: &[String],
        notification: &Notification,
    ) -> Result<(), ChannelError> {
        info!(
            kind = ?notification.kind,
            severity = ?notification.severity,
            recipients = ?recipients,
            subject = %notification.subject,
            attachment = ?notification.attachment.as_ref().map(|a| a.file_name.as_str()),
            "{}",
            notification.body
        );
        Ok(())
    }
}
