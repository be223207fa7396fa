use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{MailSender, SendReceipt, SenderError, validate_recipients};
use crate::notifications::models::RenderedMessage;

/// Development sender: writes the message to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(
        &self,
        recipients: &[String],
        message: &RenderedMessage,
    ) -> Result<SendReceipt, SenderError> {
        validate_recipients(recipients)?;
        let message_id = format!("log-{}", Uuid::new_v4());
        info!(
            to = %recipients.join(", "),
            subject = %message.subject,
            message_id = %message_id,
            "Mail delivery is not configured; logging message instead."
        );
        Ok(SendReceipt {
            message_id: Some(message_id),
        })
    }
}
