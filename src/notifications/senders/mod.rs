use async_trait::async_trait;
use thiserror::Error;

use super::models::RenderedMessage;

pub mod http_mail;
pub mod log;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),
    #[error("No recipients for this notification")]
    NoRecipients,
    #[error("Mail provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Delivers a rendered message to a list of addresses.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(
        &self,
        recipients: &[String],
        message: &RenderedMessage,
    ) -> Result<SendReceipt, SenderError>;
}

/// Rejects obviously malformed addresses before they reach the provider.
pub fn validate_recipient(address: &str) -> Result<(), SenderError> {
    let invalid = || SenderError::InvalidRecipient(address.to_string());
    if address.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = address.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels_ok = domain.split('.').count() >= 2 && domain.split('.').all(|l| !l.is_empty());
    if !labels_ok {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_recipients(recipients: &[String]) -> Result<(), SenderError> {
    if recipients.is_empty() {
        return Err(SenderError::NoRecipients);
    }
    recipients.iter().try_for_each(|r| validate_recipient(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_recipient() {
        assert!(validate_recipient("owner@example.com").is_ok());
        assert!(validate_recipient("first.last+tag@mail.example.co.uk").is_ok());

        for bad in ["", "owner", "@example.com", "owner@", "owner@localhost", "a b@example.com", "a@b@example.com", "owner@example..com"] {
            assert!(
                matches!(validate_recipient(bad), Err(SenderError::InvalidRecipient(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_recipients_requires_one() {
        assert!(matches!(validate_recipients(&[]), Err(SenderError::NoRecipients)));
        assert!(validate_recipients(&["a@example.com".to_string()]).is_ok());
    }
}
