//! Email-sending collaborator boundary.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::render::Attachment;
use crate::retry::Transient;

/// A fully addressed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailerError {
    /// Invalid recipient, unverified sender, message too large.
    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("mailer throttled: {message}")]
    Throttled {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("transient mailer error: {0}")]
    Transient(String),
}

impl Transient for MailerError {
    fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

pub trait Mailer: Send + Sync {
    fn id(&self) -> &str;

    fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt, MailerError>;
}
