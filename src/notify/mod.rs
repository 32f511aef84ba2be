//! Report delivery through a [`Mailer`] collaborator.
//!
//! # Module structure
//!
//! - [`mailer`]: the `Mailer` trait, message and error types
//! - [`outbox`]: directory-backed mailer for dry runs
//!
//! A [`Notifier`] is consumed by [`Notifier::send`], so one invocation makes
//! at most one delivery attempt sequence.

pub mod mailer;
pub mod outbox;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::is_plausible_address;
use crate::render::ReportDocument;
use crate::retry::{BackoffPolicy, RetryError, retry};

pub use mailer::{DeliveryReceipt, EmailMessage, Mailer, MailerError};
pub use outbox::{OutboxEnvelope, OutboxMailer};

/// How a delivery attempt sequence ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Sent { message_id: String, attempts: u32 },
    /// Fatal; never retried.
    Rejected { reason: String },
    /// Throttling or transport errors outlasted the retry budget or deadline.
    TransientFailure { attempts: u32, reason: String },
}

impl NotifyOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    policy: BackoffPolicy,
    sender: String,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        policy: BackoffPolicy,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            mailer,
            clock,
            policy,
            sender: sender.into(),
        }
    }

    pub fn send(self, document: ReportDocument, recipients: &[String], deadline: Instant) -> NotifyOutcome {
        if recipients.is_empty() {
            return self.rejected("no recipients".to_string());
        }
        if let Some(bad) = recipients.iter().find(|r| !is_plausible_address(r)) {
            return self.rejected(format!("invalid recipient address '{bad}'"));
        }
        if !is_plausible_address(&self.sender) {
            return self.rejected(format!("invalid sender address '{}'", self.sender));
        }

        let message = EmailMessage {
            sender: self.sender.clone(),
            recipients: recipients.to_vec(),
            subject: document.subject,
            html: document.html,
            text: document.text,
            attachments: document.attachments,
        };

        let mut attempts_made = 0;
        let result = retry(&self.policy, self.clock.as_ref(), deadline, "send_email", |attempt| {
            attempts_made = attempt;
            self.mailer.send(&message)
        });

        match result {
            Ok(receipt) => {
                info!(
                    component = "notifier",
                    mailer = self.mailer.id(),
                    message_id = receipt.message_id.as_str(),
                    attempts = attempts_made,
                    recipients = message.recipients.len(),
                    "Report sent"
                );
                NotifyOutcome::Sent {
                    message_id: receipt.message_id,
                    attempts: attempts_made,
                }
            }
            Err(RetryError::Fatal { error, .. }) => self.rejected(error.to_string()),
            Err(err @ (RetryError::Exhausted { .. } | RetryError::Deadline { .. })) => {
                let attempts = err.attempts();
                let reason = err.to_string();
                warn!(
                    component = "notifier",
                    mailer = self.mailer.id(),
                    attempts,
                    reason = reason.as_str(),
                    "Report delivery failed"
                );
                NotifyOutcome::TransientFailure { attempts, reason }
            }
        }
    }

    fn rejected(&self, reason: String) -> NotifyOutcome {
        warn!(
            component = "notifier",
            mailer = self.mailer.id(),
            reason = reason.as_str(),
            "Report rejected"
        );
        NotifyOutcome::Rejected { reason }
    }
}
