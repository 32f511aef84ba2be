//! Directory-backed [`Mailer`]: each message becomes one JSON envelope.
//!
//! Attachments are base64-encoded so the envelope stays valid UTF-8 JSON.
//! The file stem doubles as the message id.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::mailer::{DeliveryReceipt, EmailMessage, Mailer, MailerError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxAttachment {
    pub filename: String,
    pub content_type: String,
    pub content_base64: String,
}

impl OutboxAttachment {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.content_base64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEnvelope {
    pub message_id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachments: Vec<OutboxAttachment>,
}

impl OutboxEnvelope {
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

pub struct OutboxMailer {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl OutboxMailer {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_stem(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{}-{seq}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
            std::process::id()
        )
    }
}

impl Mailer for OutboxMailer {
    fn id(&self) -> &str {
        "outbox"
    }

    fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt, MailerError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            MailerError::Transient(format!("create outbox {}: {e}", self.dir.display()))
        })?;

        let message_id = self.next_stem();
        let envelope = OutboxEnvelope {
            message_id: message_id.clone(),
            sender: message.sender.clone(),
            recipients: message.recipients.clone(),
            subject: message.subject.clone(),
            text: message.text.clone(),
            html: message.html.clone(),
            attachments: message
                .attachments
                .iter()
                .map(|a| OutboxAttachment {
                    filename: a.filename.clone(),
                    content_type: a.content_type.clone(),
                    content_base64: BASE64.encode(&a.bytes),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&envelope)
            .map_err(|e| MailerError::Rejected(format!("serialize envelope: {e}")))?;

        let path = self.dir.join(format!("{message_id}.json"));
        write_atomically(&path, json.as_bytes())
            .map_err(|e| MailerError::Transient(format!("write {}: {e}", path.display())))?;

        info!(
            component = "outbox",
            message_id = message_id.as_str(),
            path = %path.display(),
            recipients = message.recipients.len(),
            "Wrote message to outbox"
        );
        Ok(DeliveryReceipt { message_id })
    }
}

/// Write to `<path>.tmp` and rename into place, so `path` is either absent
/// or complete. The temp file is removed when either step fails.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let result = std::fs::write(&tmp_path, bytes).and_then(|()| std::fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}
