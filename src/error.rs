//! Invocation-level error taxonomy.
//!
//! Only [`PipelineError::DegradedFetch`] is absorbed inside the pipeline;
//! every other variant ends the invocation as a failed outcome.

use thiserror::Error;

use crate::config::ConfigError;
use crate::query::QueryState;
use crate::query::decode::DecodeError;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Transient collaborator failures outlasted the retry budget.
    #[error("{operation} failed after {attempts} attempts: {message}")]
    TransientIo {
        operation: &'static str,
        attempts: u32,
        message: String,
    },

    /// The engine reported a terminal failure for the query.
    #[error("query {execution_id} {state}: {reason}")]
    QueryFailed {
        execution_id: String,
        state: QueryState,
        reason: String,
    },

    /// The result set had an unexpected shape or unparseable amounts.
    #[error("malformed result set: {0}")]
    Decode(#[from] DecodeError),

    /// The recommendation source could not be read.
    #[error("recommendation source unavailable: {0}")]
    DegradedFetch(String),

    /// The mail collaborator refused the message.
    #[error("notification rejected: {0}")]
    NotificationRejected(String),

    /// The invocation budget ran out.
    #[error("deadline exceeded while {0}")]
    DeadlineExceeded(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientIo { .. } => "transient_io",
            Self::QueryFailed { .. } => "query_failed",
            Self::Decode(_) => "decode",
            Self::DegradedFetch(_) => "degraded_fetch",
            Self::NotificationRejected(_) => "notification_rejected",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::TransientIo { .. } => 3,
            Self::QueryFailed { .. } => 4,
            Self::Decode(_) => 5,
            Self::NotificationRejected(_) => 6,
            Self::DeadlineExceeded(_) => 7,
            Self::DegradedFetch(_) | Self::Io(_) => 1,
        }
    }

    /// Whether re-running the whole invocation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientIo { .. } | Self::DeadlineExceeded(_) | Self::DegradedFetch(_)
        )
    }

    /// Short operator-facing suggestion.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::TransientIo { .. } => {
                Some("The engine or mail service is throttling; the next scheduled run may succeed.")
            }
            Self::QueryFailed { .. } => {
                Some("Check the query text and database name in the invocation input.")
            }
            Self::Decode(_) => Some("Check that the configured amount column holds plain numbers."),
            Self::NotificationRejected(_) => {
                Some("Verify the sender identity and recipient addresses in [mail].")
            }
            Self::DeadlineExceeded(_) => {
                Some("Raise query.deadline_secs or narrow the query's date range.")
            }
            Self::Config(_) => Some("Run `cost-digest check-config` to see the offending field."),
            Self::DegradedFetch(_) | Self::Io(_) => None,
        }
    }
}
