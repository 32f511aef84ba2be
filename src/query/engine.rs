//! Query engine collaborator boundary.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{QueryRequest, QueryState, ResultRow};
use crate::retry::Transient;

/// Communication failure talking to the engine (not a query failure).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Rate limited; optionally with the engine's retry hint.
    #[error("throttled: {message}")]
    Throttled {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Network hiccup or 5xx-style failure.
    #[error("transient engine error: {0}")]
    Transient(String),

    /// The engine refused the request (bad SQL, unknown database, access denied).
    #[error("engine rejected request: {0}")]
    Rejected(String),

    /// The execution id is unknown to the engine.
    #[error("unknown execution id: {0}")]
    UnknownExecution(String),
}

impl Transient for EngineError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Transient(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Answer to one status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: QueryState,
    /// Engine's explanation, verbatim (set for failed/cancelled queries).
    #[serde(default)]
    pub reason: Option<String>,
}

impl StatusReport {
    pub fn new(state: QueryState) -> Self {
        Self {
            state,
            reason: None,
        }
    }

    pub fn with_reason(state: QueryState, reason: impl Into<String>) -> Self {
        Self {
            state,
            reason: Some(reason.into()),
        }
    }
}

/// One page of results. Only the first page carries the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPage {
    pub rows: Vec<ResultRow>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Asynchronous analytical engine.
pub trait QueryEngine: Send + Sync {
    fn id(&self) -> &str;

    /// Start the query; returns the engine's execution id.
    fn submit(&self, request: &QueryRequest) -> Result<String, EngineError>;

    /// Current state of an execution.
    fn status(&self, execution_id: &str) -> Result<StatusReport, EngineError>;

    /// One page of a succeeded execution's results.
    fn results(
        &self,
        execution_id: &str,
        page_token: Option<&str>,
    ) -> Result<ResultPage, EngineError>;
}
