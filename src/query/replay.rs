//! File-backed [`QueryEngine`] that replays a recorded execution.
//!
//! Script format (JSON):
//!
//! ```json
//! {
//!   "execution_id": "replay-1",
//!   "states": ["RUNNING", "RUNNING", "SUCCEEDED"],
//!   "reason": null,
//!   "pages": [
//!     [["service", "cost"], ["EC2", "1000"]],
//!     [["S3", "200"]]
//!   ]
//! }
//! ```
//!
//! Status checks walk `states` in order and then keep reporting the last one.
//! `reject` makes submission fail as the engine would for invalid SQL.

use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::{EngineError, QueryEngine, ResultPage, StatusReport};
use super::{QueryRequest, QueryState, ResultRow};

const PAGE_TOKEN_PREFIX: &str = "page-";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default = "default_execution_id")]
    pub execution_id: String,
    #[serde(default)]
    pub states: Vec<QueryState>,
    /// Reason attached to a FAILED or CANCELLED state.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub pages: Vec<Vec<ResultRow>>,
    #[serde(default)]
    pub reject: Option<String>,
}

fn default_execution_id() -> String {
    "replay-1".to_string()
}

pub struct ReplayEngine {
    script: ReplayScript,
    cursor: Mutex<usize>,
}

impl ReplayEngine {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            script,
            cursor: Mutex::new(0),
        }
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let script: ReplayScript = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self::new(script))
    }

    fn check_id(&self, execution_id: &str) -> Result<(), EngineError> {
        if execution_id == self.script.execution_id {
            Ok(())
        } else {
            Err(EngineError::UnknownExecution(execution_id.to_string()))
        }
    }
}

impl QueryEngine for ReplayEngine {
    fn id(&self) -> &str {
        "replay"
    }

    fn submit(&self, request: &QueryRequest) -> Result<String, EngineError> {
        if let Some(reason) = &self.script.reject {
            return Err(EngineError::Rejected(reason.clone()));
        }
        debug!(query_name = request.query_name.as_str(), "Replaying submission");
        *self.cursor.lock() = 0;
        Ok(self.script.execution_id.clone())
    }

    fn status(&self, execution_id: &str) -> Result<StatusReport, EngineError> {
        self.check_id(execution_id)?;
        let mut cursor = self.cursor.lock();
        let state = match self.script.states.get(*cursor) {
            Some(state) => {
                *cursor += 1;
                *state
            }
            None => self
                .script
                .states
                .last()
                .copied()
                .unwrap_or(QueryState::Succeeded),
        };
        let report = match (&self.script.reason, state) {
            (Some(reason), QueryState::Failed | QueryState::Cancelled) => {
                StatusReport::with_reason(state, reason.clone())
            }
            _ => StatusReport::new(state),
        };
        Ok(report)
    }

    fn results(
        &self,
        execution_id: &str,
        page_token: Option<&str>,
    ) -> Result<ResultPage, EngineError> {
        self.check_id(execution_id)?;
        let index = match page_token {
            None => 0,
            Some(token) => token
                .strip_prefix(PAGE_TOKEN_PREFIX)
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| EngineError::Rejected(format!("invalid page token '{token}'")))?,
        };
        let rows = self.script.pages.get(index).cloned().unwrap_or_default();
        let next_token =
            (index + 1 < self.script.pages.len()).then(|| format!("{PAGE_TOKEN_PREFIX}{}", index + 1));
        Ok(ResultPage { rows, next_token })
    }
}
