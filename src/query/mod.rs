//! Asynchronous query execution against the analytical engine.
//!
//! # Module structure
//!
//! - [`engine`]: the `QueryEngine` collaborator trait and its error type
//! - [`executor`]: submit/poll/fetch state machine
//! - [`decode`]: header-keyed decoding of the raw result set
//! - [`replay`]: file-backed engine for dry runs

pub mod decode;
pub mod engine;
pub mod executor;
pub mod replay;

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use decode::{Cell, DecodeError, DecodedTable, Record, decode};
pub use engine::{EngineError, QueryEngine, ResultPage, StatusReport};
pub use executor::{PollSchedule, QueryExecutor};

/// One query to run, built once per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    pub database: String,
    /// Where the engine stores result artifacts (e.g. an object-store prefix).
    pub output_location: String,
    /// Logical name used in the subject line and the attachment filename.
    pub query_name: String,
}

/// Lifecycle state reported by the engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for QueryState {
    type Err = String;

    /// Accepts engine spellings, including `QUEUED` for a submitted query.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" | "QUEUED" => Ok(Self::Submitted),
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            other => Err(format!("unknown query state '{other}'")),
        }
    }
}

/// Handle for one submitted query; owned by the executor.
#[derive(Debug, Clone)]
pub struct QueryExecution {
    pub execution_id: String,
    pub state: QueryState,
    pub started_at: Instant,
    /// Engine-provided reason for the latest state, if any.
    pub reason: Option<String>,
    pub status_checks: u32,
}

impl QueryExecution {
    /// The only state set locally; everything after comes from polling.
    pub fn submitted(execution_id: String, started_at: Instant) -> Self {
        Self {
            execution_id,
            state: QueryState::Submitted,
            started_at,
            reason: None,
            status_checks: 0,
        }
    }

    pub fn observe(&mut self, report: StatusReport) {
        self.state = report.state;
        self.reason = report.reason;
        self.status_checks += 1;
    }
}

/// Ordered string cells; the first row of a result set is the header.
pub type ResultRow = Vec<String>;

/// Complete, ordered result of a query, header row first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    rows: Vec<ResultRow>,
}

impl ResultSet {
    pub fn new(rows: Vec<ResultRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn header(&self) -> Option<&ResultRow> {
        self.rows.first()
    }

    /// Rows after the header.
    pub fn data_rows(&self) -> &[ResultRow] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn data_row_count(&self) -> usize {
        self.data_rows().len()
    }
}
