//! Pipeline configuration.
//!
//! Everything an invocation needs besides its trigger input lives in one
//! TOML file, passed explicitly into the pipeline entry point.
//!
//! # Example Configuration
//!
//! ```toml
//! [mail]
//! sender = "cost-reports@example.com"
//! recipients = ["finops@example.com"]
//! subject_prefix = "Cloud Cost Report"
//!
//! [query]
//! poll_interval_ms = 2000
//! deadline_secs = 840
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 500
//!
//! [metrics]
//! top_n = 5
//! label_column = "service"
//! amount_column = "cost"
//!
//! [[metrics.grades]]
//! above = 90.0
//! grade = "A+"
//!
//! [[metrics.conversions]]
//! name = "coffee cups"
//! unit_price = 5.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::grade::GradeBand;
use crate::analytics::types::UnitConversion;
use crate::retry::BackoffPolicy;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "COST_DIGEST_CONFIG";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mail: MailConfig,

    #[serde(default)]
    pub query: QueryConfig,

    /// Backoff for transient engine errors (submit, poll, fetch).
    #[serde(default)]
    pub retry: BackoffPolicy,

    /// Backoff for mail throttling.
    #[serde(default = "default_notify_retry")]
    pub notify_retry: BackoffPolicy,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub recommendations: RecommendationsConfig,
}

/// Sender, recipients and message shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub sender: String,

    pub recipients: Vec<String>,

    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Attach the raw result set as CSV.
    #[serde(default = "default_true")]
    pub attach_csv: bool,
}

/// Poll cadence and the invocation deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// First wait between submission and the first status check.
    pub poll_interval_ms: u64,
    /// Floor for every poll wait, whatever the other settings say.
    pub min_poll_interval_ms: u64,
    /// Ceiling for the growing poll wait.
    pub max_poll_interval_ms: u64,
    /// Growth factor applied after each non-terminal poll.
    pub poll_multiplier: f64,
    /// Hard budget for one invocation, measured from its start.
    pub deadline_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            min_poll_interval_ms: 1_000,
            max_poll_interval_ms: 30_000,
            poll_multiplier: 1.5,
            deadline_secs: 840,
        }
    }
}

impl QueryConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Report shaping: columns, top-N, grading and conversions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub top_n: usize,
    /// Column holding the cost driver name (e.g. the service).
    pub label_column: String,
    /// Column holding the spend amount.
    pub amount_column: String,
    /// Further columns that must parse as numbers.
    pub numeric_columns: Vec<String>,
    pub currency: String,
    /// Ordered from the highest threshold down.
    pub grades: Vec<GradeBand>,
    /// Grade for scores not above any threshold.
    pub fallback_grade: String,
    pub conversions: Vec<UnitConversion>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            label_column: "service".to_string(),
            amount_column: "cost".to_string(),
            numeric_columns: Vec::new(),
            currency: "$".to_string(),
            grades: GradeBand::default_table(),
            fallback_grade: "C".to_string(),
            conversions: UnitConversion::default_set(),
        }
    }
}

impl MetricsConfig {
    /// Columns the decoder must parse as numbers (amount column first).
    pub fn required_numeric_columns(&self) -> Vec<String> {
        let mut cols = vec![self.amount_column.clone()];
        for col in &self.numeric_columns {
            if !cols.contains(col) {
                cols.push(col.clone());
            }
        }
        cols
    }
}

/// Scope passed to the recommendation source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationsConfig {
    /// Account or organization scope, source-specific.
    pub scope: Option<String>,
    pub region: Option<String>,
}

fn default_notify_retry() -> BackoffPolicy {
    BackoffPolicy {
        max_attempts: 3,
        base_delay_ms: 1_000,
        multiplier: 2.0,
        max_delay_ms: 8_000,
        jitter_pct: 0.2,
    }
}

fn default_subject_prefix() -> String {
    "Cloud Cost Report".to_string()
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Minimal valid config for a sender and recipient list.
    pub fn new(sender: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            mail: MailConfig {
                sender: sender.into(),
                recipients,
                subject_prefix: default_subject_prefix(),
                attach_csv: true,
            },
            query: QueryConfig::default(),
            retry: BackoffPolicy::default(),
            notify_retry: default_notify_retry(),
            metrics: MetricsConfig::default(),
            recommendations: RecommendationsConfig::default(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config path: explicit flag, then `COST_DIGEST_CONFIG`,
    /// then the XDG location.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Ok(path) = dotenvy::var(CONFIG_ENV)
            && !path.trim().is_empty()
        {
            return Ok(PathBuf::from(path));
        }
        Self::default_path()
    }

    /// Default location:
    /// - Primary: `$XDG_CONFIG_HOME/cost-digest/config.toml`
    /// - Fallback: platform-specific config dir
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config)
                .join("cost-digest")
                .join("config.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join("cost-digest").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_plausible_address(&self.mail.sender) {
            return Err(ConfigError::Validation(format!(
                "mail.sender is not an email address: '{}'",
                self.mail.sender
            )));
        }
        if self.mail.recipients.is_empty() {
            return Err(ConfigError::Validation(
                "mail.recipients cannot be empty".into(),
            ));
        }
        if let Some(bad) = self
            .mail
            .recipients
            .iter()
            .find(|r| !is_plausible_address(r))
        {
            return Err(ConfigError::Validation(format!(
                "mail.recipients contains an invalid address: '{bad}'"
            )));
        }

        let q = &self.query;
        if q.min_poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "query.min_poll_interval_ms must be positive".into(),
            ));
        }
        if q.max_poll_interval_ms < q.min_poll_interval_ms {
            return Err(ConfigError::Validation(
                "query.max_poll_interval_ms must be >= query.min_poll_interval_ms".into(),
            ));
        }
        if !q.poll_multiplier.is_finite() || q.poll_multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "query.poll_multiplier must be >= 1.0".into(),
            ));
        }
        if q.deadline_secs == 0 {
            return Err(ConfigError::Validation(
                "query.deadline_secs must be positive".into(),
            ));
        }

        for (section, policy) in [("retry", &self.retry), ("notify_retry", &self.notify_retry)] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Validation(format!(
                    "{section}.max_attempts must be at least 1"
                )));
            }
            if !(0.0..=1.0).contains(&policy.jitter_pct) {
                return Err(ConfigError::Validation(format!(
                    "{section}.jitter_pct must be within 0.0..=1.0"
                )));
            }
        }

        let m = &self.metrics;
        if m.top_n == 0 {
            return Err(ConfigError::Validation("metrics.top_n must be at least 1".into()));
        }
        if m.label_column.trim().is_empty() || m.amount_column.trim().is_empty() {
            return Err(ConfigError::Validation(
                "metrics.label_column and metrics.amount_column cannot be empty".into(),
            ));
        }
        crate::analytics::grade::validate_table(&m.grades).map_err(ConfigError::Validation)?;
        for conversion in &m.conversions {
            if !conversion.unit_price.is_finite() || conversion.unit_price <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "metrics.conversions '{}' needs a positive unit_price",
                    conversion.name
                )));
            }
        }

        Ok(())
    }
}

/// Cheap shape check; the mail service has the final word.
pub fn is_plausible_address(addr: &str) -> bool {
    let addr = addr.trim();
    match addr.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !addr.contains(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    }
}
