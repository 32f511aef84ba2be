//! Invocation entry point: query, decode, merge, render, notify.
//!
//! Either a complete report is sent or nothing is. The only error absorbed
//! along the way is a failed recommendation fetch, which marks the report
//! partial instead of failing the run.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analytics::{BillingRecord, build_report};
use crate::clock::Clock;
use crate::config::{ConfigError, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::notify::{Mailer, Notifier, NotifyOutcome};
use crate::query::{PollSchedule, QueryEngine, QueryExecutor, QueryRequest, decode};
use crate::recommendations::{RecommendationFetcher, RecommendationSource};
use crate::render::{
    DocumentKind, RenderOptions, ReportDocument, csv_attachment, render_export, render_no_data,
    render_report,
};

/// What the scheduled trigger asks for.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Billing rows merged with recommendations into a graded report.
    #[default]
    CostReport,
    /// The raw result as a CSV attachment, no metrics.
    Export,
}

/// Trigger input for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub query: String,
    pub database: String,
    pub output_location: String,
    pub query_name: String,
    #[serde(default)]
    pub query_type: QueryType,
    /// Date shown in the subject and filename; today (UTC) when absent.
    #[serde(default)]
    pub report_date: Option<NaiveDate>,
}

impl Invocation {
    pub fn request(&self) -> QueryRequest {
        QueryRequest {
            sql: self.query.clone(),
            database: self.database.clone(),
            output_location: self.output_location.clone(),
            query_name: self.query_name.clone(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (field, value) in [
            ("query", &self.query),
            ("database", &self.database),
            ("query_name", &self.query_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "invocation field '{field}' cannot be empty"
                )));
            }
        }
        Ok(())
    }

    fn report_date(&self) -> NaiveDate {
        self.report_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Structured exit signal of one run, printed as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationOutcome {
    pub status: OutcomeStatus,
    pub message: String,
    /// Document kind on success, error kind on failure.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub partial: bool,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub retryable: bool,
    #[serde(skip)]
    pub exit_code: i32,
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    fn failure(err: &PipelineError, progress: Progress) -> Self {
        let execution_id = match err {
            PipelineError::QueryFailed { execution_id, .. } => Some(execution_id.clone()),
            _ => progress.execution_id,
        };
        Self {
            status: OutcomeStatus::Failure,
            message: err.to_string(),
            kind: err.kind().to_string(),
            execution_id,
            partial: progress.partial,
            rows: progress.rows,
            message_id: None,
            hint: err.hint().map(str::to_string),
            retryable: err.is_retryable(),
            exit_code: err.exit_code(),
        }
    }
}

/// Rendered document plus what it took to produce it; nothing sent yet.
#[derive(Debug, Clone)]
pub struct PreparedReport {
    pub document: ReportDocument,
    pub execution_id: String,
    pub rows: usize,
    pub partial: bool,
}

/// How far a run got; survives into the failure outcome.
#[derive(Debug, Clone, Default)]
struct Progress {
    execution_id: Option<String>,
    rows: usize,
    partial: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
    engine: Arc<dyn QueryEngine>,
    source: Arc<dyn RecommendationSource>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        engine: Arc<dyn QueryEngine>,
        source: Arc<dyn RecommendationSource>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            engine,
            source,
            mailer,
            clock,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole invocation and report how it ended.
    pub fn run(&self, invocation: &Invocation) -> InvocationOutcome {
        let started = self.clock.now();
        let mut progress = Progress::default();
        info!(
            component = "pipeline",
            operation = "run",
            query_name = invocation.query_name.as_str(),
            query_type = ?invocation.query_type,
            "Invocation started"
        );

        let outcome = match self.deliver(invocation, started, &mut progress) {
            Ok((prepared, message_id)) => InvocationOutcome {
                status: OutcomeStatus::Success,
                message: prepared.document.subject.clone(),
                kind: document_kind_name(prepared.document.kind).to_string(),
                execution_id: Some(prepared.execution_id),
                partial: prepared.partial,
                rows: prepared.rows,
                message_id: Some(message_id),
                hint: None,
                retryable: false,
                exit_code: 0,
            },
            Err(err) => {
                warn!(
                    component = "pipeline",
                    operation = "run",
                    kind = err.kind(),
                    error = %err,
                    "Invocation failed; no report sent"
                );
                InvocationOutcome::failure(&err, progress)
            }
        };

        info!(
            component = "pipeline",
            operation = "run",
            status = ?outcome.status,
            kind = outcome.kind.as_str(),
            rows = outcome.rows,
            partial = outcome.partial,
            duration_ms = self.clock.now().duration_since(started).as_millis() as u64,
            "Invocation finished"
        );
        outcome
    }

    /// Query and render without sending.
    pub fn prepare(&self, invocation: &Invocation) -> Result<PreparedReport> {
        let started = self.clock.now();
        self.prepare_inner(invocation, started, &mut Progress::default())
    }

    fn deliver(
        &self,
        invocation: &Invocation,
        started: Instant,
        progress: &mut Progress,
    ) -> Result<(PreparedReport, String)> {
        let prepared = self.prepare_inner(invocation, started, progress)?;
        let deadline = started + self.config.query.deadline();
        let notifier = Notifier::new(
            Arc::clone(&self.mailer),
            Arc::clone(&self.clock),
            self.config.notify_retry.clone(),
            self.config.mail.sender.clone(),
        );
        match notifier.send(
            prepared.document.clone(),
            &self.config.mail.recipients,
            deadline,
        ) {
            NotifyOutcome::Sent { message_id, .. } => Ok((prepared, message_id)),
            NotifyOutcome::Rejected { reason } => Err(PipelineError::NotificationRejected(reason)),
            NotifyOutcome::TransientFailure { attempts, reason } => Err(PipelineError::TransientIo {
                operation: "send_email",
                attempts,
                message: reason,
            }),
        }
    }

    fn prepare_inner(
        &self,
        invocation: &Invocation,
        started: Instant,
        progress: &mut Progress,
    ) -> Result<PreparedReport> {
        invocation.validate()?;
        let deadline = started + self.config.query.deadline();
        let executor = QueryExecutor::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.clock),
            PollSchedule::from(&self.config.query),
            self.config.retry.clone(),
        );
        let completed = executor.submit_and_wait(&invocation.request(), deadline)?;
        let execution_id = completed.execution.execution_id.clone();
        progress.execution_id = Some(execution_id.clone());

        let options = RenderOptions::new(
            invocation.query_name.clone(),
            invocation.report_date(),
            self.config.mail.subject_prefix.clone(),
        );

        let document = match invocation.query_type {
            QueryType::CostReport => self.cost_report(&completed.result_set, &options, progress)?,
            QueryType::Export => {
                let table = decode(&completed.result_set, &[])?;
                progress.rows = table.records().len();
                let raw = table.to_result_set();
                render_export(&raw, &options).with_attachment(csv_attachment(&raw, &options))
            }
        };

        Ok(PreparedReport {
            document,
            execution_id,
            rows: progress.rows,
            partial: progress.partial,
        })
    }

    fn cost_report(
        &self,
        result_set: &crate::query::ResultSet,
        options: &RenderOptions,
        progress: &mut Progress,
    ) -> Result<ReportDocument> {
        let metrics = &self.config.metrics;
        let table = decode(result_set, &metrics.required_numeric_columns())?;
        progress.rows = table.records().len();
        if table.is_empty() {
            info!(
                component = "pipeline",
                query_name = options.query_name.as_str(),
                "Query returned no billing rows"
            );
            return Ok(render_no_data(options, false));
        }

        let billing = BillingRecord::from_table(&table, &metrics.label_column, &metrics.amount_column)?;
        let fetched = RecommendationFetcher::new(Arc::clone(&self.source)).fetch(&self.config.recommendations);
        if let Some(reason) = &fetched.degraded {
            let absorbed = PipelineError::DegradedFetch(reason.clone());
            warn!(
                component = "pipeline",
                kind = absorbed.kind(),
                error = %absorbed,
                "Continuing with a partial report"
            );
        }
        progress.partial = fetched.is_partial();

        let report = build_report(&billing, &fetched.recommendations, metrics, progress.partial);
        let document = render_report(&report, options);
        if self.config.mail.attach_csv {
            Ok(document.with_attachment(csv_attachment(&table.to_result_set(), options)))
        } else {
            Ok(document)
        }
    }
}

fn document_kind_name(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Report => "report",
        DocumentKind::NoData => "no_data",
        DocumentKind::Export => "export",
    }
}
