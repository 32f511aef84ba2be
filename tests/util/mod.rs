//! Shared fakes and helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::NaiveDate;
use cost_digest::analytics::{Recommendation, UnitConversion};
use cost_digest::clock::ManualClock;
use cost_digest::config::{PipelineConfig, RecommendationsConfig};
use cost_digest::notify::{DeliveryReceipt, EmailMessage, Mailer, MailerError};
use cost_digest::pipeline::{Invocation, Pipeline, QueryType};
use cost_digest::query::{
    EngineError, QueryEngine, QueryRequest, QueryState, ResultPage, ResultRow, StatusReport,
};
use cost_digest::recommendations::{RecommendationSource, SourceError, StaticRecommendationSource};
use parking_lot::Mutex;

pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }

    pub fn remove(key: &str) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::remove_var(key) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn rows(data: &[&[&str]]) -> Vec<ResultRow> {
    data.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

pub fn invocation(query_type: QueryType) -> Invocation {
    Invocation {
        query: "SELECT service, cost FROM billing".into(),
        database: "cur".into(),
        output_location: "s3://results/".into(),
        query_name: "monthly_costs".into(),
        query_type,
        report_date: NaiveDate::from_ymd_opt(2026, 3, 1),
    }
}

/// Deterministic config: no jitter, one coffee-cup conversion.
pub fn config() -> PipelineConfig {
    let mut config = PipelineConfig::new(
        "reports@example.com",
        vec!["finops@example.com".to_string()],
    );
    config.retry.jitter_pct = 0.0;
    config.notify_retry.jitter_pct = 0.0;
    config.metrics.conversions = vec![UnitConversion::new("coffee cups", 5.0)];
    config
}

// =============================================================================
// Scripted engine
// =============================================================================

pub struct ScriptedEngine {
    execution_id: String,
    submit_results: Mutex<VecDeque<Result<String, EngineError>>>,
    statuses: Mutex<VecDeque<Result<StatusReport, EngineError>>>,
    /// Reported once the status script runs out.
    settled: StatusReport,
    pages: Vec<ResultPage>,
    status_calls: Mutex<u32>,
    result_calls: Mutex<u32>,
}

impl ScriptedEngine {
    /// Reports `states` in order, then keeps repeating the last one.
    pub fn new(states: &[QueryState], pages: Vec<Vec<ResultRow>>) -> Self {
        let page_count = pages.len();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(idx, rows)| ResultPage {
                rows,
                next_token: (idx + 1 < page_count).then(|| format!("token-{}", idx + 1)),
            })
            .collect();
        let settled = states
            .last()
            .copied()
            .map(StatusReport::new)
            .unwrap_or_else(|| StatusReport::new(QueryState::Succeeded));
        Self {
            execution_id: "exec-1".into(),
            submit_results: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(states.iter().copied().map(StatusReport::new).map(Ok).collect()),
            settled,
            pages,
            status_calls: Mutex::new(0),
            result_calls: Mutex::new(0),
        }
    }

    pub fn succeeding(pages: Vec<Vec<ResultRow>>) -> Self {
        Self::new(&[QueryState::Succeeded], pages)
    }

    pub fn failing(reason: &str) -> Self {
        let mut engine = Self::new(&[QueryState::Running], Vec::new());
        let failed = StatusReport::with_reason(QueryState::Failed, reason);
        engine.statuses.get_mut().push_back(Ok(failed.clone()));
        engine.settled = failed;
        engine
    }

    pub fn with_submit_results(self, results: Vec<Result<String, EngineError>>) -> Self {
        *self.submit_results.lock() = results.into();
        self
    }

    pub fn with_status_results(self, results: Vec<Result<StatusReport, EngineError>>) -> Self {
        *self.statuses.lock() = results.into();
        self
    }

    pub fn status_calls(&self) -> u32 {
        *self.status_calls.lock()
    }

    pub fn result_calls(&self) -> u32 {
        *self.result_calls.lock()
    }
}

impl QueryEngine for ScriptedEngine {
    fn id(&self) -> &str {
        "scripted"
    }

    fn submit(&self, _request: &QueryRequest) -> Result<String, EngineError> {
        self.submit_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.execution_id.clone()))
    }

    fn status(&self, _execution_id: &str) -> Result<StatusReport, EngineError> {
        *self.status_calls.lock() += 1;
        self.statuses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.settled.clone()))
    }

    fn results(
        &self,
        _execution_id: &str,
        page_token: Option<&str>,
    ) -> Result<ResultPage, EngineError> {
        *self.result_calls.lock() += 1;
        let idx = match page_token {
            None => 0,
            Some(token) => token
                .trim_start_matches("token-")
                .parse::<usize>()
                .map_err(|_| EngineError::Rejected(format!("bad token {token}")))?,
        };
        Ok(self.pages.get(idx).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Recording mailer
// =============================================================================

#[derive(Default)]
pub struct RecordingMailer {
    script: Mutex<VecDeque<Result<DeliveryReceipt, MailerError>>>,
    sent: Mutex<Vec<EmailMessage>>,
    calls: Mutex<u32>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(results: Vec<Result<DeliveryReceipt, MailerError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

impl Mailer for RecordingMailer {
    fn id(&self) -> &str {
        "recording"
    }

    fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt, MailerError> {
        let call = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };
        let result = self.script.lock().pop_front().unwrap_or_else(|| {
            Ok(DeliveryReceipt {
                message_id: format!("msg-{call}"),
            })
        });
        if result.is_ok() {
            self.sent.lock().push(message.clone());
        }
        result
    }
}

// =============================================================================
// Recommendation sources
// =============================================================================

pub struct FailingSource {
    calls: Mutex<u32>,
}

impl FailingSource {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

impl RecommendationSource for FailingSource {
    fn id(&self) -> &str {
        "failing"
    }

    fn list_recommendations(
        &self,
        _scope: &RecommendationsConfig,
    ) -> Result<Vec<Recommendation>, SourceError> {
        *self.calls.lock() += 1;
        Err(SourceError::AccessDenied(
            "not authorized to perform: ce:GetRightsizingRecommendation".into(),
        ))
    }
}

pub fn static_source(recs: Vec<Recommendation>) -> Arc<StaticRecommendationSource> {
    Arc::new(StaticRecommendationSource::new(recs))
}

/// Everything a scenario needs to inspect after running.
pub struct Harness {
    pub engine: Arc<ScriptedEngine>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(
        config: PipelineConfig,
        engine: ScriptedEngine,
        source: Arc<dyn RecommendationSource>,
        mailer: RecordingMailer,
    ) -> Self {
        let engine = Arc::new(engine);
        let mailer = Arc::new(mailer);
        let clock = Arc::new(ManualClock::new());
        let pipeline = Pipeline::new(
            config,
            engine.clone(),
            source,
            mailer.clone(),
            clock.clone(),
        );
        Self {
            engine,
            mailer,
            clock,
            pipeline,
        }
    }
}
