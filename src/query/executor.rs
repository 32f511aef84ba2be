//! Submit/poll/fetch state machine.
//!
//! The executor owns one [`QueryExecution`] per call. Status checks are
//! strictly sequential, every wait goes through the injected [`Clock`], and no
//! wait is shorter than the configured poll floor. When a wait would end at or
//! past the deadline the executor gives up without cancelling the remote query.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::decode::DecodeError;
use super::engine::{EngineError, QueryEngine};
use super::{QueryExecution, QueryRequest, QueryState, ResultRow, ResultSet};
use crate::clock::Clock;
use crate::config::QueryConfig;
use crate::error::{PipelineError, Result};
use crate::retry::{BackoffPolicy, RetryError, retry_with_floor};

/// Poll cadence: starts at `initial`, grows by `multiplier`, stays within
/// `[floor, ceiling]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    pub initial: Duration,
    pub floor: Duration,
    pub ceiling: Duration,
    pub multiplier: f64,
}

impl PollSchedule {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            floor: interval,
            ceiling: interval,
            multiplier: 1.0,
        }
    }

    pub fn first(&self) -> Duration {
        self.clamp(self.initial)
    }

    pub fn next(&self, current: Duration) -> Duration {
        self.clamp(current.mul_f64(self.multiplier.max(1.0)))
    }

    fn clamp(&self, d: Duration) -> Duration {
        let ceiling = self.ceiling.max(self.floor);
        d.max(self.floor).min(ceiling)
    }
}

impl From<&QueryConfig> for PollSchedule {
    fn from(cfg: &QueryConfig) -> Self {
        Self {
            initial: Duration::from_millis(cfg.poll_interval_ms),
            floor: Duration::from_millis(cfg.min_poll_interval_ms),
            ceiling: Duration::from_millis(cfg.max_poll_interval_ms),
            multiplier: cfg.poll_multiplier,
        }
    }
}

/// A succeeded query with its full result set.
#[derive(Debug, Clone)]
pub struct CompletedQuery {
    pub execution: QueryExecution,
    pub result_set: ResultSet,
    pub pages: usize,
}

#[derive(Debug)]
enum Phase {
    Wait(Duration),
    Poll(Duration),
    Fetch(Option<String>),
}

pub struct QueryExecutor {
    engine: Arc<dyn QueryEngine>,
    clock: Arc<dyn Clock>,
    schedule: PollSchedule,
    retry: BackoffPolicy,
}

impl QueryExecutor {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        clock: Arc<dyn Clock>,
        schedule: PollSchedule,
        retry: BackoffPolicy,
    ) -> Self {
        Self {
            engine,
            clock,
            schedule,
            retry,
        }
    }

    /// Run `request` to completion or until `deadline`.
    pub fn submit_and_wait(&self, request: &QueryRequest, deadline: Instant) -> Result<CompletedQuery> {
        let mut execution = self.submit(request, deadline)?;
        let mut rows: Vec<ResultRow> = Vec::new();
        let mut pages = 0usize;
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut phase = Phase::Wait(self.schedule.first());

        loop {
            phase = match phase {
                Phase::Wait(interval) => {
                    if self.clock.now() + interval >= deadline {
                        warn!(
                            component = "executor",
                            execution_id = execution.execution_id.as_str(),
                            state = %execution.state,
                            status_checks = execution.status_checks,
                            "Deadline reached while waiting for query"
                        );
                        return Err(PipelineError::DeadlineExceeded(format!(
                            "waiting for query {} (last state {} after {} status checks)",
                            execution.execution_id, execution.state, execution.status_checks
                        )));
                    }
                    self.clock.sleep(interval);
                    Phase::Poll(interval)
                }
                Phase::Poll(interval) => {
                    let report = self
                        .with_retry("poll", deadline, self.schedule.floor, |_| {
                            self.engine.status(&execution.execution_id)
                        })
                        .map_err(|err| Self::engine_failure("poll", &execution, err))?;
                    execution.observe(report);
                    debug!(
                        component = "executor",
                        operation = "poll",
                        execution_id = execution.execution_id.as_str(),
                        state = %execution.state,
                        status_checks = execution.status_checks,
                        "Status checked"
                    );
                    match execution.state {
                        QueryState::Succeeded => Phase::Fetch(None),
                        QueryState::Failed | QueryState::Cancelled => {
                            let reason = execution
                                .reason
                                .clone()
                                .unwrap_or_else(|| "no reason given by engine".to_string());
                            warn!(
                                component = "executor",
                                execution_id = execution.execution_id.as_str(),
                                state = %execution.state,
                                reason = reason.as_str(),
                                "Query ended unsuccessfully"
                            );
                            return Err(PipelineError::QueryFailed {
                                execution_id: execution.execution_id,
                                state: execution.state,
                                reason,
                            });
                        }
                        QueryState::Submitted | QueryState::Running => {
                            Phase::Wait(self.schedule.next(interval))
                        }
                    }
                }
                Phase::Fetch(token) => {
                    if self.clock.now() >= deadline {
                        warn!(
                            component = "executor",
                            execution_id = execution.execution_id.as_str(),
                            pages,
                            "Deadline reached while fetching results"
                        );
                        return Err(PipelineError::DeadlineExceeded(format!(
                            "fetching results for query {} ({pages} pages read)",
                            execution.execution_id
                        )));
                    }
                    let page = self
                        .with_retry("fetch", deadline, Duration::ZERO, |_| {
                            self.engine.results(&execution.execution_id, token.as_deref())
                        })
                        .map_err(|err| Self::engine_failure("fetch", &execution, err))?;
                    pages += 1;
                    rows.extend(page.rows);
                    match page.next_token {
                        Some(next) if !seen_tokens.insert(next.clone()) => {
                            return Err(DecodeError::PaginationLoop(next).into());
                        }
                        Some(next) => Phase::Fetch(Some(next)),
                        None => break,
                    }
                }
            };
        }

        let result_set = ResultSet::new(rows);
        info!(
            component = "executor",
            operation = "fetch_complete",
            execution_id = execution.execution_id.as_str(),
            status_checks = execution.status_checks,
            pages,
            data_rows = result_set.data_row_count(),
            duration_ms = (self.clock.now() - execution.started_at).as_millis() as u64,
            "Query results fetched"
        );
        Ok(CompletedQuery {
            execution,
            result_set,
            pages,
        })
    }

    /// Submission is the only place the execution state is set locally.
    fn submit(&self, request: &QueryRequest, deadline: Instant) -> Result<QueryExecution> {
        if self.clock.now() >= deadline {
            return Err(PipelineError::DeadlineExceeded(
                "submitting the query".into(),
            ));
        }
        let execution_id = self
            .with_retry("submit", deadline, Duration::ZERO, |_| self.engine.submit(request))
            .map_err(Self::submit_failure)?;
        info!(
            component = "executor",
            operation = "submit",
            engine = self.engine.id(),
            query_name = request.query_name.as_str(),
            database = request.database.as_str(),
            execution_id = execution_id.as_str(),
            "Query submitted"
        );
        Ok(QueryExecution::submitted(execution_id, self.clock.now()))
    }

    /// Status checks pass the poll floor so a retried check never comes
    /// sooner than a scheduled one would.
    fn with_retry<T, F>(
        &self,
        operation: &str,
        deadline: Instant,
        floor: Duration,
        op: F,
    ) -> std::result::Result<T, RetryError<EngineError>>
    where
        F: FnMut(u32) -> std::result::Result<T, EngineError>,
    {
        retry_with_floor(&self.retry, self.clock.as_ref(), deadline, operation, floor, op)
    }

    fn submit_failure(err: RetryError<EngineError>) -> PipelineError {
        match err {
            RetryError::Fatal { error, .. } => PipelineError::QueryFailed {
                execution_id: "(not submitted)".to_string(),
                state: QueryState::Failed,
                reason: error.to_string(),
            },
            RetryError::Exhausted { error, attempts } => PipelineError::TransientIo {
                operation: "submit",
                attempts,
                message: error.to_string(),
            },
            RetryError::Deadline { error, .. } => {
                PipelineError::DeadlineExceeded(format!("retrying submit ({error})"))
            }
        }
    }

    fn engine_failure(
        operation: &'static str,
        exec: &QueryExecution,
        err: RetryError<EngineError>,
    ) -> PipelineError {
        match err {
            // A refused poll or fetch is reported as FAILED, not the last polled state.
            RetryError::Fatal { error, .. } => PipelineError::QueryFailed {
                execution_id: exec.execution_id.clone(),
                state: QueryState::Failed,
                reason: format!("engine error during {operation}: {error}"),
            },
            RetryError::Exhausted { error, attempts } => PipelineError::TransientIo {
                operation,
                attempts,
                message: error.to_string(),
            },
            RetryError::Deadline { error, .. } => PipelineError::DeadlineExceeded(format!(
                "retrying {operation} for query {} ({error})",
                exec.execution_id
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::query::engine::{ResultPage, StatusReport};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedEngine {
        statuses: Mutex<VecDeque<std::result::Result<StatusReport, EngineError>>>,
        pages: Mutex<VecDeque<ResultPage>>,
        status_calls: Mutex<u32>,
        tokens_seen: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedEngine {
        fn new(
            statuses: Vec<std::result::Result<StatusReport, EngineError>>,
            pages: Vec<ResultPage>,
        ) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                pages: Mutex::new(pages.into()),
                status_calls: Mutex::new(0),
                tokens_seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl QueryEngine for ScriptedEngine {
        fn id(&self) -> &str {
            "scripted"
        }

        fn submit(&self, _request: &QueryRequest) -> std::result::Result<String, EngineError> {
            Ok("exec-42".to_string())
        }

        fn status(&self, _execution_id: &str) -> std::result::Result<StatusReport, EngineError> {
            *self.status_calls.lock() += 1;
            self.statuses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(StatusReport::new(QueryState::Running)))
        }

        fn results(
            &self,
            _execution_id: &str,
            page_token: Option<&str>,
        ) -> std::result::Result<ResultPage, EngineError> {
            self.tokens_seen.lock().push(page_token.map(str::to_string));
            Ok(self.pages.lock().pop_front().unwrap_or_default())
        }
    }

    fn request() -> QueryRequest {
        QueryRequest {
            sql: "SELECT service, cost FROM billing".into(),
            database: "cur".into(),
            output_location: "s3://results/".into(),
            query_name: "monthly".into(),
        }
    }

    fn row(cells: &[&str]) -> ResultRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn fast_retry() -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            multiplier: 2.0,
            max_delay_ms: 100,
            jitter_pct: 0.0,
        }
    }

    fn executor(engine: Arc<ScriptedEngine>, clock: Arc<ManualClock>) -> QueryExecutor {
        QueryExecutor::new(
            engine,
            clock,
            PollSchedule::fixed(Duration::from_secs(1)),
            fast_retry(),
        )
    }

    #[test]
    fn schedule_grows_within_bounds() {
        let schedule = PollSchedule {
            initial: Duration::from_millis(100),
            floor: Duration::from_millis(500),
            ceiling: Duration::from_secs(2),
            multiplier: 2.0,
        };
        assert_eq!(schedule.first(), Duration::from_millis(500));
        assert_eq!(schedule.next(Duration::from_millis(500)), Duration::from_secs(1));
        assert_eq!(schedule.next(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(schedule.next(Duration::from_secs(2)), Duration::from_secs(2));
    }

    #[test]
    fn paginated_results_are_concatenated_in_order() {
        let engine = Arc::new(ScriptedEngine::new(
            vec![Ok(StatusReport::new(QueryState::Succeeded))],
            vec![
                ResultPage {
                    rows: vec![row(&["service", "cost"]), row(&["EC2", "1000"])],
                    next_token: Some("p2".into()),
                },
                ResultPage {
                    rows: vec![row(&["S3", "200"])],
                    next_token: Some("p3".into()),
                },
                ResultPage {
                    rows: vec![row(&["RDS", "50"])],
                    next_token: None,
                },
            ],
        ));
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(60);
        let done = executor(engine.clone(), clock)
            .submit_and_wait(&request(), deadline)
            .unwrap();
        assert_eq!(done.pages, 3);
        assert_eq!(done.result_set.rows().len(), 4);
        assert_eq!(done.result_set.data_rows()[2], row(&["RDS", "50"]));
        assert_eq!(
            *engine.tokens_seen.lock(),
            vec![None, Some("p2".to_string()), Some("p3".to_string())]
        );
    }

    #[test]
    fn cancelled_query_surfaces_reason() {
        let engine = Arc::new(ScriptedEngine::new(
            vec![
                Ok(StatusReport::new(QueryState::Running)),
                Ok(StatusReport::with_reason(
                    QueryState::Cancelled,
                    "Query cancelled by user",
                )),
            ],
            vec![],
        ));
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(60);
        let err = executor(engine, clock)
            .submit_and_wait(&request(), deadline)
            .unwrap_err();
        match err {
            PipelineError::QueryFailed {
                execution_id,
                state,
                reason,
            } => {
                assert_eq!(execution_id, "exec-42");
                assert_eq!(state, QueryState::Cancelled);
                assert_eq!(reason, "Query cancelled by user");
            }
            other => panic!("expected QueryFailed, got {other:?}"),
        }
    }

    #[test]
    fn transient_poll_errors_are_retried() {
        let engine = Arc::new(ScriptedEngine::new(
            vec![
                Err(EngineError::Transient("connection reset".into())),
                Ok(StatusReport::new(QueryState::Succeeded)),
            ],
            vec![ResultPage {
                rows: vec![row(&["service", "cost"])],
                next_token: None,
            }],
        ));
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(60);
        let done = executor(engine.clone(), clock.clone())
            .submit_and_wait(&request(), deadline)
            .unwrap();
        assert_eq!(*engine.status_calls.lock(), 2);
        // One logical status check succeeded.
        assert_eq!(done.execution.status_checks, 1);
        // The 10ms backoff is raised to the 1s poll floor.
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(1)]
        );
    }

    #[test]
    fn retried_status_check_respects_poll_floor() {
        let engine = Arc::new(ScriptedEngine::new(
            vec![
                Err(EngineError::Throttled {
                    message: "rate exceeded".into(),
                    retry_after: Some(Duration::from_millis(50)),
                }),
                Err(EngineError::Transient("connection reset".into())),
                Ok(StatusReport::new(QueryState::Succeeded)),
            ],
            vec![ResultPage {
                rows: vec![row(&["service", "cost"])],
                next_token: None,
            }],
        ));
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(60);
        let config = QueryConfig::default();
        let retry = BackoffPolicy {
            jitter_pct: 0.0,
            ..BackoffPolicy::default()
        };
        QueryExecutor::new(engine.clone(), clock.clone(), PollSchedule::from(&config), retry)
            .submit_and_wait(&request(), deadline)
            .unwrap();

        assert_eq!(*engine.status_calls.lock(), 3);
        let floor = Duration::from_millis(config.min_poll_interval_ms);
        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 3);
        // Every sleep separates two status checks (or submit and the first).
        for gap in &sleeps {
            assert!(*gap >= floor, "status checks {gap:?} apart, floor {floor:?}");
        }
    }

    #[test]
    fn unknown_execution_is_reported_as_failed() {
        let engine = Arc::new(ScriptedEngine::new(
            vec![
                Ok(StatusReport::new(QueryState::Running)),
                Err(EngineError::UnknownExecution("exec-42".into())),
            ],
            vec![],
        ));
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(60);
        let err = executor(engine, clock)
            .submit_and_wait(&request(), deadline)
            .unwrap_err();
        match err {
            PipelineError::QueryFailed { state, reason, .. } => {
                assert_eq!(state, QueryState::Failed);
                assert!(reason.contains("engine error during poll"), "{reason}");
                assert!(reason.contains("unknown execution id"), "{reason}");
            }
            other => panic!("expected QueryFailed, got {other:?}"),
        }
    }

    #[test]
    fn exhausted_throttling_is_transient_io() {
        let throttled = || {
            Err(EngineError::Throttled {
                message: "rate exceeded".into(),
                retry_after: None,
            })
        };
        let engine = Arc::new(ScriptedEngine::new(
            vec![throttled(), throttled(), throttled()],
            vec![],
        ));
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(60);
        let err = executor(engine, clock)
            .submit_and_wait(&request(), deadline)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TransientIo {
                operation: "poll",
                attempts: 3,
                ..
            }
        ));
    }

    #[test]
    fn deadline_stops_polling_without_sleeping_past_it() {
        let engine = Arc::new(ScriptedEngine::new(vec![], vec![]));
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_millis(3_500);
        let err = executor(engine.clone(), clock.clone())
            .submit_and_wait(&request(), deadline)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DeadlineExceeded(_)));
        assert_eq!(*engine.status_calls.lock(), 3);
        assert!(clock.elapsed() < Duration::from_millis(3_500));
    }

    #[test]
    fn repeated_page_token_is_a_decode_error() {
        let engine = Arc::new(ScriptedEngine::new(
            vec![Ok(StatusReport::new(QueryState::Succeeded))],
            vec![
                ResultPage {
                    rows: vec![row(&["service", "cost"])],
                    next_token: Some("same".into()),
                },
                ResultPage {
                    rows: vec![row(&["EC2", "1"])],
                    next_token: Some("same".into()),
                },
            ],
        ));
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(60);
        let err = executor(engine, clock)
            .submit_and_wait(&request(), deadline)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Decode(DecodeError::PaginationLoop(_))
        ));
    }

    #[test]
    fn page_token_cycle_is_a_decode_error() {
        let page = |cells: &[&str], next: &str| ResultPage {
            rows: vec![row(cells)],
            next_token: Some(next.to_string()),
        };
        let engine = Arc::new(ScriptedEngine::new(
            vec![Ok(StatusReport::new(QueryState::Succeeded))],
            vec![
                page(&["service", "cost"], "A"),
                page(&["EC2", "1"], "B"),
                page(&["S3", "2"], "A"),
                page(&["RDS", "3"], "B"),
            ],
        ));
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(600);
        let err = executor(engine.clone(), clock)
            .submit_and_wait(&request(), deadline)
            .unwrap_err();
        match err {
            PipelineError::Decode(DecodeError::PaginationLoop(token)) => assert_eq!(token, "A"),
            other => panic!("expected PaginationLoop, got {other:?}"),
        }
        assert_eq!(
            *engine.tokens_seen.lock(),
            vec![None, Some("A".to_string()), Some("B".to_string())]
        );
    }

    /// Succeeds at once, then hands out fresh page tokens forever, each page
    /// costing `page_cost` of simulated time.
    struct EndlessPager {
        clock: Arc<ManualClock>,
        page_cost: Duration,
        fetches: Mutex<u32>,
    }

    impl QueryEngine for EndlessPager {
        fn id(&self) -> &str {
            "endless"
        }

        fn submit(&self, _request: &QueryRequest) -> std::result::Result<String, EngineError> {
            Ok("exec-7".to_string())
        }

        fn status(&self, _execution_id: &str) -> std::result::Result<StatusReport, EngineError> {
            Ok(StatusReport::new(QueryState::Succeeded))
        }

        fn results(
            &self,
            _execution_id: &str,
            _page_token: Option<&str>,
        ) -> std::result::Result<ResultPage, EngineError> {
            let n = {
                let mut fetches = self.fetches.lock();
                *fetches += 1;
                *fetches
            };
            self.clock.advance(self.page_cost);
            Ok(ResultPage {
                rows: vec![row(&["row", n.to_string().as_str()])],
                next_token: Some(format!("page-{n}")),
            })
        }
    }

    #[test]
    fn deadline_bounds_result_fetching() {
        let clock = Arc::new(ManualClock::new());
        let engine = Arc::new(EndlessPager {
            clock: clock.clone(),
            page_cost: Duration::from_secs(10),
            fetches: Mutex::new(0),
        });
        let deadline = clock.now() + Duration::from_secs(60);
        let err = QueryExecutor::new(
            engine.clone(),
            clock.clone(),
            PollSchedule::fixed(Duration::from_secs(1)),
            fast_retry(),
        )
        .submit_and_wait(&request(), deadline)
        .unwrap_err();

        assert!(matches!(err, PipelineError::DeadlineExceeded(_)), "{err:?}");
        // Fetches start at 1s, 11s, ..., 51s; the one due at 61s is never made.
        assert_eq!(*engine.fetches.lock(), 6);
    }
}
