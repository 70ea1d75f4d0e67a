//! Jobs: fan out tests, fold their verdicts, debounce the result
//!
//! A job cycle spawns one task per test. Results are collected as they come
//! in; the first test reporting `NoData` ends the cycle immediately and the
//! remaining test tasks are aborted when the set holding them is dropped.
//! Otherwise the job's reference expression is evaluated over the results
//! and [`JobState::advance`] decides the next state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_INTERVAL;
use crate::expr::{EvalError, Evaluate, ReferenceExpression, TestResults};
use crate::http::RunError;

use super::{Alert, ExecContext, State, Test, TestOutcome};

/// Debounce thresholds, counted in cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// `0` skips `Pending` entirely
    pub pending_after: u32,
    pub alerting_after: u32,
    pub ok_after: u32,
}

impl Thresholds {
    /// Build thresholds, clamping each to its minimum
    pub fn new(pending_after: i64, alerting_after: i64, ok_after: i64) -> Self {
        fn clamp(value: i64, min: i64) -> u32 {
            value.clamp(min, i64::from(u32::MAX)) as u32
        }

        Self {
            pending_after: clamp(pending_after, 0),
            alerting_after: clamp(alerting_after, 1),
            ok_after: clamp(ok_after, 1),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(0, 1, 1)
    }
}

/// Runtime state of one job, owned by the job's task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobState {
    state: State,
    time_at_state: u32,
    /// Passing verdicts in a row, whatever the state did meanwhile
    passes: u32,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            state: State::NoData,
            time_at_state: 1,
            passes: 0,
        }
    }
}

impl JobState {
    pub fn state(&self) -> State {
        self.state
    }

    /// Cycles spent in the current state
    pub fn time_at_state(&self) -> u32 {
        self.time_at_state
    }

    /// Consecutive passing verdicts up to now
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Force `NoData`; the cycle that caused it doesn't count
    pub fn no_data(&mut self) -> State {
        self.state = State::NoData;
        self.time_at_state = 0;
        self.passes = 0;
        self.state
    }

    /// Advance by one cycle whose verdict was `ok`.
    ///
    /// Leaving a non-Ok state takes `ok_after` passing verdicts in a row, no
    /// matter how long the job has been in that state.
    pub fn advance(&mut self, ok: bool, thresholds: &Thresholds) -> State {
        self.passes = if ok { self.passes.saturating_add(1) } else { 0 };

        let next = match (self.state, ok) {
            (State::Ok, true) => State::Ok,
            (State::Alerting, false) => State::Alerting,
            (State::NoData | State::Pending | State::Alerting, true) => {
                if self.passes >= thresholds.ok_after {
                    State::Ok
                } else {
                    self.state
                }
            }
            (State::NoData | State::Ok, false) => {
                if thresholds.pending_after > 0 {
                    State::Pending
                } else if self.time_at_state >= thresholds.alerting_after {
                    State::Alerting
                } else {
                    self.state
                }
            }
            (State::Pending, false) => {
                if self.time_at_state >= thresholds.alerting_after {
                    State::Alerting
                } else {
                    State::Pending
                }
            }
        };

        if next == self.state {
            self.time_at_state = self.time_at_state.saturating_add(1);
        } else {
            self.state = next;
            self.time_at_state = 1;
        }
        next
    }
}

/// Result of one job cycle
#[derive(Debug)]
pub struct CycleOutcome {
    pub state: State,
    /// The aggregation error, kept even when the job ended up `Ok`
    pub error: Option<CycleError>,
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Test '{test}' has no data: {source}")]
    NoData {
        test: String,
        #[source]
        source: RunError,
    },

    #[error("Test task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Evaluation(#[from] EvalError),
}

/// A configured job. Immutable once built; runtime state lives in [`JobState`].
#[derive(Debug, Clone)]
pub struct Job {
    name: String,
    interval: Duration,
    thresholds: Thresholds,
    ok: ReferenceExpression,
    tests: BTreeMap<String, Arc<Test>>,
    alerters: Option<Vec<String>>,
    values: BTreeMap<String, String>,
}

impl Job {
    pub fn new(name: impl Into<String>, ok: ReferenceExpression) -> Self {
        Self {
            name: name.into(),
            interval: DEFAULT_INTERVAL,
            thresholds: Thresholds::default(),
            ok,
            tests: BTreeMap::new(),
            alerters: None,
            values: BTreeMap::new(),
        }
    }

    /// Set the time between cycles
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set debounce thresholds
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Add a test, keyed by its name
    pub fn with_test(mut self, test: Test) -> Self {
        self.tests.insert(test.name().to_string(), Arc::new(test));
        self
    }

    /// Notify these alerters instead of the default ones
    pub fn with_alerters(mut self, alerters: Vec<String>) -> Self {
        self.alerters = Some(alerters);
        self
    }

    /// Add a static value sent with every alert
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time between cycles
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn tests(&self) -> &BTreeMap<String, Arc<Test>> {
        &self.tests
    }

    pub fn alerters(&self) -> Option<&[String]> {
        self.alerters.as_deref()
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// The alert this job emits for `state`
    pub fn alert(&self, state: State) -> Alert {
        let alert = Alert::new(&self.name, state).with_values(self.values.clone());
        match &self.alerters {
            Some(alerters) => alert.with_alerters(alerters.clone()),
            None => alert,
        }
    }

    /// Run every test once, fold the results and advance `state`.
    pub async fn cycle(&self, ctx: &ExecContext, state: &mut JobState) -> CycleOutcome {
        let mut tasks = JoinSet::new();
        for (name, test) in &self.tests {
            let test = Arc::clone(test);
            let ctx = ctx.clone();
            let job = self.name.clone();
            let name = name.clone();

            tasks.spawn(async move {
                tracing::debug!(job = %job, test = %name, "Test starting");
                let outcome = test.run(&ctx).await;
                match outcome.reason() {
                    Some(reason) => tracing::info!(
                        job = %job,
                        test = %name,
                        state = %outcome.state(),
                        error = %reason,
                        "Test finished"
                    ),
                    None => tracing::info!(
                        job = %job,
                        test = %name,
                        state = %outcome.state(),
                        "Test finished"
                    ),
                }
                (name, outcome)
            });
        }

        let mut results = TestResults::with_capacity(self.tests.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, TestOutcome::NoData(source))) => {
                    return CycleOutcome {
                        state: state.no_data(),
                        error: Some(CycleError::NoData { test: name, source }),
                    };
                }
                Ok((name, outcome)) => {
                    results.insert(name, outcome.state() == State::Ok);
                }
                Err(e) => {
                    return CycleOutcome {
                        state: state.no_data(),
                        error: Some(CycleError::Task(e)),
                    };
                }
            }
        }

        let evaluation = self.ok.evaluate(&results);
        CycleOutcome {
            state: state.advance(evaluation.passed, &self.thresholds),
            error: evaluation.error.map(CycleError::Evaluation),
        }
    }

    /// Run cycles every `interval` until `token` is cancelled, sending one
    /// alert per cycle.
    pub async fn run(
        self: Arc<Self>,
        ctx: ExecContext,
        alerts: mpsc::Sender<Alert>,
        token: CancellationToken,
    ) {
        tracing::info!(job = %self.name, tests = self.tests.len(), "Loading job");
        let mut state = JobState::default();

        loop {
            tracing::debug!(job = %self.name, "Job starting");
            let previous = state.state();

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                outcome = self.cycle(&ctx, &mut state) => outcome,
            };

            match &outcome.error {
                Some(e) => tracing::info!(
                    job = %self.name,
                    state = %outcome.state,
                    error = %e,
                    "Job finished"
                ),
                None => tracing::info!(job = %self.name, state = %outcome.state, "Job finished"),
            }
            if outcome.state != previous {
                tracing::info!(
                    job = %self.name,
                    from = %previous,
                    to = %outcome.state,
                    "Job state changed"
                );
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                sent = alerts.send(self.alert(outcome.state)) => {
                    if sent.is_err() {
                        tracing::warn!(job = %self.name, "Alert channel closed");
                        break;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!(job = %self.name, "Job stopped");
    }
}
