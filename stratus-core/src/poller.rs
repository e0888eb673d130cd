//! Status Poller - Wait for asynchronous operations to reach a terminal state
//!
//! Mutating calls against the management API (create, start, restart, delete,
//! deploy, ...) return an operation handle: a job ID, an order ID, or the
//! resource's own ID. The poller repeatedly runs a caller-supplied status check
//! for that handle until the check classifies the operation as completed or
//! failed, the overall timeout elapses, or the wait is cancelled.
//!
//! The poller knows nothing about endpoints or status vocabularies. Call sites
//! either classify each response themselves ([`StatusPoller::wait`]) or hand
//! over a raw state label and a [`StatusLabels`] table
//! ([`StatusPoller::wait_for_state`]).

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Boxed error returned by status checks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of a single status check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not terminal yet; poll again after the interval
    Pending,
    /// Target state reached
    Completed,
    /// Terminal failure reported by the server
    Failed,
}

/// Result of one status check
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    /// Response payload of the check
    pub payload: T,
    pub outcome: PollOutcome,
    /// State label reported by the server (e.g. "5", "running")
    pub state: String,
    /// Server-supplied failure detail (error code, message, offending IDs)
    pub detail: Option<String>,
}

impl<T> Observation<T> {
    pub fn pending(payload: T, state: impl Into<String>) -> Self {
        Self {
            payload,
            outcome: PollOutcome::Pending,
            state: state.into(),
            detail: None,
        }
    }

    pub fn completed(payload: T, state: impl Into<String>) -> Self {
        Self {
            payload,
            outcome: PollOutcome::Completed,
            state: state.into(),
            detail: None,
        }
    }

    pub fn failed(payload: T, state: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            payload,
            outcome: PollOutcome::Failed,
            state: state.into(),
            detail: Some(detail.into()),
        }
    }

    /// Classify a raw state label through a label table
    pub fn classified(payload: T, state: impl Into<String>, labels: &StatusLabels) -> Self {
        let state = state.into();
        let outcome = labels.classify(&state);
        Self {
            payload,
            outcome,
            state,
            detail: None,
        }
    }
}

/// What to do with a state label that is in none of the configured lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownState {
    /// Keep polling. Tolerates undocumented intermediate states.
    #[default]
    Pending,
    /// Treat as a terminal failure. For call sites with a closed set of states.
    Fail,
}

/// Pending/target/failure label table for state-label based call sites
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLabels {
    pending: Vec<String>,
    target: Vec<String>,
    failure: Vec<String>,
    unknown: UnknownState,
}

fn labels<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

impl StatusLabels {
    /// Create a table whose target states are `target`
    pub fn new<I, S>(target: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: labels(target),
            ..Default::default()
        }
    }

    pub fn with_pending<I, S>(mut self, pending: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending = labels(pending);
        self
    }

    pub fn with_failure<I, S>(mut self, failure: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failure = labels(failure);
        self
    }

    pub fn with_unknown(mut self, unknown: UnknownState) -> Self {
        self.unknown = unknown;
        self
    }

    /// Check that the table has targets and that no label sits in two lists
    pub fn validate(&self) -> Result<(), PollError> {
        if self.target.is_empty() {
            return Err(PollError::InvalidConfig(
                "at least one target state is required".to_string(),
            ));
        }

        let lists = [
            ("pending", &self.pending),
            ("target", &self.target),
            ("failure", &self.failure),
        ];
        for (i, (name_a, a)) in lists.iter().enumerate() {
            for (name_b, b) in &lists[i + 1..] {
                if let Some(shared) = a.iter().find(|label| b.contains(label)) {
                    return Err(PollError::InvalidConfig(format!(
                        "state '{}' is listed as both {} and {}",
                        shared, name_a, name_b
                    )));
                }
            }
        }
        Ok(())
    }

    /// Map a state label to an outcome. Total over all labels.
    pub fn classify(&self, state: &str) -> PollOutcome {
        if self.target.iter().any(|s| s == state) {
            PollOutcome::Completed
        } else if self.failure.iter().any(|s| s == state) {
            PollOutcome::Failed
        } else if self.pending.iter().any(|s| s == state) {
            PollOutcome::Pending
        } else {
            match self.unknown {
                UnknownState::Pending => PollOutcome::Pending,
                UnknownState::Fail => PollOutcome::Failed,
            }
        }
    }
}

/// Timing of one wait
///
/// `interval` and `timeout` are independent. An interval at or above the
/// timeout degrades the wait to a single delayed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Overall deadline, measured from the start of the wait (initial delay included)
    pub timeout: Duration,
    /// Sleep between two checks
    pub interval: Duration,
    /// Sleep before the first check
    pub initial_delay: Duration,
    /// Consecutive completed checks required before returning
    pub continuous_target_occurrence: u32,
}

impl PollConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Self::DEFAULT_INTERVAL,
            initial_delay: Duration::ZERO,
            continuous_target_occurrence: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences;
        self
    }

    pub fn validate(&self) -> Result<(), PollError> {
        if self.interval.is_zero() {
            return Err(PollError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.continuous_target_occurrence == 0 {
            return Err(PollError::InvalidConfig(
                "continuous target occurrence must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn format_detail(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

fn format_last_state(state: &Option<String>) -> String {
    state
        .as_ref()
        .map(|s| format!(", last state: {}", s))
        .unwrap_or_default()
}

/// Roughly 30 years; stands in for durations too large to add to `Instant::now()`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `Instant::now() + duration`, saturating to a far-future instant on overflow
pub(crate) fn instant_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Errors returned by a wait
#[derive(Debug, Error)]
pub enum PollError {
    /// The status check itself failed (transport error, unexpected HTTP status)
    #[error("error checking status of {target}: {source}")]
    Check {
        target: String,
        #[source]
        source: BoxError,
    },

    /// A mutating operation driven by `retry_with_wait` failed
    #[error("operation on {target} failed: {source}")]
    Operation {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The check classified the operation as failed
    #[error("{target} reached failure state '{state}'{}", format_detail(.detail))]
    Failed {
        target: String,
        state: String,
        detail: Option<String>,
    },

    /// No terminal state within the timeout
    #[error("timeout after {timeout:?} waiting for {target} ({attempts} checks{})", format_last_state(.last_state))]
    DeadlineExceeded {
        target: String,
        timeout: Duration,
        last_state: Option<String>,
        attempts: u32,
    },

    /// The wait was cancelled before a terminal state
    #[error("wait for {target} was cancelled")]
    Cancelled { target: String },

    #[error("invalid poll configuration: {0}")]
    InvalidConfig(String),
}

impl PollError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

pub type PollResult<T> = Result<T, PollError>;

/// Blocking wait-until-terminal-state primitive
///
/// One poller value describes one wait; it holds no state between calls and
/// can be shared by concurrent waits on different handles.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    target: String,
    config: PollConfig,
    cancel: Option<CancellationToken>,
}

impl StatusPoller {
    /// `target` names what is waited on; it appears in logs and errors
    pub fn new(target: impl Into<String>, config: PollConfig) -> Self {
        Self {
            target: target.into(),
            config,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// Poll `check` until it reports Completed, Failed, errors, times out or
    /// is cancelled. Returns the payload of the final Completed check.
    pub async fn wait<T, E, F, Fut>(&self, mut check: F) -> PollResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>, E>>,
        E: Into<BoxError>,
    {
        self.config.validate()?;

        let deadline = instant_after(self.config.timeout);
        let mut attempts = 0u32;
        let mut consecutive = 0u32;
        let mut last_state: Option<String> = None;

        if !self.config.initial_delay.is_zero() {
            log::debug!(
                "Waiting {:?} before checking {}",
                self.config.initial_delay,
                self.target
            );
            self.pause(self.config.initial_delay, deadline).await?;
        }

        loop {
            if self.is_cancelled() {
                return Err(self.cancelled_error());
            }
            if Instant::now() >= deadline {
                return Err(self.deadline_error(last_state, attempts));
            }

            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancelled() => return Err(self.cancelled_error()),
                _ = sleep_until(deadline) => return Err(self.deadline_error(last_state, attempts)),
                result = check() => result,
            };

            let observation = result.map_err(|e| PollError::Check {
                target: self.target.clone(),
                source: e.into(),
            })?;

            log::debug!(
                "{}: check {} observed state '{}' ({:?})",
                self.target,
                attempts,
                observation.state,
                observation.outcome
            );

            match observation.outcome {
                PollOutcome::Completed => {
                    consecutive += 1;
                    if consecutive >= self.config.continuous_target_occurrence {
                        log::info!(
                            "{} reached state '{}' after {} checks",
                            self.target,
                            observation.state,
                            attempts
                        );
                        return Ok(observation.payload);
                    }
                }
                PollOutcome::Failed => {
                    log::warn!(
                        "{} reached failure state '{}'{}",
                        self.target,
                        observation.state,
                        format_detail(&observation.detail)
                    );
                    return Err(PollError::Failed {
                        target: self.target.clone(),
                        state: observation.state,
                        detail: observation.detail,
                    });
                }
                PollOutcome::Pending => consecutive = 0,
            }

            last_state = Some(observation.state);
            self.pause(self.config.interval, deadline).await?;
        }
    }

    /// Poll a check that reports a raw state label, classified through `labels`
    pub async fn wait_for_state<T, E, F, Fut>(
        &self,
        labels: &StatusLabels,
        mut check: F,
    ) -> PollResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(T, String), E>>,
        E: Into<BoxError>,
    {
        labels.validate()?;
        self.wait(|| {
            let fut = check();
            async move {
                let (payload, state) = fut.await?;
                Ok::<_, E>(Observation::classified(payload, state, labels))
            }
        })
        .await
    }

    /// Sleep for `duration`, never past `deadline`, unless cancelled first
    async fn pause(&self, duration: Duration, deadline: Instant) -> PollResult<()> {
        let wake = instant_after(duration).min(deadline);
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(self.cancelled_error()),
            _ = sleep_until(wake) => Ok(()),
        }
    }

    async fn cancelled(&self) {
        match &self.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    fn cancelled_error(&self) -> PollError {
        log::warn!("Wait for {} was cancelled", self.target);
        PollError::Cancelled {
            target: self.target.clone(),
        }
    }

    fn deadline_error(&self, last_state: Option<String>, attempts: u32) -> PollError {
        PollError::DeadlineExceeded {
            target: self.target.clone(),
            timeout: self.config.timeout,
            last_state,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Status check that replays a fixed script and records when it was called
    #[derive(Clone, Default)]
    struct Script {
        steps: Arc<Mutex<VecDeque<Result<Observation<Value>, String>>>>,
        calls: Arc<Mutex<Vec<Instant>>>,
    }

    impl Script {
        fn new(steps: Vec<Result<Observation<Value>, String>>) -> Self {
            Self {
                steps: Arc::new(Mutex::new(steps.into())),
                calls: Arc::default(),
            }
        }

        fn always_pending() -> Self {
            Self::default()
        }

        fn check(&self) -> impl Future<Output = Result<Observation<Value>, String>> + use<> {
            self.calls.lock().unwrap().push(Instant::now());
            let next = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Observation::pending(json!({"status": 1}), "1")));
            async move { next }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn poller(timeout_ms: u64, interval_ms: u64) -> StatusPoller {
        StatusPoller::new(
            "test job",
            PollConfig::new(Duration::from_millis(timeout_ms))
                .with_interval(Duration::from_millis(interval_ms)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn returns_payload_of_completed_check() {
        let script = Script::new(vec![
            Ok(Observation::pending(json!({"status": 1}), "1")),
            Ok(Observation::pending(json!({"status": 1}), "1")),
            Ok(Observation::completed(json!({"status": 5}), "5")),
        ]);
        let interval = Duration::from_millis(50);
        let started = Instant::now();

        let result = StatusPoller::new(
            "CPH server (s-1)",
            PollConfig::new(Duration::from_secs(10)).with_interval(interval),
        )
        .wait(|| script.check())
        .await
        .unwrap();

        assert_eq!(result, json!({"status": 5}));
        assert_eq!(script.calls().len(), 3);
        assert_eq!(started.elapsed(), interval * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_check_stops_polling() {
        let script = Script::new(vec![Ok(Observation::failed(
            json!({"error_code": "X", "phone_id": "abc"}),
            "-1",
            "phone abc: error code X",
        ))]);

        let err = poller(10_000, 10).wait(|| script.check()).await.unwrap_err();

        assert!(err.is_failed());
        let text = err.to_string();
        assert!(text.contains("abc"));
        assert!(text.contains('X'));
        assert_eq!(script.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn check_error_is_not_retried() {
        let script = Script::new(vec![
            Ok(Observation::pending(json!({}), "1")),
            Err("503 Service Unavailable".to_string()),
        ]);

        let err = poller(10_000, 10).wait(|| script.check()).await.unwrap_err();

        match err {
            PollError::Check { target, source } => {
                assert_eq!(target, "test job");
                assert_eq!(source.to_string(), "503 Service Unavailable");
            }
            other => panic!("Expected Check error, got {:?}", other),
        }
        assert_eq!(script.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_forever_times_out_near_deadline() {
        let script = Script::always_pending();
        let started = Instant::now();
        let timeout = Duration::from_millis(100);

        let err = poller(100, 10).wait(|| script.check()).await.unwrap_err();

        assert!(err.is_timeout());
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed <= timeout + Duration::from_millis(10));

        let calls = script.calls();
        assert!((9..=11).contains(&calls.len()), "made {} calls", calls.len());
        assert!(calls.iter().all(|t| *t < started + timeout));
        match err {
            PollError::DeadlineExceeded {
                last_state,
                attempts,
                ..
            } => {
                assert_eq!(last_state.as_deref(), Some("1"));
                assert_eq!(attempts as usize, calls.len());
            }
            other => panic!("Expected DeadlineExceeded, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_check_waits_for_initial_delay() {
        let script = Script::new(vec![Ok(Observation::completed(json!({}), "done"))]);
        let delay = Duration::from_secs(120);
        let started = Instant::now();

        StatusPoller::new(
            "test job",
            PollConfig::new(Duration::from_secs(600))
                .with_interval(Duration::from_secs(10))
                .with_initial_delay(delay),
        )
        .wait(|| script.check())
        .await
        .unwrap();

        assert!(script.calls()[0] >= started + delay);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_delay_past_timeout_times_out_without_checking() {
        let script = Script::always_pending();
        let started = Instant::now();

        let err = StatusPoller::new(
            "test job",
            PollConfig::new(Duration::from_secs(30)).with_initial_delay(Duration::from_secs(120)),
        )
        .wait(|| script.check())
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(script.calls().is_empty());
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_beyond_timeout_gives_single_delayed_check() {
        let script = Script::always_pending();
        let timeout = Duration::from_secs(60);

        let err = StatusPoller::new(
            "test job",
            PollConfig::new(timeout)
                .with_interval(timeout * 10)
                .with_initial_delay(Duration::from_secs(5)),
        )
        .wait(|| script.check())
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(script.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_timeout_and_interval_do_not_overflow() {
        let script = Script::new(vec![
            Ok(Observation::pending(json!({"status": 1}), "1")),
            Ok(Observation::completed(json!({"status": 5}), "5")),
        ]);

        let result = StatusPoller::new(
            "test job",
            PollConfig::new(Duration::from_secs(u64::MAX)).with_interval(Duration::from_secs(1)),
        )
        .wait(|| script.check())
        .await
        .unwrap();
        assert_eq!(result, json!({"status": 5}));

        let script = Script::always_pending();
        let err = StatusPoller::new(
            "test job",
            PollConfig::new(Duration::from_secs(1)).with_interval(Duration::MAX),
        )
        .wait(|| script.check())
        .await
        .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(script.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_distinct_from_timeout() {
        let script = Script::always_pending();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            canceller.cancel();
        });
        let started = Instant::now();

        let err = poller(10_000, 10)
            .with_cancellation(token)
            .wait(|| script.check())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert!(started.elapsed() <= Duration::from_millis(45));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_before_first_check() {
        let token = CancellationToken::new();
        token.cancel();

        let err = poller(10_000, 10)
            .with_cancellation(token)
            .wait(|| async { Ok::<Observation<()>, String>(Observation::pending((), "1")) })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_check_is_abandoned_at_deadline() {
        let err = poller(100, 10)
            .wait(|| std::future::pending::<Result<Observation<()>, String>>())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_target_occurrence_requires_consecutive_completions() {
        let script = Script::new(vec![
            Ok(Observation::completed(json!({"n": 1}), "RUNNING")),
            Ok(Observation::pending(json!({"n": 2}), "CREATING")),
            Ok(Observation::completed(json!({"n": 3}), "RUNNING")),
            Ok(Observation::completed(json!({"n": 4}), "RUNNING")),
        ]);

        let result = StatusPoller::new(
            "test job",
            PollConfig::new(Duration::from_secs(10))
                .with_interval(Duration::from_millis(10))
                .with_continuous_target_occurrence(2),
        )
        .wait(|| script.check())
        .await
        .unwrap();

        assert_eq!(result, json!({"n": 4}));
        assert_eq!(script.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_state_classifies_labels() {
        let states = Arc::new(Mutex::new(VecDeque::from(["1", "3", "8"])));
        let labels = StatusLabels::new(["5", "8", "10"]).with_failure(["2"]);

        let state = poller(10_000, 10)
            .wait_for_state(&labels, || {
                let state = states.lock().unwrap().pop_front().unwrap_or("1");
                async move { Ok::<_, String>((state.to_string(), state.to_string())) }
            })
            .await
            .unwrap();

        assert_eq!(state, "8");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_state_reports_failure_label() {
        let labels = StatusLabels::new(["5"]).with_failure(["2"]);

        let err = poller(10_000, 10)
            .wait_for_state(&labels, || async { Ok::<_, String>(((), "2".to_string())) })
            .await
            .unwrap_err();

        match err {
            PollError::Failed { state, .. } => assert_eq!(state, "2"),
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn overlapping_labels_are_rejected_before_polling() {
        let labels = StatusLabels::new(["COMPLETED"]).with_pending(["PENDING", "COMPLETED"]);
        let calls = std::cell::Cell::new(0);

        let err = poller(100, 10)
            .wait_for_state(&labels, || {
                calls.set(calls.get() + 1);
                async { Ok::<_, String>(((), "PENDING".to_string())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::InvalidConfig(_)));
        assert!(err.to_string().contains("COMPLETED"));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn unknown_states_default_to_pending() {
        let labels = StatusLabels::new(["success"]).with_failure(["failed", "timeout"]);
        assert_eq!(labels.classify("success"), PollOutcome::Completed);
        assert_eq!(labels.classify("timeout"), PollOutcome::Failed);
        assert_eq!(labels.classify("rollingUpdate"), PollOutcome::Pending);

        let closed = labels.with_pending(["running"]).with_unknown(UnknownState::Fail);
        assert_eq!(closed.classify("running"), PollOutcome::Pending);
        assert_eq!(closed.classify("rollingUpdate"), PollOutcome::Failed);
    }

    #[test]
    fn zero_interval_is_invalid() {
        let config = PollConfig::new(Duration::from_secs(1)).with_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(PollError::InvalidConfig(_))));
    }

    #[test]
    fn labels_without_target_are_invalid() {
        let labels = StatusLabels::new(Vec::<String>::new());
        assert!(labels.validate().is_err());
    }
}
