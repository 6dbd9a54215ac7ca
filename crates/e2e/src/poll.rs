//! Eventual-consistency polling
//!
//! The backend processes some writes asynchronously (an uploaded facility
//! list is parsed by a background worker, moderation events are merged
//! later). Instead of fixed sleeps, scenarios hand a check function to
//! [`poll_until`], which re-runs it at configured intervals until a predicate
//! holds or the timeout elapses.
//!
//! Checks run strictly one after another. An in-flight check always
//! completes before the deadline is evaluated again; only the waits between
//! checks are cut short by the deadline or a cancellation token.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::E2eError;

/// Configuration of one poll
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Waits between checks; the last entry repeats once the list runs out
    pub intervals: Vec<Duration>,

    /// Hard wall-clock limit measured from the first check
    pub timeout: Duration,

    /// What is being waited for, used in logs and errors
    pub description: String,

    /// Treat check errors as "not satisfied yet" instead of failing
    pub retry_on_error: bool,

    /// Aborts the wait between checks when cancelled
    pub cancel: Option<CancellationToken>,
}

impl PollOptions {
    pub fn new(description: impl Into<String>, intervals: Vec<Duration>, timeout: Duration) -> Self {
        Self {
            intervals,
            timeout,
            description: description.into(),
            retry_on_error: false,
            cancel: None,
        }
    }

    pub fn from_millis(description: impl Into<String>, intervals_ms: &[u64], timeout_ms: u64) -> Self {
        Self::new(
            description,
            intervals_ms.iter().copied().map(Duration::from_millis).collect(),
            Duration::from_millis(timeout_ms),
        )
    }

    pub fn retry_on_error(mut self) -> Self {
        self.retry_on_error = true;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Rejects options that would make a poll hang or spin
    pub fn validate(&self) -> Result<(), String> {
        if self.intervals.is_empty() {
            return Err(format!("{}: at least one retry interval is required", self.description));
        }
        if self.intervals.iter().any(Duration::is_zero) {
            return Err(format!("{}: retry intervals must be non-zero", self.description));
        }
        if self.timeout.is_zero() {
            return Err(format!("{}: timeout must be non-zero", self.description));
        }
        Ok(())
    }

    /// Wait after the given (zero-based) attempt
    fn interval_after(&self, attempt: usize) -> Duration {
        let last = self.intervals.len().saturating_sub(1);
        self.intervals
            .get(attempt.min(last))
            .copied()
            .unwrap_or_default()
    }
}

/// Condition a polled value must meet
pub enum Predicate<T> {
    Equals(T),
    NotEquals(T),
    Satisfies(Box<dyn Fn(&T) -> bool + Send + Sync>),
}

impl<T: PartialEq> Predicate<T> {
    pub fn satisfies(condition: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Predicate::Satisfies(Box::new(condition))
    }

    pub fn matches(&self, value: &T) -> bool {
        match self {
            Predicate::Equals(expected) => value == expected,
            Predicate::NotEquals(unexpected) => value != unexpected,
            Predicate::Satisfies(condition) => condition(value),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Equals(expected) => f.debug_tuple("Equals").field(expected).finish(),
            Predicate::NotEquals(unexpected) => f.debug_tuple("NotEquals").field(unexpected).finish(),
            Predicate::Satisfies(_) => f.write_str("Satisfies(..)"),
        }
    }
}

/// The condition never held before the timeout
#[derive(Debug)]
pub struct PollTimeout<T> {
    pub description: String,
    pub elapsed: Duration,
    pub attempts: u32,
    /// Last value the check produced, if any check succeeded
    pub last_value: Option<T>,
    /// Last swallowed check error (only with `retry_on_error`)
    pub last_error: Option<String>,
}

impl<T: fmt::Debug> PollTimeout<T> {
    /// Short rendering of what the last attempt observed
    pub fn last_observed(&self) -> String {
        match (&self.last_value, &self.last_error) {
            (_, Some(error)) => format!("error: {}", error),
            (Some(value), None) => format!("{:?}", value),
            (None, None) => "nothing".to_string(),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for PollTimeout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out waiting for {} after {:?} ({} attempts); last observed: {}",
            self.description,
            self.elapsed,
            self.attempts,
            self.last_observed()
        )
    }
}

#[derive(Debug, Error)]
pub enum PollError<T: fmt::Debug, E: fmt::Debug + fmt::Display> {
    #[error("invalid poll options: {0}")]
    InvalidOptions(String),

    #[error("{0}")]
    Timeout(PollTimeout<T>),

    #[error("polling for {description} cancelled after {elapsed:?}")]
    Cancelled { description: String, elapsed: Duration },

    #[error("check for {description} failed: {error}")]
    Check { description: String, error: E },
}

/// Re-runs `check` until `predicate` holds, returning the satisfying value.
///
/// A value satisfying the predicate on the first check is returned without
/// waiting. Check errors end the poll immediately unless the options opt in
/// with [`PollOptions::retry_on_error`].
///
/// # Errors
/// * [`PollError::InvalidOptions`] before any check runs, for empty or zero
///   intervals or a zero timeout.
/// * [`PollError::Timeout`] once the timeout elapses, carrying the last
///   observed value and the elapsed time.
/// * [`PollError::Check`] for a check error that is not retried.
/// * [`PollError::Cancelled`] when the options' cancellation token fires.
pub async fn poll_until<T, E, F, Fut>(
    mut check: F,
    predicate: &Predicate<T>,
    options: &PollOptions,
) -> Result<T, PollError<T, E>>
where
    T: PartialEq + fmt::Debug,
    E: fmt::Debug + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    options.validate().map_err(PollError::InvalidOptions)?;

    let description = options.description.as_str();
    let start = Instant::now();
    let mut attempts: u32 = 0;
    let mut last_value: Option<T> = None;

    loop {
        if options.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(PollError::Cancelled {
                description: description.to_string(),
                elapsed: start.elapsed(),
            });
        }

        attempts += 1;
        // Only the latest attempt's error is reported
        let last_error = match check().await {
            Ok(value) if predicate.matches(&value) => {
                info!(
                    description,
                    attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Poll condition satisfied"
                );
                return Ok(value);
            }
            Ok(value) => {
                debug!(description, attempts, observed = ?value, "Poll condition not met yet");
                last_value = Some(value);
                None
            }
            Err(error) if options.retry_on_error => {
                warn!(description, attempts, %error, "Poll check failed, retrying");
                Some(error.to_string())
            }
            Err(error) => {
                return Err(PollError::Check {
                    description: description.to_string(),
                    error,
                });
            }
        };

        let elapsed = start.elapsed();
        if elapsed >= options.timeout {
            let timeout = PollTimeout {
                description: description.to_string(),
                elapsed,
                attempts,
                last_value,
                last_error,
            };
            warn!("{}", timeout);
            return Err(PollError::Timeout(timeout));
        }

        // The final check lands on the deadline rather than past it
        let delay = options
            .interval_after(attempts as usize - 1)
            .min(options.timeout - elapsed);

        match &options.cancel {
            Some(token) => {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = token.cancelled() => {
                        return Err(PollError::Cancelled {
                            description: description.to_string(),
                            elapsed: start.elapsed(),
                        });
                    }
                }
            }
            None => sleep(delay).await,
        }
    }
}

impl<T: fmt::Debug> From<PollError<T, E2eError>> for E2eError {
    fn from(err: PollError<T, E2eError>) -> Self {
        match err {
            PollError::InvalidOptions(reason) => E2eError::InvalidConfig(reason),
            PollError::Timeout(timeout) => E2eError::PollTimeout {
                last_observed: timeout.last_observed(),
                description: timeout.description,
                elapsed: timeout.elapsed,
                attempts: timeout.attempts,
            },
            PollError::Cancelled {
                description,
                elapsed,
            } => E2eError::PollCancelled {
                description,
                elapsed,
            },
            PollError::Check { error, .. } => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[tokio::test(start_paused = true)]
    async fn satisfied_first_check_returns_without_waiting() {
        let start = Instant::now();
        let mut calls = 0;
        let options = PollOptions::from_millis("facility list status", &[500], 5_000);

        let status = poll_until(
            || {
                calls += 1;
                async { Ok::<_, Infallible>("PROCESSED".to_string()) }
            },
            &Predicate::Equals("PROCESSED".to_string()),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(status, "PROCESSED");
        assert_eq!(calls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_becomes_non_empty_after_thirty_millis() {
        let start = Instant::now();
        let mut calls = 0;
        let options = PollOptions::from_millis("moderation queue", &[10], 100);

        let length = poll_until(
            || {
                calls += 1;
                let length = if start.elapsed() >= ms(30) { 3 } else { 0 };
                async move { Ok::<usize, Infallible>(length) }
            },
            &Predicate::satisfies(|length: &usize| *length > 0),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(length, 3);
        assert!((3..=4).contains(&calls), "unexpected attempt count {}", calls);
    }

    #[tokio::test(start_paused = true)]
    async fn intervals_advance_then_repeat_the_last_entry() {
        let start = Instant::now();
        let mut seen = Vec::new();
        let options = PollOptions::from_millis("processing", &[10, 20, 50], 1_000);

        let result = poll_until(
            || {
                seen.push(start.elapsed());
                let done = seen.len() == 5;
                async move { Ok::<bool, Infallible>(done) }
            },
            &Predicate::Equals(true),
            &options,
        )
        .await;

        assert!(result.unwrap());
        let offsets: Vec<u128> = seen.iter().map(Duration::as_millis).collect();
        assert_eq!(offsets, vec![0, 10, 30, 80, 130]);
    }

    #[tokio::test(start_paused = true)]
    async fn never_satisfied_times_out_with_last_value() {
        let start = Instant::now();
        let options = PollOptions::from_millis("facility match count", &[30], 100);

        let err = poll_until(
            || async { Ok::<u32, Infallible>(0) },
            &Predicate::NotEquals(0),
            &options,
        )
        .await
        .unwrap_err();

        let PollError::Timeout(timeout) = err else {
            panic!("expected a timeout");
        };
        assert_eq!(timeout.last_value, Some(0));
        assert_eq!(timeout.attempts, 5);
        assert!(timeout.elapsed >= ms(100));
        assert!(start.elapsed() <= ms(100) + ms(30));

        let message = timeout.to_string();
        assert!(message.contains("facility match count"));
        assert!(message.contains("last observed: 0"));
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_propagate_by_default() {
        let mut calls = 0;
        let options = PollOptions::from_millis("facility detail", &[10], 100);

        let err = poll_until(
            || {
                calls += 1;
                async { Err::<u32, String>("relative URL without a base".to_string()) }
            },
            &Predicate::Equals(1),
            &options,
        )
        .await
        .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, PollError::Check { ref error, .. } if error.contains("relative URL")));
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_are_retried_when_opted_in() {
        let mut calls = 0;
        let options = PollOptions::from_millis("facility detail", &[10], 100).retry_on_error();

        let value = poll_until(
            || {
                calls += 1;
                let outcome = if calls < 3 { Err("502 Bad Gateway".to_string()) } else { Ok(7) };
                async move { outcome }
            },
            &Predicate::Equals(7),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retried_errors_are_reported_on_timeout() {
        let options = PollOptions::from_millis("facility detail", &[40], 100).retry_on_error();

        let err = poll_until(
            || async { Err::<u32, String>("connection reset".to_string()) },
            &Predicate::Equals(1),
            &options,
        )
        .await
        .unwrap_err();

        let PollError::Timeout(timeout) = err else {
            panic!("expected a timeout");
        };
        assert_eq!(timeout.last_value, None);
        assert_eq!(timeout.last_observed(), "error: connection reset");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_only_the_latest_attempt() {
        let mut calls = 0;
        let options = PollOptions::from_millis("facility detail", &[40], 100).retry_on_error();

        let err = poll_until(
            || {
                calls += 1;
                let outcome = if calls == 1 { Err("connection reset".to_string()) } else { Ok(calls) };
                async move { outcome }
            },
            &Predicate::Equals(0),
            &options,
        )
        .await
        .unwrap_err();

        let PollError::Timeout(timeout) = err else {
            panic!("expected a timeout");
        };
        assert!(timeout.last_error.is_none());
        assert_eq!(timeout.last_value, Some(calls));
        assert_eq!(timeout.last_observed(), format!("{:?}", calls));
    }

    #[tokio::test]
    async fn invalid_options_fail_before_checking() {
        let cases = [
            PollOptions::from_millis("no intervals", &[], 100),
            PollOptions::from_millis("zero interval", &[10, 0], 100),
            PollOptions::from_millis("zero timeout", &[10], 0),
        ];
        for options in cases {
            let mut calls = 0;
            let err = poll_until(
                || {
                    calls += 1;
                    async { Ok::<u32, Infallible>(1) }
                },
                &Predicate::Equals(1),
                &options,
            )
            .await
            .unwrap_err();
            assert!(matches!(err, PollError::InvalidOptions(_)), "{}", options.description);
            assert_eq!(calls, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let token = CancellationToken::new();
        let options = PollOptions::from_millis("upload processing", &[1_000], 60_000)
            .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            sleep(ms(25)).await;
            token.cancel();
        });

        let start = Instant::now();
        let err = poll_until(
            || async { Ok::<bool, Infallible>(false) },
            &Predicate::Equals(true),
            &options,
        )
        .await
        .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, PollError::Cancelled { .. }));
        assert!(start.elapsed() < ms(1_000));
    }

    #[test]
    fn poll_errors_convert_into_harness_errors() {
        let err: E2eError = PollError::<u32, E2eError>::Timeout(PollTimeout {
            description: "facility list".to_string(),
            elapsed: ms(100),
            attempts: 4,
            last_value: Some(2),
            last_error: None,
        })
        .into();
        assert!(matches!(
            err,
            E2eError::PollTimeout { attempts: 4, ref last_observed, .. } if last_observed == "2"
        ));

        let err: E2eError = PollError::<u32, E2eError>::Check {
            description: "facility list".to_string(),
            error: E2eError::SpecParse("bad".to_string()),
        }
        .into();
        assert!(matches!(err, E2eError::SpecParse(_)));
    }
}
