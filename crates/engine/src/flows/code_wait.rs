//! Polling a mailbox for a verification code.
//!
//! The mail client is blocking, so every attempt runs on the blocking pool
//! while the conversation task only awaits it. Between attempts the loop
//! sleeps on the tokio timer and a cancel signal can cut any wait short.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::{FetchError, MailboxCredentials};

/// Source of verification codes.
///
/// One call is one bounded attempt; implementations must not retry
/// internally.
pub trait CodeFetcher: Send + Sync {
    fn fetch_latest_code(
        &self,
        credentials: &MailboxCredentials,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<String>, FetchError>;
}

/// Fetcher used when no mail server is configured. Never finds a code.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMailFetcher;

impl CodeFetcher for NoMailFetcher {
    fn fetch_latest_code(
        &self,
        _credentials: &MailboxCredentials,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Option<String>, FetchError> {
        Ok(None)
    }
}

/// Retry budget of a code wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    pub attempts: u32,
    /// Pause between two attempts.
    pub interval: Duration,
    /// How far before the wait started a message may have arrived.
    pub lookback: chrono::Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(10),
            lookback: chrono::Duration::minutes(5),
        }
    }
}

impl WaitPolicy {
    pub fn since(&self, started_at: DateTime<Utc>) -> DateTime<Utc> {
        started_at - self.lookback
    }

    /// Upper bound of the whole wait, ignoring fetch time.
    pub fn total(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

/// Requests cancellation of a running wait.
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observes a [`CancelHandle`].
#[derive(Clone, Debug)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if every
    /// handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.0.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Code(String),
    Cancelled,
    Exhausted,
}

/// Poll `fetcher` until a code shows up, the budget runs out or the wait is
/// cancelled.
///
/// `on_attempt(n, total)` is called before attempt `n` starts. Fetch errors
/// count as an attempt without a code.
pub async fn wait_for_code<F>(
    fetcher: Arc<dyn CodeFetcher>,
    credentials: &MailboxCredentials,
    started_at: DateTime<Utc>,
    policy: &WaitPolicy,
    cancel: &mut CancelSignal,
    mut on_attempt: F,
) -> WaitOutcome
where
    F: FnMut(u32, u32),
{
    let since = policy.since(started_at);

    for attempt in 1..=policy.attempts {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        on_attempt(attempt, policy.attempts);

        let task_fetcher = Arc::clone(&fetcher);
        let task_credentials = credentials.clone();
        let fetch = tokio::task::spawn_blocking(move || {
            task_fetcher.fetch_latest_code(&task_credentials, Some(since))
        });
        let joined = tokio::select! {
            biased;
            () = cancel.cancelled() => return WaitOutcome::Cancelled,
            joined = fetch => joined,
        };

        match joined {
            Ok(Ok(Some(code))) => {
                tracing::info!(attempt, "verification code found");
                return WaitOutcome::Code(code);
            }
            Ok(Ok(None)) => tracing::debug!(attempt, "no verification code yet"),
            Ok(Err(err)) => tracing::warn!(attempt, "code fetch failed: {err}"),
            Err(err) => tracing::error!(attempt, "code fetch task failed: {err}"),
        }

        if attempt < policy.attempts {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return WaitOutcome::Cancelled,
                () = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    WaitOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Replays a fixed list of answers, then reports no code.
    struct Scripted {
        answers: Mutex<Vec<Result<Option<String>, FetchError>>>,
        calls: Mutex<Vec<Option<DateTime<Utc>>>>,
    }

    impl Scripted {
        fn new(mut answers: Vec<Result<Option<String>, FetchError>>) -> Arc<Self> {
            answers.reverse();
            Arc::new(Self {
                answers: Mutex::new(answers),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Option<DateTime<Utc>>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CodeFetcher for Scripted {
        fn fetch_latest_code(
            &self,
            _credentials: &MailboxCredentials,
            since: Option<DateTime<Utc>>,
        ) -> Result<Option<String>, FetchError> {
            self.calls.lock().unwrap().push(since);
            self.answers.lock().unwrap().pop().unwrap_or(Ok(None))
        }
    }

    fn credentials() -> MailboxCredentials {
        MailboxCredentials {
            login: "box@example.com".to_string(),
            password: "secret".to_string(),
        }
    }

    fn fast_policy(attempts: u32) -> WaitPolicy {
        WaitPolicy {
            attempts,
            interval: Duration::from_millis(1),
            ..WaitPolicy::default()
        }
    }

    #[tokio::test]
    async fn returns_first_code_and_uses_lookback() {
        let fetcher = Scripted::new(vec![
            Ok(None),
            Err(FetchError::Connection("refused".to_string())),
            Ok(Some("AB12C".to_string())),
        ]);
        let started = Utc::now();
        let (_handle, mut signal) = cancel_pair();
        let mut seen = Vec::new();

        let outcome = wait_for_code(
            fetcher.clone(),
            &credentials(),
            started,
            &fast_policy(30),
            &mut signal,
            |attempt, total| seen.push((attempt, total)),
        )
        .await;

        assert_eq!(outcome, WaitOutcome::Code("AB12C".to_string()));
        assert_eq!(seen, vec![(1, 30), (2, 30), (3, 30)]);
        let calls = fetcher.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Some(started - chrono::Duration::minutes(5)));
    }

    #[tokio::test]
    async fn exhausts_after_budget() {
        let fetcher = Scripted::new(Vec::new());
        let (_handle, mut signal) = cancel_pair();

        let outcome = wait_for_code(
            fetcher.clone(),
            &credentials(),
            Utc::now(),
            &fast_policy(4),
            &mut signal,
            |_, _| {},
        )
        .await;

        assert_eq!(outcome, WaitOutcome::Exhausted);
        assert_eq!(fetcher.calls().len(), 4);
    }

    #[tokio::test]
    async fn cancel_before_start_skips_fetching() {
        let fetcher = Scripted::new(vec![Ok(Some("AB12C".to_string()))]);
        let (handle, mut signal) = cancel_pair();
        handle.cancel();

        let outcome = wait_for_code(
            fetcher.clone(),
            &credentials(),
            Utc::now(),
            &fast_policy(30),
            &mut signal,
            |_, _| {},
        )
        .await;

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_the_pause_between_attempts() {
        let fetcher = Scripted::new(Vec::new());
        let (handle, mut signal) = cancel_pair();
        let policy = WaitPolicy {
            attempts: 30,
            interval: Duration::from_secs(10),
            ..WaitPolicy::default()
        };

        let creds = credentials();
        let wait = wait_for_code(
            fetcher.clone(),
            &creds,
            Utc::now(),
            &policy,
            &mut signal,
            |attempt, _| {
                if attempt == 2 {
                    handle.cancel();
                }
            },
        );

        assert_eq!(wait.await, WaitOutcome::Cancelled);
        assert!(fetcher.calls().len() <= 2);
    }

    #[test]
    fn default_policy_spans_five_minutes() {
        assert_eq!(WaitPolicy::default().total(), Duration::from_secs(300));
    }
}
