//! Profile reconciliation with bounded retry
//!
//! `reconcile` is the whole retry state machine as a plain async function
//! of a token, a fetch function, a delay function and a cancel signal, so
//! it can be driven without a manager, a store or a real clock.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use civic_api::{ApiError, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff before retry `n + 1` is `base_delay_ms * n`
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The backend confirmed the token
    Verified(UserProfile),
    /// The backend refused the token; never retried
    Rejected(ApiError),
    /// Every attempt failed transiently
    Unreachable { attempts: u32, last_error: ApiError },
    /// Torn down before an answer arrived
    Cancelled,
}

/// Owner side of a cancellation flag.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of a cancellation flag.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; never resolves if the handle is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

/// Confirm `token` against the backend.
///
/// Authorization failures end the loop at once. Anything else is retried
/// up to `policy.max_attempts` with linear backoff. Cancellation is checked
/// whenever the loop resumes, and also cuts short a pending fetch or delay.
pub async fn reconcile<F, Fut, D, DFut>(
    token: &str,
    policy: &RetryPolicy,
    mut fetch: F,
    mut delay: D,
    cancel: &CancelSignal,
) -> ReconcileOutcome
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<UserProfile, ApiError>>,
    D: FnMut(Duration) -> DFut,
    DFut: Future<Output = ()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return ReconcileOutcome::Cancelled;
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReconcileOutcome::Cancelled,
            result = fetch(token.to_string()) => result,
        };

        if cancel.is_cancelled() {
            return ReconcileOutcome::Cancelled;
        }

        match result {
            Ok(profile) => {
                tracing::info!(attempt, user_id = profile.id, "Session token verified");
                return ReconcileOutcome::Verified(profile);
            }
            Err(err) if err.is_authorization() => {
                tracing::warn!(attempt, status = ?err.status(), "Session token rejected");
                return ReconcileOutcome::Rejected(err);
            }
            Err(err) => {
                tracing::warn!(attempt, max_attempts, error = %err, "Profile fetch failed");
                last_error = Some(err);

                if attempt < max_attempts {
                    let wait = policy.backoff(attempt);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return ReconcileOutcome::Cancelled,
                        _ = delay(wait) => {}
                    }
                }
            }
        }
    }

    ReconcileOutcome::Unreachable {
        attempts: max_attempts,
        last_error: last_error.unwrap_or_else(|| ApiError::transient("no attempt was made")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::future::ready;

    fn profile(id: i64) -> UserProfile {
        UserProfile {
            id,
            username: format!("user{}", id),
            ..Default::default()
        }
    }

    fn network_down() -> ApiError {
        ApiError::transient("Network error: Unable to connect to server")
    }

    /// Scripted fetch results plus a log of the tokens and delays seen.
    struct Script {
        responses: Mutex<VecDeque<Result<UserProfile, ApiError>>>,
        tokens: Mutex<Vec<String>>,
        delays: Mutex<Vec<Duration>>,
    }

    impl Script {
        fn new(responses: Vec<Result<UserProfile, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                tokens: Mutex::new(Vec::new()),
                delays: Mutex::new(Vec::new()),
            })
        }

        fn fetch(self: &Arc<Self>) -> impl FnMut(String) -> std::future::Ready<Result<UserProfile, ApiError>> {
            let script = Arc::clone(self);
            move |token| {
                script.tokens.lock().push(token);
                let next = script
                    .responses
                    .lock()
                    .pop_front()
                    .unwrap_or_else(|| Err(network_down()));
                ready(next)
            }
        }

        fn delay(self: &Arc<Self>) -> impl FnMut(Duration) -> std::future::Ready<()> {
            let script = Arc::clone(self);
            move |wait| {
                script.delays.lock().push(wait);
                ready(())
            }
        }

        fn calls(&self) -> usize {
            self.tokens.lock().len()
        }
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(400));
        assert_eq!(policy.backoff(2), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_verified_on_each_attempt() {
        for k in 1..=3usize {
            let mut responses: Vec<_> = (1..k).map(|_| Err(network_down())).collect();
            responses.push(Ok(profile(1)));
            let script = Script::new(responses);
            let (_handle, signal) = cancel_pair();

            let outcome = reconcile(
                "t1",
                &RetryPolicy::default(),
                script.fetch(),
                script.delay(),
                &signal,
            )
            .await;

            assert_eq!(outcome, ReconcileOutcome::Verified(profile(1)));
            assert_eq!(script.calls(), k);
            assert!(script.tokens.lock().iter().all(|t| t == "t1"));
        }
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let rejected = ApiError::Auth {
            status: 401,
            message: "Invalid token.".to_string(),
        };
        let script = Script::new(vec![Err(rejected.clone())]);
        let (_handle, signal) = cancel_pair();

        let outcome = reconcile(
            "t1",
            &RetryPolicy::default(),
            script.fetch(),
            script.delay(),
            &signal,
        )
        .await;

        assert_eq!(outcome, ReconcileOutcome::Rejected(rejected));
        assert_eq!(script.calls(), 1);
        assert!(script.delays.lock().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_after_three_attempts() {
        let script = Script::new(vec![
            Err(network_down()),
            Err(ApiError::from_response(502, "Bad Gateway", &serde_json::Value::Null)),
            Err(network_down()),
        ]);
        let (_handle, signal) = cancel_pair();

        let outcome = reconcile(
            "t1",
            &RetryPolicy::default(),
            script.fetch(),
            script.delay(),
            &signal,
        )
        .await;

        assert_eq!(
            outcome,
            ReconcileOutcome::Unreachable {
                attempts: 3,
                last_error: network_down(),
            }
        );
        assert_eq!(script.calls(), 3);
        assert_eq!(
            *script.delays.lock(),
            vec![Duration::from_millis(400), Duration::from_millis(800)]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let script = Script::new(vec![Ok(profile(1))]);
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let outcome = reconcile(
            "t1",
            &RetryPolicy::default(),
            script.fetch(),
            script.delay(),
            &signal,
        )
        .await;

        assert_eq!(outcome, ReconcileOutcome::Cancelled);
        assert_eq!(script.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_while_fetching() {
        let (handle, signal) = cancel_pair();
        let calls = Arc::new(Mutex::new(0usize));

        let counter = Arc::clone(&calls);
        let fetch = move |_token: String| {
            *counter.lock() += 1;
            // Teardown lands while the request is in flight
            handle.cancel();
            ready(Ok(profile(1)))
        };

        let outcome = reconcile(
            "t1",
            &RetryPolicy::default(),
            fetch,
            |_| ready(()),
            &signal,
        )
        .await;

        assert_eq!(outcome, ReconcileOutcome::Cancelled);
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff() {
        let script = Script::new(vec![Err(network_down()), Ok(profile(1))]);
        let (handle, signal) = cancel_pair();

        let delays = Arc::clone(&script);
        let delay = move |wait: Duration| {
            delays.delays.lock().push(wait);
            handle.cancel();
            ready(())
        };

        let outcome = reconcile(
            "t1",
            &RetryPolicy::default(),
            script.fetch(),
            delay,
            &signal,
        )
        .await;

        assert_eq!(outcome, ReconcileOutcome::Cancelled);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_real_sleep() {
        let script = Script::new(vec![Err(network_down()), Ok(profile(1))]);
        let (handle, signal) = cancel_pair();
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 60_000,
        };

        let fetch = script.fetch();
        let task = tokio::spawn(async move {
            reconcile("t1", &policy, fetch, tokio::time::sleep, &signal).await
        });

        while script.calls() < 1 {
            tokio::task::yield_now().await;
        }
        handle.cancel();

        assert_eq!(task.await.unwrap(), ReconcileOutcome::Cancelled);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let script = Script::new(vec![Ok(profile(4))]);
        let (_handle, signal) = cancel_pair();
        let policy = RetryPolicy {
            max_attempts: 0,
            base_delay_ms: 400,
        };

        let outcome = reconcile("t1", &policy, script.fetch(), script.delay(), &signal).await;

        assert_eq!(outcome, ReconcileOutcome::Verified(profile(4)));
    }
}
