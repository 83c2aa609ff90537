//! Order confirmation channel and its post-commit dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::OrderSummary;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::CheckoutConfig;
use crate::post_commit::PostCommitQueue;

/// Errors a notification channel can report.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The channel refused or failed to accept the message.
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Outbound confirmation channel (email, message bus, ...).
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Sends one order confirmation. Best effort.
    async fn send(&self, summary: &OrderSummary) -> Result<(), NotifyError>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %summary.order_id,
            recipient = %summary.recipient_email,
            total = %summary.total_amount,
            lines = summary.line_count,
            "order confirmation sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Mutex<Vec<OrderSummary>>,
    attempts: AtomicUsize,
    fail_on_send: AtomicBool,
    delay_ms: AtomicU64,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<InMemoryNotifierState>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every subsequent send to fail.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.fail_on_send.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent send take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Returns the number of send attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Returns the summaries delivered so far.
    pub async fn sent(&self) -> Vec<OrderSummary> {
        self.state.sent.lock().await.clone()
    }

    /// Waits until at least `count` sends were attempted or `timeout` passes.
    ///
    /// Returns true if the count was reached.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.attempts() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.state.fail_on_send.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("mail relay down".to_string()));
        }

        self.state.sent.lock().await.push(summary.clone());
        Ok(())
    }
}

/// Dispatches confirmations on their own task, strictly after commit.
///
/// Failures and timeouts are logged and counted; they never reach the caller
/// and are not retried.
pub struct PostCommitNotifier<N> {
    notifier: Arc<N>,
    timeout: Duration,
    allow_untransacted_dispatch: bool,
}

impl<N> Clone for PostCommitNotifier<N> {
    fn clone(&self) -> Self {
        Self {
            notifier: self.notifier.clone(),
            timeout: self.timeout,
            allow_untransacted_dispatch: self.allow_untransacted_dispatch,
        }
    }
}

impl<N: Notifier> PostCommitNotifier<N> {
    /// Wraps `notifier` using the timeouts and fallback policy of `config`.
    pub fn new(notifier: N, config: &CheckoutConfig) -> Self {
        Self {
            notifier: Arc::new(notifier),
            timeout: config.notify_timeout,
            allow_untransacted_dispatch: config.allow_untransacted_dispatch,
        }
    }

    /// Returns the wrapped notifier.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Schedules a confirmation for `summary`.
    ///
    /// With an open unit of work the send is queued on `queue` and happens
    /// only if that unit of work commits. Without one, the send happens
    /// immediately if untransacted dispatch is allowed and is dropped
    /// otherwise. Returns true if the confirmation was queued or dispatched.
    pub fn schedule(&self, summary: OrderSummary, queue: Option<&mut PostCommitQueue>) -> bool {
        match queue {
            Some(queue) => {
                let this = self.clone();
                queue.register(move || drop(this.dispatch(summary)));
                true
            }
            None if self.allow_untransacted_dispatch => {
                tracing::warn!(
                    order_id = %summary.order_id,
                    "no unit of work open, dispatching confirmation immediately"
                );
                self.dispatch(summary).is_some()
            }
            None => {
                metrics::counter!("notifications_refused_total").increment(1);
                tracing::error!(
                    order_id = %summary.order_id,
                    "no unit of work open and untransacted dispatch is disabled, confirmation dropped"
                );
                false
            }
        }
    }

    /// Sends `summary` on a new task right away.
    pub fn dispatch(&self, summary: OrderSummary) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::error!(order_id = %summary.order_id, "no async runtime, confirmation dropped");
            return None;
        };

        let span = tracing::info_span!("notify", order_id = %summary.order_id);
        let task = deliver(self.notifier.clone(), self.timeout, summary);
        Some(runtime.spawn(task.instrument(span)))
    }
}

async fn deliver<N: Notifier>(notifier: Arc<N>, timeout: Duration, summary: OrderSummary) {
    match tokio::time::timeout(timeout, notifier.send(&summary)).await {
        Ok(Ok(())) => {
            metrics::counter!("notifications_sent_total").increment(1);
            tracing::debug!("confirmation delivered");
        }
        Ok(Err(err)) => {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(error = %err, "confirmation failed");
        }
        Err(_) => {
            metrics::counter!("notifications_failed_total").increment(1);
            tracing::warn!(?timeout, "confirmation timed out");
        }
    }
}
