//! One-shot notification dispatch for a Notify session.
//!
//! The sighting that armed this session happened in the previous boot; only
//! the mode flag crossed the restart. The dispatcher therefore stamps a fresh
//! notification (event id plus fired-at time) and hands it to the transport
//! exactly once. Delivery failure is logged and reported, but the controller
//! returns to monitoring either way.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// What gets delivered: a stamped "trigger was seen" notice.
///
/// Transports serialize this however their endpoint expects; the core only
/// guarantees a unique id per dispatch and the dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Unique per dispatch, for endpoint-side dedup and log correlation.
    pub event_id: Uuid,
    /// When the dispatch was issued, not when the trigger was sighted.
    pub fired_at: DateTime<Utc>,
}

impl Notification {
    /// Stamp a new notification.
    #[must_use]
    pub fn stamp() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            fired_at: Utc::now(),
        }
    }
}

/// Why a delivery attempt did not land.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The request could not be constructed from configuration.
    #[error("failed to build notification request: {message}")]
    BuildRequest {
        /// Transport-specific detail.
        message: String,
    },

    /// The request never completed an exchange with the endpoint.
    #[error("notification transport failed: {message}")]
    Transport {
        /// Transport-specific detail.
        message: String,
    },

    /// The endpoint answered outside the 2xx range.
    #[error("notification rejected with status {status}")]
    Rejected {
        /// HTTP status code returned by the endpoint.
        status: u16,
    },

    /// The exchange exceeded the configured ceiling.
    #[error("notification timed out after {seconds}s")]
    Timeout {
        /// Ceiling that was exceeded.
        seconds: u64,
    },
}

/// Delivery transport contract. One call is one complete delivery attempt;
/// the dispatcher never retries.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    /// Deliver `notice` to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Any [`NotifyError`]; the dispatcher logs it and passes it up.
    async fn notify(&mut self, notice: &Notification) -> Result<(), NotifyError>;
}

/// Invokes the transport exactly once and logs the outcome with timing.
pub struct NotificationDispatcher<N> {
    notifier: N,
}

impl<N: Notifier> NotificationDispatcher<N> {
    /// Wrap a transport.
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    /// Stamp and deliver one notification.
    ///
    /// # Errors
    ///
    /// The transport's [`NotifyError`]. Callers decide whether that matters;
    /// the session controller treats it as recoverable.
    pub async fn dispatch(&mut self) -> Result<(), NotifyError> {
        let notice = Notification::stamp();
        let started = std::time::Instant::now();
        info!(event_id = %notice.event_id, "dispatching notification");

        match self.notifier.notify(&notice).await {
            Ok(()) => {
                info!(
                    event_id = %notice.event_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "notification delivered"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    event_id = %notice.event_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "notification failed"
                );
                Err(err)
            }
        }
    }
}

// =============================================================================
// MOCK NOTIFIER
// =============================================================================

/// Recording transport for tests and harnesses.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone)]
pub struct MockNotifier {
    inner: std::sync::Arc<std::sync::Mutex<MockNotifierState>>,
}

#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
struct MockNotifierState {
    outcome: Result<(), NotifyError>,
    delivered: Vec<Notification>,
}

#[cfg(any(test, feature = "mock"))]
impl MockNotifier {
    fn with_outcome(outcome: Result<(), NotifyError>) -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::Mutex::new(MockNotifierState {
                outcome,
                delivered: Vec::new(),
            })),
        }
    }

    /// Every delivery succeeds.
    #[must_use]
    pub fn delivers() -> Self {
        Self::with_outcome(Ok(()))
    }

    /// Every delivery fails with `error`.
    #[must_use]
    pub fn fails(error: NotifyError) -> Self {
        Self::with_outcome(Err(error))
    }

    /// Notifications handed to the transport so far.
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.inner.lock().unwrap().delivered.clone()
    }
}

#[cfg(any(test, feature = "mock"))]
impl Notifier for MockNotifier {
    async fn notify(&mut self, notice: &Notification) -> Result<(), NotifyError> {
        let mut state = self.inner.lock().unwrap();
        state.delivered.push(notice.clone());
        state.outcome.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_invokes_transport_once() {
        let notifier = MockNotifier::delivers();
        let mut dispatcher = NotificationDispatcher::new(notifier.clone());
        assert!(dispatcher.dispatch().await.is_ok());
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_surfaces_transport_error() {
        let notifier = MockNotifier::fails(NotifyError::Rejected { status: 503 });
        let mut dispatcher = NotificationDispatcher::new(notifier.clone());
        let result = dispatcher.dispatch().await;
        assert_eq!(result, Err(NotifyError::Rejected { status: 503 }));
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_each_dispatch_is_uniquely_stamped() {
        let notifier = MockNotifier::delivers();
        let mut dispatcher = NotificationDispatcher::new(notifier.clone());
        dispatcher.dispatch().await.ok();
        dispatcher.dispatch().await.ok();
        let delivered = notifier.delivered();
        assert_eq!(delivered.len(), 2);
        assert_ne!(delivered[0].event_id, delivered[1].event_id);
    }
}
