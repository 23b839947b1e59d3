//! The mode transition controller.
//!
//! One boot is one session. The controller reads the persisted mode, runs
//! the matching half of the cycle, commits the mode for the *next* boot, and
//! hands back a [`SessionEnd`]; [`run_forever`] then invokes the restarter,
//! which never returns. The full cycle:
//!
//! - Monitor boot: passive capture until the trigger device is sighted,
//!   commit Notify, restart.
//! - Notify boot: associate with bounded retries; on `Connected` dispatch
//!   the one-shot notification; either way commit Monitor, restart.
//!
//! The controller owns every collaborator for the duration of the session;
//! nothing is shared and nothing survives the restart except the store file.

use std::fmt;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assoc::{AssociationDriver, AssociationManager, ConnectionOutcome};
use crate::error::{LookoutError, Result};
use crate::indicator::{Phase, StatusIndicator};
use crate::monitor::{CaptureBackend, PassiveMonitor};
use crate::notify::{NotificationDispatcher, Notifier};
use crate::restart::Restarter;
use crate::store::{ModeStore, OperatingMode};

/// Times a failed mode commit is retried before the session halts fatally.
/// Restarting with an unconfirmed mode is the one thing this design must
/// never do.
const COMMIT_RETRIES: u32 = 3;

/// Where the session currently is. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading the persisted mode.
    Booting,
    /// Passive capture, waiting for the trigger device.
    Monitoring,
    /// Driving the association manager.
    AwaitingConnection,
    /// Dispatching the notification.
    Notifying,
    /// Committing Monitor for the next boot.
    TransitioningToMonitor,
    /// Committing Notify for the next boot.
    TransitioningToNotify,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Booting => "booting",
            Self::Monitoring => "monitoring",
            Self::AwaitingConnection => "awaiting-connection",
            Self::Notifying => "notifying",
            Self::TransitioningToMonitor => "transitioning-to-monitor",
            Self::TransitioningToNotify => "transitioning-to-notify",
        };
        f.write_str(label)
    }
}

/// The controller's terminal value for one boot: what the next boot will do,
/// plus the session id for log correlation across the restart boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnd {
    /// Mode durably committed for the next boot.
    pub next_mode: OperatingMode,
    /// This session's id.
    pub session_id: Uuid,
}

/// One boot's state machine over injected collaborators.
pub struct SessionController<S, B, D, N, I> {
    store: S,
    monitor: PassiveMonitor<B>,
    association: AssociationManager<D>,
    dispatcher: NotificationDispatcher<N>,
    indicator: I,
    state: SessionState,
    session_id: Uuid,
}

impl<S, B, D, N, I> SessionController<S, B, D, N, I>
where
    S: ModeStore,
    B: CaptureBackend,
    D: AssociationDriver,
    N: Notifier,
    I: StatusIndicator,
{
    /// Assemble a controller for one session.
    pub fn new(
        store: S,
        monitor: PassiveMonitor<B>,
        association: AssociationManager<D>,
        dispatcher: NotificationDispatcher<N>,
        indicator: I,
    ) -> Self {
        Self {
            store,
            monitor,
            association,
            dispatcher,
            indicator,
            state: SessionState::Booting,
            session_id: Uuid::new_v4(),
        }
    }

    /// This session's id.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Run the session to its end.
    ///
    /// Returns only after the next mode is durably committed; the caller is
    /// expected to restart the device immediately (see [`run_forever`]).
    ///
    /// # Errors
    ///
    /// Any fatal [`LookoutError`]; no restart must follow one.
    pub async fn run_session(mut self) -> Result<SessionEnd> {
        info!(session_id = %self.session_id, state = %self.state, "session starting");
        let mode = match self.store.load() {
            Ok(mode) => mode,
            Err(err) => {
                self.indicator.show(Phase::Fault);
                return Err(err.into());
            }
        };
        info!(mode = %mode, "persisted mode loaded");

        let next = match mode {
            OperatingMode::Monitor => match self.monitor_session().await {
                Ok(next) => next,
                Err(err) => {
                    self.indicator.show(Phase::Fault);
                    return Err(err);
                }
            },
            OperatingMode::Notify => self.notify_session().await,
        };

        if let Err(err) = self.commit_mode(next) {
            self.indicator.show(Phase::Fault);
            return Err(err);
        }

        let Self {
            store, session_id, ..
        } = self;
        if let Err(err) = store.close() {
            // The commit is already durable; a messy close cannot strand us.
            warn!(error = %err, "mode store did not close cleanly");
        }
        info!(
            session_id = %session_id,
            next_mode = %next,
            "session complete, restart pending"
        );
        Ok(SessionEnd {
            next_mode: next,
            session_id,
        })
    }

    /// Monitor half: capture until the trigger device is sighted.
    async fn monitor_session(&mut self) -> Result<OperatingMode> {
        self.enter(SessionState::Monitoring);
        self.monitor.start().await?;
        let event = self.monitor.wait_for_match().await?;
        info!(
            sender = %event.sender,
            rssi_dbm = event.rssi_dbm,
            seen_at = %event.seen_at,
            "trigger device sighted"
        );

        self.enter(SessionState::TransitioningToNotify);
        // Stop before the commit so late frames cannot race the transition.
        if let Err(err) = self.monitor.stop().await {
            // The restart reclaims the radio regardless.
            warn!(error = %err, "capture did not stop cleanly");
        }
        Ok(OperatingMode::Notify)
    }

    /// Notify half: associate, dispatch once, and return to Monitor no
    /// matter what happened.
    async fn notify_session(&mut self) -> OperatingMode {
        self.enter(SessionState::AwaitingConnection);
        match self.association.connect().await {
            ConnectionOutcome::Connected => {
                self.enter(SessionState::Notifying);
                if let Err(err) = self.dispatcher.dispatch().await {
                    warn!(error = %err, "notification not delivered; returning to monitor");
                }
            }
            ConnectionOutcome::Failed => {
                warn!("association failed; returning to monitor without notifying");
            }
        }
        self.enter(SessionState::TransitioningToMonitor);
        OperatingMode::Monitor
    }

    /// Durably commit the mode for the next boot, with bounded retries.
    fn commit_mode(&mut self, next: OperatingMode) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.store.save(next) {
                Ok(()) => {
                    info!(mode = %next, attempt, "next mode committed");
                    return Ok(());
                }
                Err(err) if attempt <= COMMIT_RETRIES => {
                    warn!(mode = %next, attempt, error = %err, "mode commit failed; retrying");
                }
                Err(err) => {
                    error!(
                        mode = %next,
                        attempts = attempt,
                        error = %err,
                        "mode commit failed; halting without restart"
                    );
                    return Err(err.into());
                }
            }
        }
    }

    /// Log the transition and update the indicator.
    fn enter(&mut self, next: SessionState) {
        info!(from = %self.state, to = %next, "state transition");
        self.state = next;
        match next {
            SessionState::Monitoring => self.indicator.show(Phase::Monitoring),
            SessionState::AwaitingConnection => self.indicator.show(Phase::Connecting),
            SessionState::Notifying => self.indicator.show(Phase::Notifying),
            SessionState::TransitioningToMonitor | SessionState::TransitioningToNotify => {
                self.indicator.show(Phase::Restarting);
            }
            SessionState::Booting => {}
        }
    }
}

/// Run one session, then restart the device.
///
/// Returns only when the session ends in a fatal error; the caller maps it
/// to an exit code. On success the restarter diverges, so there is nothing
/// to return.
pub async fn run_forever<S, B, D, N, I, R>(
    controller: SessionController<S, B, D, N, I>,
    restarter: R,
) -> LookoutError
where
    S: ModeStore,
    B: CaptureBackend,
    D: AssociationDriver,
    N: Notifier,
    I: StatusIndicator,
    R: Restarter,
{
    match controller.run_session().await {
        Ok(end) => {
            info!(
                session_id = %end.session_id,
                next_mode = %end.next_mode,
                "restarting device"
            );
            restarter.restart()
        }
        Err(err) => err,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assoc::MockAssociation;
    use crate::config::WifiConfig;
    use crate::error::EXIT_UNAVAILABLE;
    use crate::frame::{CapturedFrame, FrameKind, MacAddr, MGMT_HEADER_LEN};
    use crate::indicator::MockIndicator;
    use crate::monitor::{ChannelPlan, FrameSink, MockCapture};
    use crate::notify::{MockNotifier, NotifyError};
    use crate::restart::PanicRestarter;
    use crate::store::MemoryModeStore;
    use crate::trigger::TriggerMatcher;

    const TRIGGER: MacAddr = MacAddr::new([0xA4, 0xCF, 0x12, 0x9B, 0x30, 0x01]);

    fn wifi(max_retries: u32) -> WifiConfig {
        WifiConfig {
            ssid: "redqueen".into(),
            passphrase: None,
            max_retries,
            attempt_timeout_secs: 5,
            retry_delay_ms: 2000,
        }
    }

    fn controller(
        store: &MemoryModeStore,
        capture: &MockCapture,
        driver: &MockAssociation,
        notifier: &MockNotifier,
        indicator: &MockIndicator,
        max_retries: u32,
    ) -> SessionController<MemoryModeStore, MockCapture, MockAssociation, MockNotifier, MockIndicator>
    {
        SessionController::new(
            store.clone(),
            PassiveMonitor::new(
                capture.clone(),
                TriggerMatcher::new(TRIGGER),
                ChannelPlan::Fixed(6),
            ),
            AssociationManager::new(driver.clone(), wifi(max_retries)),
            NotificationDispatcher::new(notifier.clone()),
            indicator.clone(),
        )
    }

    fn mgmt_frame(sender: MacAddr) -> Vec<u8> {
        let mut buf = vec![0u8; MGMT_HEADER_LEN];
        buf[0] = 0x40;
        buf[10..16].copy_from_slice(&sender.octets());
        buf
    }

    fn deliver(sink: &FrameSink, sender: MacAddr) {
        sink.deliver(CapturedFrame {
            data: &mgmt_frame(sender),
            kind: FrameKind::Management,
            rssi_dbm: Some(-51),
        });
    }

    #[tokio::test]
    async fn test_monitor_session_ignores_non_matching_frames() {
        let store = MemoryModeStore::seeded(OperatingMode::Monitor);
        let capture = MockCapture::default();
        let driver = MockAssociation::connects_immediately();
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 3);

        let mut session = tokio_test::task::spawn(controller.run_session());
        tokio_test::assert_pending!(session.poll());

        let sink = capture.sink().expect("capture started");
        let other = MacAddr::new([1, 2, 3, 4, 5, 6]);
        for _ in 0..100 {
            deliver(&sink, other);
        }

        // Still monitoring: nothing committed, nothing dispatched.
        tokio_test::assert_pending!(session.poll());
        assert!(store.saves().is_empty());
        assert!(notifier.delivered().is_empty());
        assert_eq!(capture.stops(), 0);
    }

    #[tokio::test]
    async fn test_monitor_session_commits_notify_on_match() {
        let store = MemoryModeStore::seeded(OperatingMode::Monitor);
        let capture = MockCapture::default();
        let driver = MockAssociation::connects_immediately();
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 3);

        let mut session = tokio_test::task::spawn(controller.run_session());
        tokio_test::assert_pending!(session.poll());

        let sink = capture.sink().expect("capture started");
        deliver(&sink, TRIGGER);

        let end = tokio_test::assert_ready!(session.poll()).unwrap();
        assert_eq!(end.next_mode, OperatingMode::Notify);
        assert_eq!(store.saves(), vec![OperatingMode::Notify]);
        assert_eq!(capture.stops(), 1);
        // The notification belongs to the next boot, not this one.
        assert!(notifier.delivered().is_empty());
        assert_eq!(
            indicator.shown(),
            vec![Phase::Monitoring, Phase::Restarting]
        );
    }

    #[tokio::test]
    async fn test_duplicate_matches_commit_once() {
        let store = MemoryModeStore::seeded(OperatingMode::Monitor);
        let capture = MockCapture::default();
        let driver = MockAssociation::connects_immediately();
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 3);

        let mut session = tokio_test::task::spawn(controller.run_session());
        tokio_test::assert_pending!(session.poll());

        let sink = capture.sink().expect("capture started");
        deliver(&sink, TRIGGER);
        deliver(&sink, TRIGGER);
        deliver(&sink, TRIGGER);

        let end = tokio_test::assert_ready!(session.poll()).unwrap();
        assert_eq!(end.next_mode, OperatingMode::Notify);
        assert_eq!(store.saves(), vec![OperatingMode::Notify]);
        assert_eq!(store.commit_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_session_dispatches_after_retried_association() {
        let store = MemoryModeStore::seeded(OperatingMode::Notify);
        let capture = MockCapture::default();
        let driver = MockAssociation::fails_first(2);
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 3);

        let end = controller.run_session().await.unwrap();
        assert_eq!(end.next_mode, OperatingMode::Monitor);
        assert_eq!(driver.attempts(), 3);
        assert_eq!(notifier.delivered().len(), 1);
        assert_eq!(store.saves(), vec![OperatingMode::Monitor]);
        // The radio stayed in station mode; capture never ran.
        assert_eq!(capture.starts(), 0);
        assert_eq!(
            indicator.shown(),
            vec![Phase::Connecting, Phase::Notifying, Phase::Restarting]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_session_skips_dispatch_when_budget_exhausted() {
        let store = MemoryModeStore::seeded(OperatingMode::Notify);
        let capture = MockCapture::default();
        let driver = MockAssociation::never_connects();
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 3);

        let end = controller.run_session().await.unwrap();
        assert_eq!(end.next_mode, OperatingMode::Monitor);
        assert_eq!(driver.attempts(), 4);
        assert!(notifier.delivered().is_empty());
        assert_eq!(store.saves(), vec![OperatingMode::Monitor]);
        assert_eq!(
            indicator.shown(),
            vec![Phase::Connecting, Phase::Restarting]
        );
    }

    #[tokio::test]
    async fn test_failed_notification_still_returns_to_monitor() {
        let store = MemoryModeStore::seeded(OperatingMode::Notify);
        let capture = MockCapture::default();
        let driver = MockAssociation::connects_immediately();
        let notifier = MockNotifier::fails(NotifyError::Rejected { status: 503 });
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 0);

        let end = controller.run_session().await.unwrap();
        assert_eq!(end.next_mode, OperatingMode::Monitor);
        assert_eq!(notifier.delivered().len(), 1);
        assert_eq!(store.saves(), vec![OperatingMode::Monitor]);
    }

    #[tokio::test]
    async fn test_transient_commit_failures_are_retried() {
        let store = MemoryModeStore::seeded(OperatingMode::Notify);
        store.fail_next_commits(2);
        let capture = MockCapture::default();
        let driver = MockAssociation::connects_immediately();
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 0);

        let end = controller.run_session().await.unwrap();
        assert_eq!(end.next_mode, OperatingMode::Monitor);
        assert_eq!(store.commit_attempts(), 3);
        assert_eq!(store.saves(), vec![OperatingMode::Monitor]);
    }

    #[tokio::test]
    async fn test_exhausted_commit_retries_halt_without_restart() {
        let store = MemoryModeStore::seeded(OperatingMode::Notify);
        store.fail_next_commits(usize::MAX);
        let capture = MockCapture::default();
        let driver = MockAssociation::connects_immediately();
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 0);
        let restarter = PanicRestarter::new();

        let err = run_forever(controller, restarter.clone()).await;
        assert!(matches!(err, LookoutError::StoreCommit { .. }));
        assert!(err.prevents_restart());
        assert_eq!(restarter.invocations(), 0);
        // One initial attempt plus three retries.
        assert_eq!(store.commit_attempts(), 4);
        assert_eq!(indicator.shown().last(), Some(&Phase::Fault));
    }

    #[tokio::test]
    async fn test_unreadable_store_aborts_startup() {
        let store = MemoryModeStore::failing_load();
        let capture = MockCapture::default();
        let driver = MockAssociation::connects_immediately();
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 3);

        let err = controller.run_session().await.unwrap_err();
        assert!(matches!(err, LookoutError::StoreRead(_)));
        assert_eq!(capture.starts(), 0);
        assert_eq!(indicator.shown(), vec![Phase::Fault]);
    }

    #[tokio::test]
    async fn test_capture_start_failure_is_fatal_for_the_session() {
        let store = MemoryModeStore::seeded(OperatingMode::Monitor);
        let capture = MockCapture::failing_start();
        let driver = MockAssociation::connects_immediately();
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 3);

        let err = controller.run_session().await.unwrap_err();
        assert!(matches!(err, LookoutError::CaptureStart(_)));
        assert_eq!(err.exit_code(), EXIT_UNAVAILABLE);
        assert!(store.saves().is_empty());
    }

    #[tokio::test]
    async fn test_run_forever_requests_restart_exactly_once() {
        let store = MemoryModeStore::seeded(OperatingMode::Monitor);
        let capture = MockCapture::default();
        let driver = MockAssociation::connects_immediately();
        let notifier = MockNotifier::delivers();
        let indicator = MockIndicator::new();
        let controller = controller(&store, &capture, &driver, &notifier, &indicator, 3);
        let restarter = PanicRestarter::new();

        let handle = tokio::spawn(run_forever(controller, restarter.clone()));
        let sink = loop {
            if let Some(sink) = capture.sink() {
                break sink;
            }
            tokio::task::yield_now().await;
        };
        deliver(&sink, TRIGGER);

        let join_err = handle.await.unwrap_err();
        assert!(join_err.is_panic());
        assert_eq!(restarter.invocations(), 1);
        assert_eq!(store.saves(), vec![OperatingMode::Notify]);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(SessionState::Booting.to_string(), "booting");
        assert_eq!(
            SessionState::TransitioningToNotify.to_string(),
            "transitioning-to-notify"
        );
        assert_eq!(
            SessionState::AwaitingConnection.to_string(),
            "awaiting-connection"
        );
    }
}
