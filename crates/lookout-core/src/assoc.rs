//! Station-mode network association with a bounded retry budget.
//!
//! A Notify session gets exactly one call to
//! [`AssociationManager::connect`], which suspends until an IP-layer address
//! is obtained or the retry budget runs out. Exhausting the budget is a
//! normal outcome, not an error - the controller routes it straight back to
//! Monitor mode.
//!
//! Attempt semantics: one initial attempt plus up to `max_retries` retries,
//! so `max_retries = 0` means exactly one attempt. Each attempt is bounded
//! by a wall-clock ceiling, and consecutive attempts are separated by a
//! fixed delay.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::WifiConfig;

/// What a Notify session learned about connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Associated and holding an IP-layer address.
    Connected,
    /// Retry budget exhausted without an address.
    Failed,
}

/// Why a single association attempt did not produce an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssociationError {
    /// The attempt ended in a disconnect or supplicant failure.
    #[error("association attempt failed: {message}")]
    AttemptFailed {
        /// Driver-specific detail.
        message: String,
    },

    /// Associated but never obtained an address.
    #[error("no IP-layer address acquired: {message}")]
    NoAddress {
        /// Driver-specific detail.
        message: String,
    },
}

/// Station connectivity collaborator contract.
///
/// One call is one attempt: associate to the configured network and block
/// until an IP-layer address is held, a failure is definitive, or the caller
/// cancels the future (the manager enforces the per-attempt ceiling by
/// dropping it, so implementations must clean up on drop).
#[allow(async_fn_in_trait)]
pub trait AssociationDriver {
    /// Perform one association attempt.
    ///
    /// # Errors
    ///
    /// Any [`AssociationError`]; the manager counts it against the budget.
    async fn attempt(&mut self, network: &WifiConfig) -> Result<(), AssociationError>;
}

/// Retry-bounded association for one Notify session.
pub struct AssociationManager<D> {
    driver: D,
    network: WifiConfig,
}

impl<D: AssociationDriver> AssociationManager<D> {
    /// Create a manager driving `driver` toward the configured network.
    pub fn new(driver: D, network: WifiConfig) -> Self {
        Self { driver, network }
    }

    /// Associate with bounded retries; never returns an error.
    ///
    /// The failure counter is scoped to this call and starts at zero; it is
    /// never persisted.
    pub async fn connect(&mut self) -> ConnectionOutcome {
        let attempt_ceiling = Duration::from_secs(self.network.attempt_timeout_secs);
        let retry_delay = Duration::from_millis(self.network.retry_delay_ms);
        let mut failures: u32 = 0;

        loop {
            let attempt = failures + 1;
            info!(ssid = %self.network.ssid, attempt, "associating");

            match tokio::time::timeout(attempt_ceiling, self.driver.attempt(&self.network)).await {
                Ok(Ok(())) => {
                    info!(ssid = %self.network.ssid, attempts = attempt, "connected");
                    return ConnectionOutcome::Connected;
                }
                Ok(Err(err)) => {
                    warn!(ssid = %self.network.ssid, attempt, error = %err, "attempt failed");
                }
                Err(_elapsed) => {
                    warn!(
                        ssid = %self.network.ssid,
                        attempt,
                        ceiling_secs = self.network.attempt_timeout_secs,
                        "attempt timed out"
                    );
                }
            }

            failures += 1;
            if failures > self.network.max_retries {
                warn!(
                    ssid = %self.network.ssid,
                    failures,
                    max_retries = self.network.max_retries,
                    "retry budget exhausted"
                );
                return ConnectionOutcome::Failed;
            }
            tokio::time::sleep(retry_delay).await;
        }
    }
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

/// Scripted association driver for tests and harnesses.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone)]
pub struct MockAssociation {
    inner: std::sync::Arc<std::sync::Mutex<MockAssociationState>>,
}

#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
struct MockAssociationState {
    fail_before_success: usize,
    attempts: usize,
    hang: bool,
}

#[cfg(any(test, feature = "mock"))]
impl MockAssociation {
    fn with_state(fail_before_success: usize, hang: bool) -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::Mutex::new(MockAssociationState {
                fail_before_success,
                attempts: 0,
                hang,
            })),
        }
    }

    /// Succeeds on the first attempt.
    #[must_use]
    pub fn connects_immediately() -> Self {
        Self::with_state(0, false)
    }

    /// Fails `n` attempts, then succeeds.
    #[must_use]
    pub fn fails_first(n: usize) -> Self {
        Self::with_state(n, false)
    }

    /// Every attempt fails.
    #[must_use]
    pub fn never_connects() -> Self {
        Self::with_state(usize::MAX, false)
    }

    /// Every attempt hangs until the manager's ceiling cancels it.
    #[must_use]
    pub fn hangs() -> Self {
        Self::with_state(usize::MAX, true)
    }

    /// Attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.inner.lock().unwrap().attempts
    }
}

#[cfg(any(test, feature = "mock"))]
impl AssociationDriver for MockAssociation {
    async fn attempt(&mut self, _network: &WifiConfig) -> Result<(), AssociationError> {
        let hang = {
            let mut state = self.inner.lock().unwrap();
            state.attempts += 1;
            state.hang
        };
        if hang {
            std::future::pending::<()>().await;
        }
        let state = self.inner.lock().unwrap();
        if state.attempts <= state.fail_before_success {
            return Err(AssociationError::AttemptFailed {
                message: "scripted disconnect".into(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
