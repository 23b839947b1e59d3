//! Visible status for a headless box.
//!
//! Indicators are advisory: the trait is infallible and implementations
//! swallow their own IO failures, because a dead LED must never take the
//! session down with it.

use std::fmt;

/// Coarse session phase, as shown to a person looking at the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Passively watching for the trigger.
    Monitoring,
    /// Associating to the network.
    Connecting,
    /// Delivering the notification.
    Notifying,
    /// About to restart.
    Restarting,
    /// Unrecoverable fault, operator needed.
    Fault,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Monitoring => "monitoring",
            Self::Connecting => "connecting",
            Self::Notifying => "notifying",
            Self::Restarting => "restarting",
            Self::Fault => "fault",
        };
        f.write_str(label)
    }
}

/// Phase display contract.
pub trait StatusIndicator {
    /// Show `phase`. Must not fail and must not block meaningfully.
    fn show(&mut self, phase: Phase);
}

impl<T: StatusIndicator + ?Sized> StatusIndicator for Box<T> {
    fn show(&mut self, phase: Phase) {
        (**self).show(phase);
    }
}

/// Indicator for devices with nothing to blink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn show(&mut self, _phase: Phase) {}
}

/// Recording indicator for tests and harnesses.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone, Default)]
pub struct MockIndicator {
    shown: std::sync::Arc<std::sync::Mutex<Vec<Phase>>>,
}

#[cfg(any(test, feature = "mock"))]
impl MockIndicator {
    /// Fresh recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Phases shown so far, in order.
    #[must_use]
    pub fn shown(&self) -> Vec<Phase> {
        self.shown.lock().unwrap().clone()
    }
}

#[cfg(any(test, feature = "mock"))]
impl StatusIndicator for MockIndicator {
    fn show(&mut self, phase: Phase) {
        self.shown.lock().unwrap().push(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_preserves_order() {
        let mut indicator = MockIndicator::new();
        indicator.show(Phase::Monitoring);
        indicator.show(Phase::Restarting);
        assert_eq!(indicator.shown(), vec![Phase::Monitoring, Phase::Restarting]);
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Connecting.to_string(), "connecting");
        assert_eq!(Phase::Fault.to_string(), "fault");
    }
}
