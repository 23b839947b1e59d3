//! Trigger matching.
//!
//! The matcher is the only inspection performed on captured frames: a
//! byte-for-byte comparison of the sender-address field against the
//! configured trigger address. It runs inline on the capture delivery path,
//! so it must stay free of state, blocking, and allocation.

use crate::frame::{FrameHeader, MacAddr};

/// Compares captured frames against the configured trigger address.
#[derive(Debug, Clone, Copy)]
pub struct TriggerMatcher {
    trigger: MacAddr,
}

impl TriggerMatcher {
    /// Create a matcher for the given trigger address.
    #[must_use]
    pub const fn new(trigger: MacAddr) -> Self {
        Self { trigger }
    }

    /// The address this matcher looks for.
    #[must_use]
    pub const fn trigger(&self) -> MacAddr {
        self.trigger
    }

    /// Whether the frame's sender address equals the trigger address.
    ///
    /// Pure and idempotent; safe to call from the capture context.
    #[must_use]
    pub fn matches(&self, header: &FrameHeader) -> bool {
        header.sender == self.trigger
    }
}
