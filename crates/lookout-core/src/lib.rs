//! # lookout-core
//!
//! Core state machine for the lookout presence-triggered notifier.
//!
//! A lookout device alternates between two whole-boot modes: passively
//! watching for a trusted device's management frames, and (after a sighting
//! and a restart) connecting to a network to deliver a one-shot webhook
//! notification. One radio cannot do both at once, so the persisted mode
//! flag plus a restart is the mode switch.
//!
//! This crate provides:
//! - 802.11 MAC header parsing and hardware-address handling
//! - The trigger matcher and passive capture monitor
//! - The durable mode store contract
//! - Bounded-retry network association and one-shot notification dispatch
//! - The session controller driving one boot's state machine
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`frame`] - 802.11 MAC header layout, frame kinds, hardware addresses
//! - [`trigger`] - Pure sender-address matching against the trigger device
//! - [`monitor`] - Capture backend contract, frame sink, channel sweep
//! - [`store`] - Durable operating-mode flag contract
//! - [`assoc`] - Station association with a bounded retry budget
//! - [`notify`] - One-shot notification dispatch
//! - [`indicator`] - Status LED contract
//! - [`restart`] - Diverging device-restart contract
//! - [`session`] - The per-boot mode transition controller
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Unified error types for the crate
//!
//! Every hardware-facing seam is a trait; the `mock` feature exports the
//! in-memory implementations used by the test suite for external harnesses.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod assoc;
pub mod config;
pub mod error;
pub mod frame;
pub mod indicator;
pub mod monitor;
pub mod notify;
pub mod restart;
pub mod session;
pub mod store;
pub mod trigger;

// Re-export primary types for convenience
#[cfg(feature = "mock")]
pub use assoc::MockAssociation;
pub use assoc::{AssociationDriver, AssociationError, AssociationManager, ConnectionOutcome};
pub use config::{
    Config, ConfigError, IndicatorConfig, NotifyConfig, RadioConfig, RestartConfig,
    RestartStrategy, StoreConfig, TriggerConfig, WifiConfig,
};
pub use error::{LookoutError, Result, EXIT_CONFIG, EXIT_RESTART, EXIT_UNAVAILABLE};
pub use frame::{CapturedFrame, FrameError, FrameHeader, FrameKind, MacAddr, MacParseError};
#[cfg(feature = "mock")]
pub use indicator::MockIndicator;
pub use indicator::{NullIndicator, Phase, StatusIndicator};
#[cfg(feature = "mock")]
pub use monitor::MockCapture;
pub use monitor::{CaptureBackend, CaptureError, ChannelPlan, FrameSink, MatchEvent, PassiveMonitor};
#[cfg(feature = "mock")]
pub use notify::MockNotifier;
pub use notify::{Notification, NotificationDispatcher, Notifier, NotifyError};
#[cfg(feature = "mock")]
pub use restart::PanicRestarter;
pub use restart::Restarter;
pub use session::{run_forever, SessionController, SessionEnd, SessionState};
#[cfg(feature = "mock")]
pub use store::MemoryModeStore;
pub use store::{ModeStore, OperatingMode, StoreError};
pub use trigger::TriggerMatcher;
