//! Unified error types for the lookout core library.
//!
//! This module provides a unified error type [`LookoutError`] that covers the
//! fatal failure modes of a session. Each module also has its own specific
//! error type (`ConfigError`, `StoreError`, `CaptureError`, ...) for internal
//! use; the conversions below flatten them for the controller and the binary.
//!
//! Two failure families never appear here on purpose: association failure and
//! notification failure are normal session outcomes that route the device
//! back to Monitor mode, so they stay module-local and are logged rather
//! than raised.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide operators toward resolution
//! - **Supervisor-ready**: Every error maps to a process exit code

use thiserror::Error;

use crate::config::ConfigError;
use crate::monitor::CaptureError;
use crate::store::{OperatingMode, StoreError};

/// Exit code for an intentional, supervisor-driven restart.
pub const EXIT_RESTART: i32 = 0;

/// Exit code for configuration and store faults (sysexits `EX_CONFIG`).
/// The service unit must not restart-loop on this code.
pub const EXIT_CONFIG: i32 = 78;

/// Exit code for capture faults (sysexits `EX_UNAVAILABLE`). The radio may
/// come back, so the supervisor restarts the service.
pub const EXIT_UNAVAILABLE: i32 = 69;

/// The unified error type for fatal lookout failures.
///
/// Every variant ends the session without a restart request; the binary maps
/// it to an exit code via [`exit_code`](Self::exit_code).
#[derive(Debug, Error)]
pub enum LookoutError {
    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    ConfigRead(String),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration template could not be written.
    #[error("Failed to write configuration: {0}")]
    ConfigWrite(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {field}: {reason}")]
    ConfigInvalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// No configuration directory could be determined.
    #[error("Cannot determine configuration directory")]
    ConfigDirUnavailable,

    // =========================================================================
    // MODE STORE ERRORS
    // =========================================================================
    /// The mode store could not be opened. The mode is unknowable, so
    /// startup aborts.
    #[error("Mode store unavailable: {0}")]
    StoreOpen(String),

    /// The persisted mode could not be read.
    #[error("Failed to read persisted mode: {0}")]
    StoreRead(String),

    /// The store holds bytes that do not decode to a known mode. Never
    /// defaulted over; the operator must repair or delete the store.
    #[error("Persisted mode is corrupt: {0}")]
    StoreCorrupt(String),

    /// A mode commit failed even after retries; restarting would strand the
    /// device in an unconfirmed mode.
    #[error("Failed to commit mode '{mode}': {detail}")]
    StoreCommit {
        /// The mode that was being persisted.
        mode: OperatingMode,
        /// Underlying failure.
        detail: String,
    },

    // =========================================================================
    // CAPTURE ERRORS
    // =========================================================================
    /// The radio backend could not start promiscuous reception.
    #[error("Capture failed to start: {0}")]
    CaptureStart(String),

    /// Capture died mid-session.
    #[error("Capture lost: {0}")]
    CaptureLost(String),
}

/// A specialized [`Result`] type for lookout operations.
pub type Result<T> = std::result::Result<T, LookoutError>;

impl LookoutError {
    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigRead(_)
                | Self::ConfigParse(_)
                | Self::ConfigWrite(_)
                | Self::ConfigInvalid { .. }
                | Self::ConfigDirUnavailable
        )
    }

    /// Returns `true` if this error is related to the durable mode store.
    #[inline]
    #[must_use]
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::StoreOpen(_) | Self::StoreRead(_) | Self::StoreCorrupt(_) | Self::StoreCommit { .. }
        )
    }

    /// Returns `true` if this error is related to passive capture.
    #[inline]
    #[must_use]
    pub fn is_capture_error(&self) -> bool {
        matches!(self, Self::CaptureStart(_) | Self::CaptureLost(_))
    }

    /// Returns `true` if the supervisor must halt instead of restarting:
    /// the fault needs an operator and a restart loop would not clear it.
    #[inline]
    #[must_use]
    pub fn prevents_restart(&self) -> bool {
        self.is_config_error() || self.is_store_error()
    }

    /// Returns the process exit code the binary reports for this error.
    #[inline]
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.prevents_restart() {
            EXIT_CONFIG
        } else {
            EXIT_UNAVAILABLE
        }
    }

    /// Returns a machine-readable error code for logs.
    #[inline]
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigRead(_) => "CONFIG_READ",
            Self::ConfigParse(_) => "CONFIG_PARSE",
            Self::ConfigWrite(_) => "CONFIG_WRITE",
            Self::ConfigInvalid { .. } => "CONFIG_INVALID",
            Self::ConfigDirUnavailable => "CONFIG_DIR_UNAVAILABLE",
            Self::StoreOpen(_) => "STORE_OPEN",
            Self::StoreRead(_) => "STORE_READ",
            Self::StoreCorrupt(_) => "STORE_CORRUPT",
            Self::StoreCommit { .. } => "STORE_COMMIT",
            Self::CaptureStart(_) => "CAPTURE_START",
            Self::CaptureLost(_) => "CAPTURE_LOST",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<ConfigError> for LookoutError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Read { path, source } => {
                Self::ConfigRead(format!("{}: {}", path.display(), source))
            }
            ConfigError::Parse(e) => Self::ConfigParse(e.to_string()),
            ConfigError::Render(e) => Self::ConfigWrite(e.to_string()),
            ConfigError::Write { path, source } => {
                Self::ConfigWrite(format!("{}: {}", path.display(), source))
            }
            ConfigError::Invalid { field, reason } => Self::ConfigInvalid { field, reason },
            ConfigError::NoConfigDir => Self::ConfigDirUnavailable,
        }
    }
}

impl From<StoreError> for LookoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Open { path, source } => {
                Self::StoreOpen(format!("{}: {}", path.display(), source))
            }
            StoreError::Read { source } => Self::StoreRead(source.to_string()),
            StoreError::Corrupt { detail } => Self::StoreCorrupt(detail),
            StoreError::Commit { mode, source } => Self::StoreCommit {
                mode,
                detail: source.to_string(),
            },
        }
    }
}

impl From<CaptureError> for LookoutError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Start { message } => Self::CaptureStart(message),
            CaptureError::Channel { channel, message } => {
                Self::CaptureStart(format!("channel {channel}: {message}"))
            }
            CaptureError::EmptyChannelPlan => Self::ConfigInvalid {
                field: "radio.channels",
                reason: "must list at least one channel".into(),
            },
            CaptureError::Stop { message } => Self::CaptureLost(message),
            CaptureError::NotStarted => Self::CaptureLost("monitor was never started".into()),
            CaptureError::BackendGone => {
                Self::CaptureLost("capture backend terminated unexpectedly".into())
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
