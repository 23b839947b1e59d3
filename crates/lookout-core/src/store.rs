//! The durable operating-mode flag and the store contract it lives behind.
//!
//! The whole restart-driven design hangs off one persisted scalar: which
//! mode the *next* boot should run in. The store is an external collaborator
//! (file, NVS-style flash namespace, ...) consumed through the narrow
//! [`ModeStore`] trait; the core never sees the storage format.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The two operating modes the appliance cycles between.
///
/// Persisted as a single byte; an unknown byte must surface as a load error,
/// never fall back to a default mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Passive capture, waiting for the trigger device.
    Monitor,
    /// Associate to the network and fire the one-shot notification.
    Notify,
}

impl OperatingMode {
    /// The byte written to the store for this mode.
    #[must_use]
    pub const fn as_persisted(self) -> u8 {
        match self {
            Self::Monitor => 0,
            Self::Notify => 1,
        }
    }

    /// Decode a persisted byte, `None` for anything unknown.
    #[must_use]
    pub const fn from_persisted(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Monitor),
            1 => Some(Self::Notify),
            _ => None,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monitor => f.write_str("monitor"),
            Self::Notify => f.write_str("notify"),
        }
    }
}

/// Errors from the durable mode store.
///
/// Every variant is fatal for the session: an unreadable or uncommittable
/// mode means the state machine cannot run safely (see the controller for
/// the commit-retry policy).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened or created.
    #[error("failed to open mode store at {}: {source}", path.display())]
    Open {
        /// Location of the store.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The persisted value could not be read.
    #[error("failed to read persisted mode: {source}")]
    Read {
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The store holds bytes that do not decode to a known mode.
    #[error("persisted mode record is corrupt: {detail}")]
    Corrupt {
        /// What failed to validate.
        detail: String,
    },

    /// A durable commit of the new mode failed.
    #[error("failed to commit mode '{mode}': {source}")]
    Commit {
        /// The mode that was being written.
        mode: OperatingMode,
        /// Underlying I/O failure.
        source: io::Error,
    },
}

/// Durable storage for the operating-mode flag.
///
/// Contract: [`save`](Self::save) must not return `Ok` until the value is
/// flushed to stable storage - the controller restarts the device immediately
/// after a successful save, and a lost write would strand the device in its
/// previous mode. Implementations seed [`OperatingMode::Monitor`] (with one
/// durable commit) when opening a store that has never held a value; a
/// present-but-invalid value is [`StoreError::Corrupt`], not a default.
pub trait ModeStore {
    /// Read the currently persisted mode.
    ///
    /// # Errors
    ///
    /// Any I/O or decode failure; all are fatal for startup.
    fn load(&mut self) -> Result<OperatingMode, StoreError>;

    /// Durably persist `mode`, committing before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Commit`] when the flush cannot be confirmed.
    fn save(&mut self, mode: OperatingMode) -> Result<(), StoreError>;

    /// Release the underlying handle.
    ///
    /// The default is a no-op for stores without a live handle.
    ///
    /// # Errors
    ///
    /// Implementations may report a failure to release cleanly.
    fn close(self) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        Ok(())
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory store for tests and harnesses.
///
/// Clones share one underlying state, so a test can keep a handle for
/// inspection after the controller consumes its copy.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone)]
pub struct MemoryModeStore {
    inner: std::sync::Arc<std::sync::Mutex<MemoryModeState>>,
}

#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
struct MemoryModeState {
    mode: OperatingMode,
    saves: Vec<OperatingMode>,
    commit_attempts: usize,
    fail_commits: usize,
    fail_load: bool,
}

#[cfg(any(test, feature = "mock"))]
impl MemoryModeStore {
    /// Store already holding `mode`.
    #[must_use]
    pub fn seeded(mode: OperatingMode) -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::Mutex::new(MemoryModeState {
                mode,
                saves: Vec::new(),
                commit_attempts: 0,
                fail_commits: 0,
                fail_load: false,
            })),
        }
    }

    /// Store whose every load fails.
    #[must_use]
    pub fn failing_load() -> Self {
        let store = Self::seeded(OperatingMode::Monitor);
        store.inner.lock().unwrap().fail_load = true;
        store
    }

    /// Make the next `n` commits fail before writes go through again.
    pub fn fail_next_commits(&self, n: usize) {
        self.inner.lock().unwrap().fail_commits = n;
    }

    /// Every successfully committed mode, in order.
    #[must_use]
    pub fn saves(&self) -> Vec<OperatingMode> {
        self.inner.lock().unwrap().saves.clone()
    }

    /// Save calls made, successful or not.
    #[must_use]
    pub fn commit_attempts(&self) -> usize {
        self.inner.lock().unwrap().commit_attempts
    }

    /// The mode currently held.
    #[must_use]
    pub fn mode(&self) -> OperatingMode {
        self.inner.lock().unwrap().mode
    }
}

#[cfg(any(test, feature = "mock"))]
impl ModeStore for MemoryModeStore {
    fn load(&mut self) -> Result<OperatingMode, StoreError> {
        let state = self.inner.lock().unwrap();
        if state.fail_load {
            return Err(StoreError::Read {
                source: io::Error::other("scripted load failure"),
            });
        }
        Ok(state.mode)
    }

    fn save(&mut self, mode: OperatingMode) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        state.commit_attempts += 1;
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            return Err(StoreError::Commit {
                mode,
                source: io::Error::other("scripted commit failure"),
            });
        }
        state.mode = mode;
        state.saves.push(mode);
        Ok(())
    }
}
