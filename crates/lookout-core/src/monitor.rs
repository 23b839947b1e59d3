//! Passive capture monitoring.
//!
//! The monitor owns the seam between the radio backend's asynchronous frame
//! delivery and the controller's sequential wait loop:
//!
//! - [`CaptureBackend`] - the thin radio collaborator (promiscuous bring-up,
//!   channel set, raw frame delivery)
//! - [`FrameSink`] - what the backend calls per captured frame; gates to
//!   management frames, runs the trigger match inline, and converts the
//!   first match into one [`MatchEvent`] on a bounded channel
//! - [`PassiveMonitor`] - start/stop lifecycle, channel sweep, and
//!   [`wait_for_match`](PassiveMonitor::wait_for_match) for the controller
//!
//! The delivery path never blocks and never allocates: an armed latch
//! (atomic swap) guarantees at most one event per session before the channel
//! is even touched, so duplicate frames from the trigger device cannot cause
//! a second transition.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::frame::{CapturedFrame, FrameKind, MacAddr};
use crate::trigger::TriggerMatcher;

/// Depth of the match-event channel. One event ends the session, so this
/// only needs headroom for the latch being momentarily generous.
const MATCH_QUEUE_DEPTH: usize = 8;

/// Channel selection policy for the capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPlan {
    /// Stay on a single channel.
    Fixed(u8),
    /// Round-robin across `channels`, switching every `dwell`.
    Sweep {
        /// Channels to rotate through, in order.
        channels: Vec<u8>,
        /// Time spent on each channel.
        dwell: Duration,
    },
}

impl ChannelPlan {
    /// The channel the session starts on.
    #[must_use]
    pub fn first_channel(&self) -> Option<u8> {
        match self {
            Self::Fixed(channel) => Some(*channel),
            Self::Sweep { channels, .. } => channels.first().copied(),
        }
    }
}

/// The copied record of a trigger sighting, sent from the capture context to
/// the controller. Everything is owned; nothing borrows the frame buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    /// Sender address that matched the trigger.
    pub sender: MacAddr,
    /// Signal strength at capture time, when the backend reports one.
    pub rssi_dbm: Option<i8>,
    /// When the frame was seen.
    pub seen_at: DateTime<Utc>,
}

/// Errors from the capture side of a Monitor session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The backend could not enter promiscuous reception.
    #[error("capture backend failed to start: {message}")]
    Start {
        /// Backend-specific detail.
        message: String,
    },

    /// A channel change was rejected.
    #[error("failed to set channel {channel}: {message}")]
    Channel {
        /// The requested channel.
        channel: u8,
        /// Backend-specific detail.
        message: String,
    },

    /// The backend could not shut down cleanly.
    #[error("capture backend failed to stop: {message}")]
    Stop {
        /// Backend-specific detail.
        message: String,
    },

    /// A sweep plan without channels cannot monitor anything.
    #[error("channel plan has no channels")]
    EmptyChannelPlan,

    /// The monitor was asked to wait before being started.
    #[error("monitor is not started")]
    NotStarted,

    /// The backend dropped its sink mid-session (capture process died).
    #[error("capture backend terminated unexpectedly")]
    BackendGone,
}

/// Radio collaborator contract.
///
/// `start` must configure promiscuous reception restricted to management
/// frames, keep the [`FrameSink`] for the lifetime of the capture, and
/// return without blocking on frame arrival - delivery happens on the
/// backend's own execution context via [`FrameSink::deliver`]. Dropping the
/// sink signals the monitor that capture has died.
#[allow(async_fn_in_trait)]
pub trait CaptureBackend {
    /// Enter promiscuous reception and begin delivering frames to `sink`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Start`] when the radio cannot be brought up.
    async fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError>;

    /// Tune to `channel`. Frames dropped during the switch are acceptable.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Channel`] when the backend rejects the change.
    async fn set_channel(&mut self, channel: u8) -> Result<(), CaptureError>;

    /// Leave promiscuous reception and stop delivering frames.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Stop`] when teardown fails.
    async fn stop(&mut self) -> Result<(), CaptureError>;
}

/// Per-frame entry point handed to the backend.
///
/// Cheap to clone; all clones share the same latch and counters. The sink
/// holds the sending half of the match channel, so when the backend drops
/// its last clone the monitor's wait loop observes the closure.
#[derive(Debug, Clone)]
pub struct FrameSink {
    matcher: TriggerMatcher,
    armed: Arc<AtomicBool>,
    frames_seen: Arc<AtomicU64>,
    tx: mpsc::Sender<MatchEvent>,
}

impl FrameSink {
    /// Process one captured frame.
    ///
    /// Non-management frames, frames too short to carry a MAC header, and
    /// frames whose sender is not the trigger are dropped without effect.
    /// The first matching frame disarms the latch and enqueues a single
    /// [`MatchEvent`]; everything after that is short-circuited.
    pub fn deliver(&self, frame: CapturedFrame<'_>) {
        if frame.kind != FrameKind::Management {
            return;
        }
        let Ok(header) = frame.header() else {
            // Malformed capture; not worth more than a trace.
            return;
        };
        self.frames_seen.fetch_add(1, Ordering::Relaxed);

        if !self.matcher.matches(&header) {
            return;
        }
        // swap(false) returns the previous value: only the first matching
        // frame observes `true` and gets to send.
        if !self.armed.swap(false, Ordering::AcqRel) {
            return;
        }

        let event = MatchEvent {
            sender: header.sender,
            rssi_dbm: frame.rssi_dbm,
            seen_at: Utc::now(),
        };
        if let Err(err) = self.tx.try_send(event) {
            // Channel closed (session already tearing down) or full; either
            // way the latch stays down - at most one transition per session.
            debug!(error = %err, "match event not enqueued");
        }
    }
}

/// The passive capture monitor: lifecycle, sweep, and match wait loop.
pub struct PassiveMonitor<B> {
    backend: B,
    matcher: TriggerMatcher,
    plan: ChannelPlan,
    armed: Arc<AtomicBool>,
    frames_seen: Arc<AtomicU64>,
    rx: Option<mpsc::Receiver<MatchEvent>>,
    started: bool,
    sweep_idx: usize,
}

impl<B: CaptureBackend> PassiveMonitor<B> {
    /// Create a monitor over `backend` for the given trigger and plan.
    pub fn new(backend: B, matcher: TriggerMatcher, plan: ChannelPlan) -> Self {
        Self {
            backend,
            matcher,
            plan,
            armed: Arc::new(AtomicBool::new(false)),
            frames_seen: Arc::new(AtomicU64::new(0)),
            rx: None,
            started: false,
            sweep_idx: 1,
        }
    }

    /// Start promiscuous capture and arm the trigger latch.
    ///
    /// Returns once the backend is delivering; it does not wait for frames.
    ///
    /// # Errors
    ///
    /// [`CaptureError::EmptyChannelPlan`] for a sweep without channels,
    /// otherwise whatever the backend start or initial channel set reports.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.started {
            return Ok(());
        }
        let Some(first_channel) = self.plan.first_channel() else {
            return Err(CaptureError::EmptyChannelPlan);
        };

        let (tx, rx) = mpsc::channel(MATCH_QUEUE_DEPTH);
        self.armed.store(true, Ordering::Release);
        self.frames_seen.store(0, Ordering::Relaxed);
        let sink = FrameSink {
            matcher: self.matcher,
            armed: Arc::clone(&self.armed),
            frames_seen: Arc::clone(&self.frames_seen),
            tx,
        };

        self.backend.start(sink).await?;
        self.backend.set_channel(first_channel).await?;
        self.rx = Some(rx);
        self.started = true;
        self.sweep_idx = 1;
        debug!(channel = first_channel, "passive capture started");
        Ok(())
    }

    /// Suspend until the trigger device is sighted.
    ///
    /// Drives the channel sweep (when configured) while waiting. Mid-sweep
    /// channel failures are logged and skipped - a dropped switch loses at
    /// worst a dwell period of frames, which the contract allows.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotStarted`] before [`start`](Self::start), or
    /// [`CaptureError::BackendGone`] if the backend dropped its sink.
    pub async fn wait_for_match(&mut self) -> Result<MatchEvent, CaptureError> {
        let Self {
            backend,
            plan,
            rx,
            sweep_idx,
            ..
        } = self;
        let rx = rx.as_mut().ok_or(CaptureError::NotStarted)?;

        match plan {
            ChannelPlan::Fixed(_) => rx.recv().await.ok_or(CaptureError::BackendGone),
            ChannelPlan::Sweep { channels, dwell } => loop {
                tokio::select! {
                    event = rx.recv() => return event.ok_or(CaptureError::BackendGone),
                    () = tokio::time::sleep(*dwell) => {
                        let channel = channels[*sweep_idx % channels.len()];
                        *sweep_idx += 1;
                        if let Err(err) = backend.set_channel(channel).await {
                            warn!(channel, error = %err, "channel sweep switch failed");
                        }
                    }
                }
            },
        }
    }

    /// Disarm the latch and stop the backend.
    ///
    /// Calling this when already stopped (or never started) has no effect
    /// and raises no error.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Stop`] when the backend fails to tear down.
    pub async fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.started {
            return Ok(());
        }
        // Short-circuit delivery before teardown so late frames cannot latch.
        self.armed.store(false, Ordering::Release);
        self.backend.stop().await?;
        self.started = false;
        self.rx = None;
        info!(
            frames_seen = self.frames_seen.load(Ordering::Relaxed),
            "passive capture stopped"
        );
        Ok(())
    }

    /// Management frames delivered so far this session.
    #[must_use]
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen.load(Ordering::Relaxed)
    }

    /// Whether the latch would accept a match right now.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

// =============================================================================
// MOCK BACKEND
// =============================================================================

/// In-memory capture backend for tests and harnesses.
///
/// Records lifecycle calls and hands the sink back out so a test can play
/// frames into the monitor by hand.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone, Default)]
pub struct MockCapture {
    inner: Arc<std::sync::Mutex<MockCaptureState>>,
}

#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Default)]
struct MockCaptureState {
    sink: Option<FrameSink>,
    starts: usize,
    stops: usize,
    channels: Vec<u8>,
    fail_start: bool,
}

#[cfg(any(test, feature = "mock"))]
impl MockCapture {
    /// A backend whose `start` fails.
    #[must_use]
    pub fn failing_start() -> Self {
        let mock = Self::default();
        mock.inner.lock().unwrap().fail_start = true;
        mock
    }

    /// The sink most recently handed to `start`, if any.
    #[must_use]
    pub fn sink(&self) -> Option<FrameSink> {
        self.inner.lock().unwrap().sink.clone()
    }

    /// Drop the held sink, simulating a dead capture process.
    pub fn drop_sink(&self) {
        self.inner.lock().unwrap().sink = None;
    }

    /// Number of `start` calls.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.inner.lock().unwrap().starts
    }

    /// Number of `stop` calls.
    #[must_use]
    pub fn stops(&self) -> usize {
        self.inner.lock().unwrap().stops
    }

    /// Channels set, in order (including the initial one).
    #[must_use]
    pub fn channels(&self) -> Vec<u8> {
        self.inner.lock().unwrap().channels.clone()
    }
}

#[cfg(any(test, feature = "mock"))]
impl CaptureBackend for MockCapture {
    async fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_start {
            return Err(CaptureError::Start {
                message: "injected start failure".into(),
            });
        }
        state.starts += 1;
        state.sink = Some(sink);
        Ok(())
    }

    async fn set_channel(&mut self, channel: u8) -> Result<(), CaptureError> {
        self.inner.lock().unwrap().channels.push(channel);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        let mut state = self.inner.lock().unwrap();
        state.stops += 1;
        state.sink = None;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
