//! The restart primitive that ends every session.
//!
//! Control never resumes in the same boot after a restart: the contract is a
//! diverging call, issued by the controller only after the next mode has been
//! committed to the store.

/// Irreversible restart.
pub trait Restarter {
    /// Restart the device. Never returns.
    fn restart(&self) -> !;
}

/// Diverges by panicking with a known message, so tests can drive
/// the restart path on a task and observe the panic instead of dying.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone, Default)]
pub struct PanicRestarter {
    invocations: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

/// Panic message used by [`PanicRestarter`].
#[cfg(any(test, feature = "mock"))]
pub const RESTART_PANIC: &str = "restart requested";

#[cfg(any(test, feature = "mock"))]
impl PanicRestarter {
    /// Fresh counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times restart was requested.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.invocations.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "mock"))]
impl Restarter for PanicRestarter {
    fn restart(&self) -> ! {
        self.invocations
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        panic!("{RESTART_PANIC}");
    }
}
