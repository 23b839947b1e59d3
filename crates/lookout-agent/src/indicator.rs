//! Status display on a sysfs LED.
//!
//! Kernel LED class devices expose `trigger` and `brightness` attributes
//! under `/sys/class/leds/<name>/`. The kernel's own trigger machinery does
//! the blinking, so showing a phase costs one or two attribute writes and
//! no timers on our side.
//!
//! Display is cosmetic: write failures are logged at debug and swallowed,
//! per the [`StatusIndicator`] contract.

use std::path::PathBuf;

use lookout_core::indicator::{Phase, StatusIndicator};
use tracing::debug;

/// `(trigger, brightness)` attribute values for a phase. Brightness only
/// needs touching when the trigger is `none`; an active trigger drives it.
fn led_settings(phase: Phase) -> (&'static str, Option<&'static str>) {
    match phase {
        Phase::Monitoring => ("heartbeat", None),
        Phase::Connecting | Phase::Notifying => ("timer", None),
        Phase::Restarting => ("none", Some("0")),
        Phase::Fault => ("none", Some("1")),
    }
}

/// [`StatusIndicator`] over one kernel LED class device.
#[derive(Debug)]
pub struct LedIndicator {
    base: PathBuf,
}

impl LedIndicator {
    /// Drive the LED named `name` under `/sys/class/leds`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            base: PathBuf::from("/sys/class/leds").join(name),
        }
    }

    /// Drive a LED device rooted at `base` directly. Exists for tests and
    /// nonstandard sysfs mounts.
    #[must_use]
    pub const fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    fn write_attr(&self, attr: &str, value: &str) {
        let path = self.base.join(attr);
        if let Err(err) = std::fs::write(&path, value) {
            debug!(path = %path.display(), value, error = %err, "led attribute write failed");
        }
    }
}

impl StatusIndicator for LedIndicator {
    fn show(&mut self, phase: Phase) {
        let (trigger, brightness) = led_settings(phase);
        self.write_attr("trigger", trigger);
        if let Some(brightness) = brightness {
            self.write_attr("brightness", brightness);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn read(dir: &tempfile::TempDir, attr: &str) -> String {
        std::fs::read_to_string(dir.path().join(attr)).unwrap()
    }

    #[test]
    fn test_monitoring_uses_kernel_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let mut led = LedIndicator::with_base(dir.path().to_path_buf());
        led.show(Phase::Monitoring);
        assert_eq!(read(&dir, "trigger"), "heartbeat");
        assert!(!dir.path().join("brightness").exists());
    }

    #[test]
    fn test_fault_is_solid_on() {
        let dir = tempfile::tempdir().unwrap();
        let mut led = LedIndicator::with_base(dir.path().to_path_buf());
        led.show(Phase::Fault);
        assert_eq!(read(&dir, "trigger"), "none");
        assert_eq!(read(&dir, "brightness"), "1");
    }

    #[test]
    fn test_restarting_turns_led_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut led = LedIndicator::with_base(dir.path().to_path_buf());
        led.show(Phase::Connecting);
        led.show(Phase::Restarting);
        assert_eq!(read(&dir, "trigger"), "none");
        assert_eq!(read(&dir, "brightness"), "0");
    }

    #[test]
    fn test_missing_device_is_harmless() {
        let mut led = LedIndicator::with_base(PathBuf::from("/nonexistent/led0"));
        led.show(Phase::Monitoring);
        led.show(Phase::Fault);
    }
}
