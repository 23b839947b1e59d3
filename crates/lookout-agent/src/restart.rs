//! Restart execution for deployed devices.

use std::process::Command;

use lookout_core::config::RestartStrategy;
use lookout_core::error::EXIT_RESTART;
use lookout_core::restart::Restarter;
use tracing::{info, warn};

/// [`Restarter`] matching the configured strategy: exit and let the
/// supervisor respawn the process, or reboot the whole device.
#[derive(Debug)]
pub struct DeviceRestarter {
    strategy: RestartStrategy,
}

impl DeviceRestarter {
    /// Restart with `strategy`.
    #[must_use]
    pub const fn new(strategy: RestartStrategy) -> Self {
        Self { strategy }
    }
}

impl Restarter for DeviceRestarter {
    fn restart(&self) -> ! {
        match self.strategy {
            RestartStrategy::Process => {
                info!(exit_code = EXIT_RESTART, "exiting for supervisor restart");
            }
            RestartStrategy::Reboot => {
                info!("requesting device reboot");
                match Command::new("systemctl").arg("reboot").status() {
                    Ok(status) if status.success() => {}
                    Ok(status) => {
                        warn!(%status, "systemctl reboot refused, exiting for restart instead");
                    }
                    Err(err) => {
                        warn!(error = %err, "systemctl reboot unavailable, exiting for restart instead");
                    }
                }
            }
        }
        std::process::exit(EXIT_RESTART);
    }
}
