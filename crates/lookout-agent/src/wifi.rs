//! Station association through NetworkManager.
//!
//! One [`attempt`](lookout_core::assoc::AssociationDriver::attempt) is one
//! `nmcli device wifi connect`, which blocks through association and DHCP,
//! followed by an `ip addr` check that an IPv4 address is actually held.
//! NetworkManager owns supplicant state, so a cancelled attempt needs no
//! cleanup beyond killing the `nmcli` process, which happens when the
//! command future is dropped.
//!
//! Monitor type survives our restarts in the kernel, so the first attempt of
//! a boot puts the interface back to managed type before asking
//! NetworkManager for anything.

use lookout_core::assoc::{AssociationDriver, AssociationError};
use lookout_core::config::WifiConfig;
use tracing::debug;

use crate::cmd::{run_checked, run_for_stdout};

/// [`AssociationDriver`] over the `nmcli` command-line client.
#[derive(Debug)]
pub struct NmcliAssociation {
    interface: String,
    prepared: bool,
}

impl NmcliAssociation {
    /// Associate using `interface` (e.g. `wlan0`).
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            prepared: false,
        }
    }

    /// Put the interface back into managed type after a Monitor boot. A
    /// failure is not fatal here; if the interface is truly unusable the
    /// association attempt will say so with a better message.
    async fn ensure_managed(&self) -> Result<(), String> {
        debug!(interface = %self.interface, "restoring managed type");
        run_checked("ip", &["link", "set", &self.interface, "down"])
            .await
            .map_err(|err| format!("link down: {err}"))?;
        run_checked("iw", &["dev", &self.interface, "set", "type", "managed"])
            .await
            .map_err(|err| format!("set type managed: {err}"))?;
        run_checked("ip", &["link", "set", &self.interface, "up"])
            .await
            .map_err(|err| format!("link up: {err}"))
    }

    async fn holds_ipv4_address(&self) -> Result<bool, String> {
        let stdout = run_for_stdout("ip", &["-4", "-o", "addr", "show", "dev", &self.interface])
            .await
            .map_err(|err| format!("address check: {err}"))?;
        Ok(stdout.contains("inet "))
    }
}

/// `nmcli` argument list for one connect attempt. The passphrase rides on
/// the command line, which is why callers must never log these arguments.
fn connect_args(interface: &str, network: &WifiConfig) -> Vec<String> {
    let mut args = vec![
        "device".to_string(),
        "wifi".to_string(),
        "connect".to_string(),
        network.ssid.clone(),
    ];
    if let Some(passphrase) = &network.passphrase {
        args.push("password".to_string());
        args.push(passphrase.clone());
    }
    args.push("ifname".to_string());
    args.push(interface.to_string());
    args
}

impl AssociationDriver for NmcliAssociation {
    async fn attempt(&mut self, network: &WifiConfig) -> Result<(), AssociationError> {
        if !self.prepared {
            if let Err(message) = self.ensure_managed().await {
                debug!(error = %message, "managed-type restore reported failure");
            }
            self.prepared = true;
        }

        debug!(interface = %self.interface, ssid = %network.ssid, "requesting association");
        let args = connect_args(&self.interface, network);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        run_checked("nmcli", &arg_refs)
            .await
            .map_err(|message| AssociationError::AttemptFailed { message })?;

        // nmcli reports success at activation; confirm the lease actually
        // arrived before calling this attempt good.
        match self.holds_ipv4_address().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AssociationError::NoAddress {
                message: format!("no IPv4 address on {}", self.interface),
            }),
            Err(message) => Err(AssociationError::AttemptFailed { message }),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn network(passphrase: Option<&str>) -> WifiConfig {
        WifiConfig {
            ssid: "backhaul".to_string(),
            passphrase: passphrase.map(String::from),
            max_retries: 3,
            attempt_timeout_secs: 20,
            retry_delay_ms: 2000,
        }
    }

    #[test]
    fn test_connect_args_with_passphrase() {
        let args = connect_args("wlan0", &network(Some("hunter22")));
        assert_eq!(
            args,
            [
                "device", "wifi", "connect", "backhaul", "password", "hunter22", "ifname", "wlan0"
            ]
        );
    }

    #[test]
    fn test_connect_args_open_network() {
        let args = connect_args("wlan0", &network(None));
        assert_eq!(args, ["device", "wifi", "connect", "backhaul", "ifname", "wlan0"]);
    }
}
