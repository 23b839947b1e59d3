//! # lookout-agent
//!
//! Device agent library for the lookout presence-triggered notifier.
//!
//! This library provides the hardware-facing implementations of the
//! `lookout-core` collaborator traits, as deployed on a small Linux box with
//! one Wi-Fi radio:
//!
//! - [`store`] - atomic single-file mode store under `/var/lib/lookout`
//! - [`pcap`] - incremental pcap stream splitter and radiotap handling
//! - [`capture`] - monitor-mode capture via a `tcpdump` subprocess
//! - [`wifi`] - station association via `nmcli`
//! - [`notify`] - webhook delivery over HTTPS
//! - [`indicator`] - sysfs LED status display
//! - [`restart`] - process-exit or whole-device restart
//! - [`logging`] - environment-aware tracing setup

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod capture;
mod cmd;
pub mod indicator;
pub mod logging;
pub mod notify;
pub mod pcap;
pub mod restart;
pub mod store;
pub mod wifi;
