//! Monitor-mode capture through a `tcpdump` subprocess.
//!
//! The interface is flipped to monitor type with `ip`/`iw`, then `tcpdump`
//! streams a pcap capture of management frames over stdout. A pump task
//! splits the stream into frames and feeds them to the monitor's sink; when
//! the process dies the pump ends, the sink drops, and the monitor's wait
//! loop observes the loss.
//!
//! Monitor type persists in the kernel across our own restarts, so
//! [`stop`](TcpdumpCapture::stop) hands the interface back to managed type
//! before the Notify boot needs it for association.

use std::process::Stdio;
use std::time::Duration;

use lookout_core::frame::{CapturedFrame, FrameKind};
use lookout_core::monitor::{CaptureBackend, CaptureError, FrameSink};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::cmd::run_checked;
use crate::pcap::PcapSplitter;

/// Capture length per frame. The MAC header plus a radiotap header fit with
/// plenty of room; frame bodies are never inspected.
const SNAP_LEN: &str = "256";

/// Read size for the stdout pump.
const READ_CHUNK: usize = 4096;

/// tcpdump announces the capture on stderr with this marker once the
/// interface is open.
const READY_MARKER: &str = "listening on";

/// How long to wait for the ready marker before declaring the start failed.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// [`CaptureBackend`] over a `tcpdump` child process.
#[derive(Debug)]
pub struct TcpdumpCapture {
    interface: String,
    child: Option<Child>,
    pump: Option<JoinHandle<()>>,
}

impl TcpdumpCapture {
    /// Capture on `interface` (e.g. `wlan0`).
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            child: None,
            pump: None,
        }
    }

    /// Cycle the interface down, switch its type, and bring it back up.
    async fn set_interface_type(&self, ty: &str) -> Result<(), String> {
        debug!(interface = %self.interface, ty, "switching interface type");
        run_checked("ip", &["link", "set", &self.interface, "down"])
            .await
            .map_err(|err| format!("link down: {err}"))?;
        run_checked("iw", &["dev", &self.interface, "set", "type", ty])
            .await
            .map_err(|err| format!("set type {ty}: {err}"))?;
        run_checked("ip", &["link", "set", &self.interface, "up"])
            .await
            .map_err(|err| format!("link up: {err}"))
    }
}

/// Argument list for the capture process. `-U` flushes per packet so frames
/// reach the pump as they arrive; the trailing filter keeps everything but
/// management frames out of the stream.
fn tcpdump_args(interface: &str) -> Vec<String> {
    [
        "-i", interface, "-U", "-n", "-s", SNAP_LEN, "-w", "-", "type", "mgt",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl CaptureBackend for TcpdumpCapture {
    async fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        let start_err = |message: String| CaptureError::Start { message };

        self.set_interface_type("monitor").await.map_err(start_err)?;

        let mut child = Command::new("tcpdump")
            .args(tcpdump_args(&self.interface))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| start_err(format!("failed to spawn tcpdump: {err}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| start_err("tcpdump stdout was not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| start_err("tcpdump stderr was not piped".into()))?;

        // tcpdump reports the open capture on stderr before the first
        // packet; treat silence or early exit as a failed start.
        let mut stderr_lines = BufReader::new(stderr).lines();
        let ready = tokio::time::timeout(READY_TIMEOUT, async {
            while let Ok(Some(line)) = stderr_lines.next_line().await {
                debug!("tcpdump: {line}");
                if line.contains(READY_MARKER) {
                    return true;
                }
            }
            false
        })
        .await;
        match ready {
            Ok(true) => {}
            Ok(false) => {
                let _ = child.kill().await;
                return Err(start_err("tcpdump exited before capturing".into()));
            }
            Err(_elapsed) => {
                let _ = child.kill().await;
                return Err(start_err(format!(
                    "tcpdump not ready within {}s",
                    READY_TIMEOUT.as_secs()
                )));
            }
        }

        tokio::spawn(drain_stderr(stderr_lines));
        self.pump = Some(tokio::spawn(async move {
            pump_frames(stdout, |frame| sink.deliver(frame)).await;
        }));
        self.child = Some(child);
        Ok(())
    }

    async fn set_channel(&mut self, channel: u8) -> Result<(), CaptureError> {
        let channel_arg = channel.to_string();
        run_checked("iw", &["dev", &self.interface, "set", "channel", &channel_arg])
            .await
            .map_err(|message| CaptureError::Channel { channel, message })
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
        // Association in the next boot needs the interface back in managed
        // type; a failure here is its problem to report, not ours.
        if let Err(message) = self.set_interface_type("managed").await {
            warn!(interface = %self.interface, error = %message, "failed to restore managed type");
        }
        Ok(())
    }
}

/// Read the pcap stream from `reader` and hand each frame to `deliver`.
/// Returns when the stream ends or becomes unparseable.
async fn pump_frames<R, F>(mut reader: R, deliver: F)
where
    R: AsyncRead + Unpin,
    F: Fn(CapturedFrame<'_>),
{
    let mut splitter = PcapSplitter::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("capture stream closed");
                return;
            }
            Ok(n) => {
                splitter.extend(&chunk[..n]);
                loop {
                    match splitter.next_frame() {
                        Ok(Some(record)) => {
                            // Splitter records are never empty.
                            let kind = FrameKind::from_frame_control(record.payload[0]);
                            deliver(CapturedFrame {
                                data: &record.payload,
                                kind,
                                rssi_dbm: record.rssi_dbm,
                            });
                        }
                        Ok(None) => break,
                        Err(err) => {
                            error!(error = %err, "capture stream unparseable");
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                error!(error = %err, "capture stream read failed");
                return;
            }
        }
    }
}

async fn drain_stderr(mut lines: tokio::io::Lines<BufReader<ChildStderr>>) {
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("tcpdump: {line}");
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcpdump_args_shape() {
        let args = tcpdump_args("wlan0");
        assert_eq!(args[0..2], ["-i", "wlan0"]);
        assert!(args.contains(&"-U".to_string()));
        assert_eq!(args[args.len() - 4..], ["-w", "-", "type", "mgt"]);
    }

    #[tokio::test]
    async fn test_pump_delivers_stream_frames() {
        use std::cell::RefCell;

        // Classic little-endian pcap stream: global header, then one bare
        // 802.11 management frame.
        let mut frame = vec![0u8; 24];
        frame[0] = 0x40;
        frame[10..16].copy_from_slice(&[0xA4, 0xCF, 0x12, 0x9B, 0x30, 0x01]);

        let mut stream = vec![0u8; 24];
        stream[0..4].copy_from_slice(&[0xD4, 0xC3, 0xB2, 0xA1]);
        stream[20] = 105;
        let mut record_header = vec![0u8; 16];
        record_header[8] = 24;
        record_header[12] = 24;
        stream.extend_from_slice(&record_header);
        stream.extend_from_slice(&frame);

        let seen = RefCell::new(Vec::new());
        pump_frames(stream.as_slice(), |captured: CapturedFrame<'_>| {
            seen.borrow_mut().push((captured.kind, captured.data.to_vec()));
        })
        .await;

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, FrameKind::Management);
        assert_eq!(seen[0].1, frame);
    }
}
