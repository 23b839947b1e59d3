//! Hardware addresses and the 802.11 MAC header view.
//!
//! The radio backend hands the monitor raw frame buffers; everything the
//! rest of the system needs is extracted here with fixed-offset reads:
//! - [`MacAddr`] - a 6-byte hardware address with string parsing for config
//! - [`FrameHeader`] - the fixed-layout MAC header (addresses, sequence control)
//! - [`FrameKind`] - the coarse frame type taken from the frame-control field
//!
//! Parsing works on plain byte slices and never allocates, so it is safe to
//! run inline on the capture delivery path. Buffers are borrowed for the
//! duration of one delivery only; anything needed later must be copied out.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of the management-frame MAC header (three addresses).
pub const MGMT_HEADER_LEN: usize = 24;

/// Header length when the optional fourth address is present.
const FOUR_ADDR_HEADER_LEN: usize = 30;

/// A 6-byte IEEE 802 hardware (MAC) address.
///
/// Displayed and parsed in the usual colon-separated hex form
/// (`aa:bb:cc:dd:ee:ff`); hyphens and uppercase are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Address length in bytes.
    pub const LEN: usize = 6;

    /// The all-ones broadcast address.
    pub const BROADCAST: Self = Self([0xFF; 6]);

    /// Create an address from its octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// The raw octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Read an address from the first six bytes of `buf`.
    ///
    /// Returns `None` if the slice is shorter than six bytes.
    #[must_use]
    pub fn from_slice(buf: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = buf.get(..Self::LEN)?.try_into().ok()?;
        Some(Self(octets))
    }

    /// Whether this is the broadcast address.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Whether the group (multicast) bit is set.
    #[must_use]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Whether the locally-administered bit is set.
    ///
    /// Phones randomize their probe-request source addresses with this bit
    /// set, which is why a trigger address should normally be the device's
    /// real (universally administered) address.
    #[must_use]
    pub const fn is_locally_administered(&self) -> bool {
        self.0[0] & 0x02 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Error returned when a hardware address string does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid hardware address '{input}': expected six colon-separated hex octets")]
pub struct MacParseError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reject = || MacParseError { input: s.to_string() };

        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split([':', '-']) {
            if count == 6 || part.len() != 2 {
                return Err(reject());
            }
            octets[count] = u8::from_str_radix(part, 16).map_err(|_| reject())?;
            count += 1;
        }
        if count != 6 {
            return Err(reject());
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Coarse 802.11 frame type, from bits 2-3 of the first frame-control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Control-plane frames: probe requests, beacons, (de)association, ...
    Management,
    /// RTS/CTS/ACK and friends.
    Control,
    /// Payload-bearing frames.
    Data,
    /// 802.11ad+ extension frames.
    Extension,
}

impl FrameKind {
    /// Decode the type field from the first frame-control byte.
    #[must_use]
    pub const fn from_frame_control(fc0: u8) -> Self {
        match (fc0 >> 2) & 0b11 {
            0 => Self::Management,
            1 => Self::Control,
            2 => Self::Data,
            _ => Self::Extension,
        }
    }
}

/// Errors from fixed-offset frame header extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The buffer ends before the fixed-layout header does.
    #[error("frame truncated: header needs {needed} bytes, got {got}")]
    Truncated {
        /// Bytes the header layout requires.
        needed: usize,
        /// Bytes actually present.
        got: usize,
    },
}

/// The fixed-layout 802.11 MAC header.
///
/// Field names follow what the addresses mean for management frames:
/// `receiver` is addr1, `sender` is addr2 (the transmitting device - the
/// field the trigger match inspects), `filtering` is addr3 (the BSSID).
/// The fourth address only exists on data frames bridged between two
/// distribution systems and is `None` for everything this system captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw frame-control bytes.
    pub frame_control: [u8; 2],
    /// Duration/ID field.
    pub duration: u16,
    /// Address 1: intended receiver.
    pub receiver: MacAddr,
    /// Address 2: sender (transmitter) hardware address.
    pub sender: MacAddr,
    /// Address 3: filtering address (BSSID).
    pub filtering: MacAddr,
    /// Raw sequence-control field.
    pub sequence_control: u16,
    /// Address 4, present only when both DS bits are set.
    pub addr4: Option<MacAddr>,
}

impl FrameHeader {
    /// Extract the header from the start of a captured frame buffer.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] when the buffer is shorter than the
    /// header layout requires (24 bytes, or 30 with a fourth address).
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < MGMT_HEADER_LEN {
            return Err(FrameError::Truncated {
                needed: MGMT_HEADER_LEN,
                got: buf.len(),
            });
        }

        let frame_control = [buf[0], buf[1]];
        // Both DS bits set means a fourth address follows the sequence field.
        let has_addr4 = frame_control[1] & 0x03 == 0x03;
        if has_addr4 && buf.len() < FOUR_ADDR_HEADER_LEN {
            return Err(FrameError::Truncated {
                needed: FOUR_ADDR_HEADER_LEN,
                got: buf.len(),
            });
        }

        // Offsets fixed by the 802.11 MAC header layout; lengths were
        // checked above.
        let addr_at = |at: usize| {
            let mut octets = [0u8; 6];
            octets.copy_from_slice(&buf[at..at + 6]);
            MacAddr::new(octets)
        };
        let receiver = addr_at(4);
        let sender = addr_at(10);
        let filtering = addr_at(16);
        let addr4 = has_addr4.then(|| addr_at(24));

        Ok(Self {
            frame_control,
            duration: u16::from_le_bytes([buf[2], buf[3]]),
            receiver,
            sender,
            filtering,
            sequence_control: u16::from_le_bytes([buf[22], buf[23]]),
            addr4,
        })
    }

    /// The coarse frame type.
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        FrameKind::from_frame_control(self.frame_control[0])
    }

    /// The frame subtype (bits 4-7 of the first frame-control byte).
    #[must_use]
    pub const fn subtype(&self) -> u8 {
        self.frame_control[0] >> 4
    }

    /// Sequence number portion of the sequence-control field.
    #[must_use]
    pub const fn sequence_number(&self) -> u16 {
        self.sequence_control >> 4
    }

    /// Fragment number portion of the sequence-control field.
    #[must_use]
    pub const fn fragment_number(&self) -> u16 {
        self.sequence_control & 0x0F
    }
}

/// One captured frame as delivered by the radio backend.
///
/// The buffer is owned by the backend and valid only for the duration of
/// the delivery; nothing here may be retained past it.
#[derive(Debug, Clone, Copy)]
pub struct CapturedFrame<'a> {
    /// The raw frame bytes, starting at the MAC header.
    pub data: &'a [u8],
    /// Frame type as declared by the backend.
    pub kind: FrameKind,
    /// Received signal strength, when the capture path reports one.
    pub rssi_dbm: Option<i8>,
}

impl CapturedFrame<'_> {
    /// Parse the MAC header of this frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] for buffers shorter than the header.
    pub fn header(&self) -> Result<FrameHeader, FrameError> {
        FrameHeader::parse(self.data)
    }
}

// =============================================================================
// TESTS
// =============================================================================
