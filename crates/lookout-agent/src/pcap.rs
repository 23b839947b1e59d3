//! Incremental pcap stream parsing.
//!
//! `tcpdump -w -` emits a classic pcap stream: one 24-byte global header,
//! then 16-byte record headers each followed by the captured bytes. The
//! splitter consumes that stream in whatever chunk sizes the pipe delivers
//! and yields complete frames.
//!
//! Only the two 802.11 link types are accepted. For radiotap captures the
//! per-frame header is stripped and the dBm antenna signal pulled out when
//! the capture card reported one; the consumer sees the bare management
//! frame either way.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

/// Bare IEEE 802.11 frames.
const LINKTYPE_IEEE802_11: u32 = 105;
/// IEEE 802.11 frames preceded by a radiotap header.
const LINKTYPE_RADIOTAP: u32 = 127;

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

/// Upper bound on a single record's captured length. Anything past this is
/// not a frame our snap length could have produced; the stream is out of
/// sync and cannot be resynchronized.
const MAX_RECORD_LEN: u32 = 256 * 1024;

/// dBm antenna signal is bit 5 of the radiotap present bitmask. The fields
/// that can precede it, in bit order: TSFT, Flags, Rate, Channel, FHSS.
const RADIOTAP_FIELDS_BEFORE_SIGNAL: [(usize, usize); 5] =
    [(8, 8), (1, 1), (1, 1), (4, 2), (2, 1)];
const RADIOTAP_SIGNAL_BIT: u32 = 5;
const RADIOTAP_EXT_BIT: u32 = 31;

// =============================================================================
// ERRORS
// =============================================================================

/// Failure to make sense of the pcap stream. All variants are fatal: pcap
/// has no record framing to resynchronize on.
#[derive(Debug, Error)]
pub enum PcapError {
    /// The stream did not start with a known pcap magic number.
    #[error("unrecognized pcap magic {magic:#010x}")]
    BadMagic {
        /// First four stream bytes, read big-endian.
        magic: u32,
    },

    /// The capture is not 802.11; the interface is misconfigured.
    #[error("unsupported link type {linktype}, expected 802.11 (105) or radiotap (127)")]
    UnsupportedLinkType {
        /// Link type from the global header.
        linktype: u32,
    },

    /// A record header claims a length no capture could produce.
    #[error("record length {len} exceeds maximum {MAX_RECORD_LEN}")]
    OversizedRecord {
        /// Claimed captured length.
        len: u32,
    },
}

// =============================================================================
// TYPES
// =============================================================================

/// One parsed capture record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    /// The 802.11 frame, radiotap header already stripped.
    pub payload: Vec<u8>,
    /// Antenna signal in dBm, when the radiotap header carried one.
    pub rssi_dbm: Option<i8>,
}

#[derive(Debug, Clone, Copy)]
struct StreamHeader {
    big_endian: bool,
    linktype: u32,
}

impl StreamHeader {
    fn read_u32(self, bytes: &[u8]) -> u32 {
        if self.big_endian {
            BigEndian::read_u32(bytes)
        } else {
            LittleEndian::read_u32(bytes)
        }
    }
}

/// Streaming pcap parser. Feed it bytes as they arrive, drain frames as
/// they complete.
#[derive(Debug, Default)]
pub struct PcapSplitter {
    buffer: Vec<u8>,
    header: Option<StreamHeader>,
}

impl PcapSplitter {
    /// Create a splitter expecting a fresh stream, global header first.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the capture pipe.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pull the next complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Records whose radiotap
    /// header is malformed, or that contain no frame at all, are dropped and
    /// parsing continues with the next record.
    ///
    /// # Errors
    ///
    /// Any [`PcapError`]; the splitter is unusable afterwards.
    pub fn next_frame(&mut self) -> Result<Option<CaptureRecord>, PcapError> {
        let header = match self.header {
            Some(header) => header,
            None => match self.parse_global_header()? {
                Some(header) => header,
                None => return Ok(None),
            },
        };

        loop {
            if self.buffer.len() < RECORD_HEADER_LEN {
                return Ok(None);
            }
            let incl_len = header.read_u32(&self.buffer[8..12]);
            if incl_len > MAX_RECORD_LEN {
                return Err(PcapError::OversizedRecord { len: incl_len });
            }
            let record_end = RECORD_HEADER_LEN + incl_len as usize;
            if self.buffer.len() < record_end {
                return Ok(None);
            }

            let payload: Vec<u8> = self
                .buffer
                .drain(..record_end)
                .skip(RECORD_HEADER_LEN)
                .collect();

            let record = match header.linktype {
                LINKTYPE_RADIOTAP => split_radiotap(&payload),
                _ => (!payload.is_empty()).then(|| CaptureRecord {
                    payload,
                    rssi_dbm: None,
                }),
            };
            if let Some(record) = record {
                return Ok(Some(record));
            }
        }
    }

    fn parse_global_header(&mut self) -> Result<Option<StreamHeader>, PcapError> {
        if self.buffer.len() < GLOBAL_HEADER_LEN {
            return Ok(None);
        }
        // Magic doubles as the byte-order probe. Both the microsecond and
        // nanosecond variants are accepted; timestamps go unused here.
        let big_endian = match [self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]] {
            [0xA1, 0xB2, 0xC3, 0xD4] | [0xA1, 0xB2, 0x3C, 0x4D] => true,
            [0xD4, 0xC3, 0xB2, 0xA1] | [0x4D, 0x3C, 0xB2, 0xA1] => false,
            magic => {
                return Err(PcapError::BadMagic {
                    magic: BigEndian::read_u32(&magic),
                })
            }
        };
        let linktype = if big_endian {
            BigEndian::read_u32(&self.buffer[20..24])
        } else {
            LittleEndian::read_u32(&self.buffer[20..24])
        };
        if linktype != LINKTYPE_IEEE802_11 && linktype != LINKTYPE_RADIOTAP {
            return Err(PcapError::UnsupportedLinkType { linktype });
        }
        let header = StreamHeader {
            big_endian,
            linktype,
        };
        self.buffer.drain(..GLOBAL_HEADER_LEN);
        self.header = Some(header);
        Ok(Some(header))
    }
}

// =============================================================================
// RADIOTAP
// =============================================================================

/// Strip the radiotap header from `payload`, extracting the antenna signal
/// on the way past. Returns `None` when the header is malformed or nothing
/// follows it.
fn split_radiotap(payload: &[u8]) -> Option<CaptureRecord> {
    // Radiotap is little-endian regardless of the pcap byte order.
    if payload.len() < 8 || payload[0] != 0 {
        return None;
    }
    let radiotap_len = usize::from(LittleEndian::read_u16(&payload[2..4]));
    if radiotap_len < 8 || radiotap_len > payload.len() {
        return None;
    }

    let rssi_dbm = radiotap_rssi(&payload[..radiotap_len]);
    let frame = &payload[radiotap_len..];
    (!frame.is_empty()).then(|| CaptureRecord {
        payload: frame.to_vec(),
        rssi_dbm,
    })
}

/// Walk the present bitmask far enough to find the dBm antenna signal.
fn radiotap_rssi(header: &[u8]) -> Option<i8> {
    let mut present_end = 4;
    loop {
        if present_end + 4 > header.len() {
            return None;
        }
        let word = LittleEndian::read_u32(&header[present_end..present_end + 4]);
        present_end += 4;
        if word & (1 << RADIOTAP_EXT_BIT) == 0 {
            break;
        }
    }

    // Fields appear in bit order after the present words, each aligned to
    // its natural boundary relative to the start of the header.
    let present = LittleEndian::read_u32(&header[4..8]);
    if present & (1 << RADIOTAP_SIGNAL_BIT) == 0 {
        return None;
    }
    let mut cursor = present_end;
    for (bit, &(size, align)) in RADIOTAP_FIELDS_BEFORE_SIGNAL.iter().enumerate() {
        if present & (1 << bit) != 0 {
            cursor = cursor.div_ceil(align) * align;
            cursor += size;
        }
    }
    let byte = *header.get(cursor)?;
    Some(i8::from_le_bytes([byte]))
}

// =============================================================================
// TESTS
// =============================================================================
