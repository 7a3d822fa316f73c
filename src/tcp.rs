//! TCP application framing (§6): the 16-byte length-prefixed header in
//! front of every signed message, plus a mutex-protected stream assembler
//! with the same idle-timeout and periodic-flush shape as a packet-capture
//! TCP reassembler.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::chunk::SIGNATURE_LEN;
use crate::error::FramingError;

pub const TCP_HEADER_LEN: usize = 16;
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const FLUSH_OLDER_THAN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpMsgHeader {
    pub magic: u32,
    pub version: u32,
    pub length: u64,
}

impl TcpMsgHeader {
    pub fn parse(buf: &[u8], expected_magic: u32) -> Result<Self, FramingError> {
        if buf.len() < TCP_HEADER_LEN {
            return Err(FramingError::Truncation {
                offset: 0,
                needed: TCP_HEADER_LEN,
                available: buf.len(),
            });
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let length = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        if magic != expected_magic {
            return Err(FramingError::MagicMismatch {
                expected: expected_magic,
                got: magic,
            });
        }
        Ok(TcpMsgHeader { magic, version, length })
    }
}

/// A signed message's signature prefix and application payload, split out
/// of the header-declared `length` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage<'a> {
    pub signature: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> SignedMessage<'a> {
    pub fn parse(buf: &'a [u8], declared_length: u64) -> Result<Self, FramingError> {
        let declared_length = declared_length as usize;
        if declared_length <= SIGNATURE_LEN {
            return Err(FramingError::Truncation {
                offset: TCP_HEADER_LEN,
                needed: SIGNATURE_LEN + 1,
                available: declared_length,
            });
        }
        if buf.len() < declared_length {
            return Err(FramingError::Truncation {
                offset: TCP_HEADER_LEN,
                needed: declared_length,
                available: buf.len(),
            });
        }
        let body = &buf[..declared_length];
        Ok(SignedMessage {
            signature: &body[..SIGNATURE_LEN],
            payload: &body[SIGNATURE_LEN..],
        })
    }
}

/// Per-flow reassembly state. `read_tcp_stream` already frames a complete
/// message before handing it to `assemble` (two-phase length-prefixed
/// `read_exact`), so nothing downstream ever reads this flow's bytes back
/// out of the assembler -- only a running count and the idle timestamp are
/// kept, instead of an ever-growing `Vec` for as long as a connection stays
/// open.
struct FlowState {
    bytes_seen: u64,
    last_seen: Instant,
}

/// Shared, mutex-protected TCP reassembler. All `assemble`/`flush` calls go
/// through a single lock, matching the single-assembler-mutex shape the
/// capture-side manager uses upstream of this boundary.
pub struct StreamAssembler {
    flows: Mutex<HashMap<SocketAddr, FlowState>>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        StreamAssembler {
            flows: Mutex::new(HashMap::new()),
        }
    }

    /// Records `data.len()` bytes against the named flow, creating the flow
    /// if this is its first segment.
    pub fn assemble(&self, flow: SocketAddr, data: &[u8], now: Instant) {
        let mut flows = self.flows.lock().unwrap();
        let state = flows.entry(flow).or_insert_with(|| FlowState {
            bytes_seen: 0,
            last_seen: now,
        });
        state.bytes_seen += data.len() as u64;
        state.last_seen = now;
    }

    /// Drops and returns the byte counts for flows idle longer than
    /// `IDLE_TIMEOUT` as of `now`.
    pub fn flush_older_than(&self, now: Instant) -> Vec<(SocketAddr, u64)> {
        let mut flows = self.flows.lock().unwrap();
        let stale: Vec<SocketAddr> = flows
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_seen) >= IDLE_TIMEOUT)
            .map(|(&addr, _)| addr)
            .collect();
        stale
            .into_iter()
            .filter_map(|addr| flows.remove(&addr).map(|s| (addr, s.bytes_seen)))
            .collect()
    }

    /// Force-flushes every flow regardless of age, used on shutdown.
    pub fn flush_all(&self) -> Vec<(SocketAddr, u64)> {
        let mut flows = self.flows.lock().unwrap();
        flows.drain().map(|(addr, s)| (addr, s.bytes_seen)).collect()
    }
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new()
    }
}
