//! Chunk header codec (§4.I): the fixed little-endian envelope every UDP
//! fan-out slice carries in front of its RaptorQ-family payload.

use sha2::{Digest, Sha256};

use crate::error::FramingError;

pub const SIGNATURE_LEN: usize = 65;
pub const FINGERPRINT_LEN: usize = 20;
const HEADER_FIXED_LEN: usize = SIGNATURE_LEN + 2 + 1 + 8 + 8 + FINGERPRINT_LEN + 4;

/// The app-message fingerprint is the first 20 bytes of a hash of the fully
/// assembled message (glossary). Used once reconstruction completes to spot
/// a fingerprint collision or a corrupted reassembly -- never to accept or
/// reject a chunk on the way in, since an in-flight message's hash isn't
/// knowable until every chunk has arrived.
pub fn compute_fingerprint(assembled_message: &[u8]) -> [u8; FINGERPRINT_LEN] {
    let digest = Sha256::digest(assembled_message);
    let mut fp = [0u8; FINGERPRINT_LEN];
    fp.copy_from_slice(&digest[..FINGERPRINT_LEN]);
    fp
}

/// Flags byte at offset 67: bit7 broadcast, bit6 secondary-broadcast,
/// bits0-3 Merkle-tree depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFlags(pub u8);

impl ChunkFlags {
    pub fn broadcast(self) -> bool {
        self.0 & 0x80 != 0
    }

    pub fn secondary_broadcast(self) -> bool {
        self.0 & 0x40 != 0
    }

    pub fn merkle_depth(self) -> u8 {
        self.0 & 0x0F
    }
}

/// A fully parsed chunk header plus the payload slice that follows it,
/// borrowed from the original datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader<'a> {
    pub signature: &'a [u8],
    pub version: u16,
    pub flags: ChunkFlags,
    pub epoch: u64,
    pub timestamp_ms: u64,
    pub fingerprint: [u8; FINGERPRINT_LEN],
    pub total_length: u32,
    pub merkle_siblings: &'a [u8],
    pub recipient: &'a [u8],
    pub leaf_index: u8,
    pub esi: u16,
    pub payload: &'a [u8],
}

fn need(buf: &[u8], offset: usize, len: usize) -> Result<(), FramingError> {
    if buf.len() < offset + len {
        Err(FramingError::Truncation {
            offset,
            needed: len,
            available: buf.len().saturating_sub(offset),
        })
    } else {
        Ok(())
    }
}

impl<'a> ChunkHeader<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, FramingError> {
        need(buf, 0, HEADER_FIXED_LEN)?;

        let signature = &buf[0..65];
        let version = u16::from_le_bytes([buf[65], buf[66]]);
        let flags = ChunkFlags(buf[67]);
        let epoch = u64::from_le_bytes(buf[68..76].try_into().unwrap());
        let timestamp_ms = u64::from_le_bytes(buf[76..84].try_into().unwrap());
        let mut fingerprint = [0u8; FINGERPRINT_LEN];
        fingerprint.copy_from_slice(&buf[84..104]);
        let total_length = u32::from_le_bytes(buf[104..108].try_into().unwrap());

        let depth = flags.merkle_depth() as usize;
        let siblings_len = depth.saturating_sub(1) * FINGERPRINT_LEN;
        let mut offset = HEADER_FIXED_LEN;

        need(buf, offset, siblings_len)?;
        let merkle_siblings = &buf[offset..offset + siblings_len];
        offset += siblings_len;

        need(buf, offset, FINGERPRINT_LEN)?;
        let recipient = &buf[offset..offset + FINGERPRINT_LEN];
        offset += FINGERPRINT_LEN;

        need(buf, offset, 1)?;
        let leaf_index = buf[offset];
        offset += 1;

        need(buf, offset, 1)?;
        offset += 1; // reserved

        need(buf, offset, 2)?;
        let esi = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
        offset += 2;

        let payload = &buf[offset..];

        Ok(ChunkHeader {
            signature,
            version,
            flags,
            epoch,
            timestamp_ms,
            fingerprint,
            total_length,
            merkle_siblings,
            recipient,
            leaf_index,
            esi,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(depth: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0xABu8; SIGNATURE_LEN]);
        buf.extend_from_slice(&7u16.to_le_bytes());
        buf.push(depth & 0x0F);
        buf.extend_from_slice(&42u64.to_le_bytes());
        buf.extend_from_slice(&1_700_000_000_000u64.to_le_bytes());
        buf.extend_from_slice(&[0x11u8; FINGERPRINT_LEN]);
        buf.extend_from_slice(&13u32.to_le_bytes());
        let siblings = depth.saturating_sub(1) as usize;
        for _ in 0..siblings {
            buf.extend_from_slice(&[0x22u8; FINGERPRINT_LEN]);
        }
        buf.extend_from_slice(&[0x33u8; FINGERPRINT_LEN]);
        buf.push(3); // leaf index
        buf.push(0); // reserved
        buf.extend_from_slice(&9u16.to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn parses_a_well_formed_header() {
        let buf = sample_header(2, b"hello");
        let h = ChunkHeader::parse(&buf).unwrap();
        assert_eq!(h.version, 7);
        assert_eq!(h.epoch, 42);
        assert_eq!(h.fingerprint, [0x11u8; FINGERPRINT_LEN]);
        assert_eq!(h.total_length, 13);
        assert_eq!(h.merkle_siblings.len(), FINGERPRINT_LEN);
        assert_eq!(h.leaf_index, 3);
        assert_eq!(h.esi, 9);
        assert_eq!(h.payload, b"hello");
    }

    #[test]
    fn zero_depth_has_no_siblings() {
        let buf = sample_header(0, b"x");
        let h = ChunkHeader::parse(&buf).unwrap();
        assert!(h.merkle_siblings.is_empty());
    }

    #[test]
    fn truncated_fixed_header_is_rejected() {
        let buf = vec![0u8; HEADER_FIXED_LEN - 1];
        let err = ChunkHeader::parse(&buf).unwrap_err();
        assert!(matches!(err, FramingError::Truncation { offset: 0, .. }));
    }

    #[test]
    fn fingerprint_is_stable_and_content_dependent() {
        let a = compute_fingerprint(b"hello world");
        let b = compute_fingerprint(b"hello world");
        let c = compute_fingerprint(b"hello world!");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn truncated_variable_tail_is_rejected() {
        let full = sample_header(3, b"payload");
        // Cut right after the recipient field, before leaf/reserved/ESI.
        let cut = HEADER_FIXED_LEN + 2 * FINGERPRINT_LEN + FINGERPRINT_LEN;
        let truncated = &full[..cut];
        assert!(ChunkHeader::parse(truncated).is_err());
    }
}
