//! Byte-buffer-backed decoder: owns the low-level symbolic state machine
//! plus the actual payload bytes it mirrors every `SubAssign` into.

use crate::error::DecodeError;

use super::decoder::{LowLevelDecoder, SubAssign};
use super::params::CodeParameters;

/// Growable bitset of seen encoding symbol ids, used to reject duplicate
/// ESIs before they reach the low-level decoder's row bookkeeping.
#[derive(Debug, Clone, Default)]
struct SeenEsi(Vec<u64>);

impl SeenEsi {
    fn with_capacity(bits: usize) -> Self {
        SeenEsi(vec![0u64; bits.div_ceil(64).max(1)])
    }

    fn test_and_set(&mut self, esi: u32) -> bool {
        let word = esi as usize / 64;
        if word >= self.0.len() {
            self.0.resize(word + 1, 0);
        }
        let mask = 1u64 << (esi as usize % 64);
        let already = self.0[word] & mask != 0;
        self.0[word] |= mask;
        already
    }
}

/// The byte buffers a `LowLevelDecoder` mutates by row index: the first
/// `S+H` entries are zeroed temp buffers for the constraint rows created at
/// construction, every later entry is a copy of a received symbol's payload.
#[derive(Debug, Clone)]
struct BufferSet {
    symbol_size: usize,
    buffers: Vec<Vec<u8>>,
}

impl BufferSet {
    fn new(symbol_size: usize, temp_rows: usize) -> Self {
        BufferSet {
            symbol_size,
            buffers: (0..temp_rows).map(|_| vec![0u8; symbol_size]).collect(),
        }
    }

    fn push(&mut self, payload: &[u8]) {
        debug_assert_eq!(payload.len(), self.symbol_size);
        self.buffers.push(payload.to_vec());
    }

    /// `dst[i] ^= src[i]` over the full symbol, dispatched through the
    /// SIMD-capable XOR kernel shared with the rest of the optimize layer.
    fn apply(&mut self, op: SubAssign) {
        assert_ne!(op.dst, op.src, "byte-XOR of a row with itself");
        let (lo, hi) = if op.dst < op.src {
            (op.dst, op.src)
        } else {
            (op.src, op.dst)
        };
        let (left, right) = self.buffers.split_at_mut(hi);
        let (dst_buf, src_buf) = if op.dst < op.src {
            (&mut left[lo], &right[0])
        } else {
            (&mut right[0], &left[lo])
        };
        crate::optimize::xor_bytes(dst_buf, src_buf);
    }

    fn row(&self, idx: usize) -> &[u8] {
        &self.buffers[idx]
    }
}

/// A single message's decode state: code parameters, the symbolic decoder,
/// the byte mirror it drives, and duplicate-ESI tracking.
pub struct ManagedDecoder {
    params: CodeParameters,
    symbol_size: usize,
    total_size: usize,
    low: LowLevelDecoder,
    buffers: BufferSet,
    seen: SeenEsi,
}

impl ManagedDecoder {
    /// `max_redundancy` sizes the duplicate-ESI bitset up front: a message
    /// is expected to need at most `K * max_redundancy` distinct ESIs
    /// before completing (repair symbols covering loss), so pre-sizing to
    /// that bound avoids `SeenEsi` reallocating mid-decode for the common
    /// case. ESIs beyond the bound still work; the bitset just grows.
    pub fn new(params: CodeParameters, symbol_size: usize, total_size: usize, max_redundancy: usize) -> Self {
        let low = LowLevelDecoder::new(params);
        let temp_rows = low.total_rows();
        ManagedDecoder {
            params,
            symbol_size,
            total_size,
            buffers: BufferSet::new(symbol_size, temp_rows),
            seen: SeenEsi::with_capacity((params.k as usize) * max_redundancy.max(1)),
            low,
        }
    }

    pub fn params(&self) -> &CodeParameters {
        &self.params
    }

    pub fn is_done(&self) -> bool {
        self.low.is_done()
    }

    /// Validates length and duplicate status, mirrors the payload into the
    /// byte buffer set, and folds the symbol into the low-level decoder.
    pub fn receive_symbol(&mut self, esi: u32, payload: &[u8]) -> Result<(), DecodeError> {
        if payload.len() != self.symbol_size {
            return Err(DecodeError::InvalidSymbol {
                esi,
                size: payload.len(),
                expected: self.symbol_size,
            });
        }
        if self.seen.test_and_set(esi) {
            return Err(DecodeError::DuplicateSymbol(esi));
        }

        let buffers = &mut self.buffers;
        let row_idx = self.low.receive_symbol(esi, |op| buffers.apply(op))?;
        debug_assert_eq!(row_idx, buffers.buffers.len());
        buffers.push(payload);
        Ok(())
    }

    /// Inactivation threshold of `floor(1.5 * K)`, matching the low-level
    /// decoder's `try_harder` gate.
    pub fn try_decode(&mut self) -> bool {
        let threshold = (384 * self.params.k as usize) / 256;
        let threshold = threshold.max(self.params.k as usize);
        let buffers = &mut self.buffers;
        self.low.try_decode(threshold, |op| buffers.apply(op))
    }

    /// Concatenates each source symbol's pinning row, in order, and
    /// truncates to the original message length.
    pub fn reconstruct(&self) -> Result<Vec<u8>, DecodeError> {
        if !self.low.is_done() {
            return Err(DecodeError::DecodeNotDone);
        }
        let mut out = Vec::with_capacity(self.params.k as usize * self.symbol_size);
        for source_id in 0..self.params.k {
            let row_idx = self.low.source_symbol_row(source_id)?;
            out.extend_from_slice(self.buffers.row(row_idx));
        }
        out.truncate(self.total_size);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_payload_length() {
        let params = CodeParameters::new(4).unwrap();
        let mut dec = ManagedDecoder::new(params, 8, 32, 7);
        let err = dec.receive_symbol(0, &[0u8; 4]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidSymbol {
                esi: 0,
                size: 4,
                expected: 8
            }
        );
    }

    #[test]
    fn rejects_duplicate_esi() {
        let params = CodeParameters::new(4).unwrap();
        let mut dec = ManagedDecoder::new(params, 8, 32, 7);
        dec.receive_symbol(0, &[1u8; 8]).unwrap();
        let err = dec.receive_symbol(0, &[1u8; 8]).unwrap_err();
        assert_eq!(err, DecodeError::DuplicateSymbol(0));
    }

    #[test]
    fn reconstruct_before_done_fails() {
        let params = CodeParameters::new(4).unwrap();
        let dec = ManagedDecoder::new(params, 8, 32, 7);
        assert_eq!(dec.reconstruct().unwrap_err(), DecodeError::DecodeNotDone);
    }

    #[test]
    fn k_one_round_trips_a_single_symbol() {
        let params = CodeParameters::new(1).unwrap();
        let symbol_size = 16;
        let payload: Vec<u8> = (0..symbol_size as u8).collect();
        let mut dec = ManagedDecoder::new(params, symbol_size, symbol_size, 7);
        for esi in 0..16u32 {
            dec.receive_symbol(esi, &payload).unwrap();
            if dec.try_decode() {
                break;
            }
        }
        assert!(dec.is_done());
        assert_eq!(dec.reconstruct().unwrap(), payload);
    }
}
