//! Low-level RaptorQ-family decoder: peeling, reactivation, inactivation
//! Gaussian elimination, and the inactivate-one-symbol stage of last
//! resort. Owns only symbolic state (which intermediate symbol is pinned to
//! which equation row); byte XOR is delegated entirely to the `emit`
//! callback threaded through every stage, so this type never touches a byte
//! buffer.
//!
//! There was no reference implementation of this component in the corpus
//! this crate was grounded on (the Go source only imports it as an opaque
//! dependency of its managed decoder) -- the stage machine below is a
//! direct, careful implementation of the documented state transitions and
//! invariants, using the surrounding `buffer`/`state` data structures as
//! grounding for the supporting types.

use std::collections::HashMap;

use crate::error::DecodeError;

use super::heap::BufferWeightHeap;
use super::matrix::DenseMatrix;
use super::ordered_set::OrderedSet;
use super::params::CodeParameters;
use super::state::{Buffer, IntermediateSymbol};

/// Row operation emitted by any stage, in row/buffer-index terms. The
/// managed decoder's byte layer applies `dst ^= src` for each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubAssign {
    pub dst: usize,
    pub src: usize,
}

/// Outcome of popping a single weight-1 row off `active_usable` or
/// `inactivated`. `AlreadyUsed` means the popped row referenced a symbol
/// that some other row had already pinned -- nothing new to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeelOutcome {
    Progress,
    AlreadyUsed,
}

pub struct LowLevelDecoder {
    params: CodeParameters,
    symbols: Vec<IntermediateSymbol>,
    rows: Vec<Buffer>,
    active_usable: BufferWeightHeap,
    inactivated: BufferWeightHeap,
    redundant: usize,
    source_paired: usize,
}

impl LowLevelDecoder {
    pub fn new(params: CodeParameters) -> Self {
        let k = params.k as usize;
        let s = params.s as usize;
        let h = params.h as usize;
        let l = params.l as usize;

        let mut rows: Vec<Buffer> = (0..s + h).map(|_| Buffer::new()).collect();
        let mut symbols: Vec<IntermediateSymbol> = (0..l).map(|_| IntermediateSymbol::new()).collect();

        params.g_ldpc(|row, col| {
            let r = row as usize;
            let c = col as usize;
            rows[r].insert_intermediate_symbol_id(col, true);
            symbols[c].active_insert(row);
        });
        for r in 0..s {
            let sym = (k + r) as u16;
            rows[r].insert_intermediate_symbol_id(sym, true);
            symbols[sym as usize].active_insert(r as u16);
        }
        params.g_half(|h_row, col| {
            let row = s + h_row as usize;
            let c = col as usize;
            rows[row].insert_intermediate_symbol_id(col, true);
            symbols[c].active_insert(row as u16);
        });
        for r in 0..h {
            let row = s + r;
            let sym = (k + s + r) as u16;
            rows[row].insert_intermediate_symbol_id(sym, true);
            symbols[sym as usize].active_insert(row as u16);
        }

        let mut decoder = LowLevelDecoder {
            params,
            symbols,
            rows,
            active_usable: BufferWeightHeap::new(),
            inactivated: BufferWeightHeap::new(),
            redundant: 0,
            source_paired: 0,
        };
        for idx in 0..decoder.rows.len() {
            decoder.sync_heap(idx);
        }
        decoder
    }

    pub fn params(&self) -> &CodeParameters {
        &self.params
    }

    pub fn source_paired(&self) -> usize {
        self.source_paired
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_done(&self) -> bool {
        self.source_paired >= self.params.k as usize
    }

    /// Row id that source symbol `source_id` is currently pinned to, and a
    /// check that the row has in fact collapsed to that symbol alone.
    pub fn source_symbol_row(&self, source_id: u16) -> Result<usize, DecodeError> {
        let sym = self
            .symbols
            .get(source_id as usize)
            .ok_or(DecodeError::DecodeNotDone)?;
        let row_idx = sym.used_buffer_index().ok_or(DecodeError::DecodeNotDone)?;
        if self.rows[row_idx as usize].intermediate_symbol_ids.len() != 1 {
            return Err(DecodeError::Reconstruction(format!(
                "pinning row for source symbol {source_id} did not collapse to a singleton"
            )));
        }
        Ok(row_idx as usize)
    }

    /// Registers a newly received encoding symbol's neighbor relation and
    /// returns its row/buffer index. Does not check for duplicate ESIs --
    /// that is the managed decoder's job, since only it holds the seen-ESI
    /// bitset.
    pub fn receive_symbol(
        &mut self,
        esi: u32,
        mut emit: impl FnMut(SubAssign),
    ) -> Result<usize, DecodeError> {
        if esi >= 1_000_000 {
            return Err(DecodeError::InvalidSymbol {
                esi,
                size: 0,
                expected: 0,
            });
        }

        let new_row_idx = self.rows.len();
        let mut row = Buffer::new();
        let mut pinning_rows: Vec<usize> = Vec::new();

        self.params.lt_sequence(esi, |sym_id| {
            if !row.intermediate_symbol_ids.insert(sym_id) {
                return;
            }
            let sym = &self.symbols[sym_id as usize];
            if let Some(used_row) = sym.used_buffer_index() {
                pinning_rows.push(used_row as usize);
                row.active_used_weight += 1;
            } else if sym.is_active() {
                row.active_used_weight += 1;
            }
        });

        for r in pinning_rows {
            let pinning_members = self.rows[r].intermediate_symbol_ids.clone();
            row.intermediate_symbol_ids.xor_with(&pinning_members);
            row.active_used_weight = row.active_used_weight.saturating_sub(1);
            emit(SubAssign {
                dst: new_row_idx,
                src: r,
            });
        }

        let members: Vec<u16> = row.intermediate_symbol_ids.values().to_vec();
        for sym_id in members {
            let sym = &mut self.symbols[sym_id as usize];
            if sym.is_active() || sym.is_inactivated() {
                sym.active_inactivated_push(new_row_idx as u16);
            }
        }

        self.rows.push(row);
        self.sync_heap(new_row_idx);

        Ok(new_row_idx)
    }

    /// Runs the stage machine until the source is solved or no stage makes
    /// further progress. Returns `is_done()`.
    pub fn try_decode(&mut self, threshold: usize, mut emit: impl FnMut(SubAssign)) -> bool {
        loop {
            self.reactivate_symbols(&mut emit);

            if self.peel(&mut emit) {
                continue;
            }

            if !self.try_harder(threshold) {
                return self.is_done();
            }
            if self.maybe_gauss(&mut emit) {
                continue;
            }

            if !self.try_harder(threshold) {
                return self.is_done();
            }
            if self.inactivate_one() {
                continue;
            }

            return self.is_done();
        }
    }

    fn try_harder(&self, threshold: usize) -> bool {
        self.rows.len() - self.redundant >= threshold
    }

    /// Transitions `sym_id` into `Used`, pinned to `row`. The single call
    /// site for that transition: source-symbol completion is counted here
    /// and nowhere else, so it can never be double-counted regardless of
    /// whether peeling or reactivation drove the pin.
    fn make_used(&mut self, sym_id: u16, row: u16) -> OrderedSet {
        let sym = &mut self.symbols[sym_id as usize];
        let old = if sym.is_active() {
            sym.active_make_used(row)
        } else {
            sym.inactivated_make_used(row)
        };
        if (sym_id as u32) < self.params.k as u32 {
            self.source_paired += 1;
        }
        old
    }

    fn peel(&mut self, mut emit: impl FnMut(SubAssign)) -> bool {
        let mut progressed = false;
        loop {
            match self.peel_one(&mut emit) {
                Some(PeelOutcome::Progress) => progressed = true,
                Some(PeelOutcome::AlreadyUsed) => {}
                None => break,
            }
        }
        progressed
    }

    fn peel_one(&mut self, emit: &mut impl FnMut(SubAssign)) -> Option<PeelOutcome> {
        let (row_idx, weight) = self.active_usable.peek_min()?;
        if weight != 1 {
            return None;
        }
        self.active_usable.remove_min();

        let members = self.rows[row_idx].intermediate_symbol_ids.values().to_vec();
        let target = members
            .into_iter()
            .find(|&m| {
                let s = &self.symbols[m as usize];
                s.is_active() || s.is_used()
            })
            .expect("active_used_weight==1 row without an active/used member");

        if self.symbols[target as usize].is_used() {
            self.rows[row_idx].used = true;
            return Some(PeelOutcome::AlreadyUsed);
        }

        let old_backptrs = self.make_used(target, row_idx as u16);
        self.rows[row_idx].used = true;

        let pinning_members = self.rows[row_idx].intermediate_symbol_ids.clone();
        for &reducee in old_backptrs.values() {
            if reducee as usize == row_idx {
                continue;
            }
            self.reduce_row(reducee as usize, row_idx, &pinning_members, emit);
        }

        Some(PeelOutcome::Progress)
    }

    fn reactivate_symbols(&mut self, mut emit: impl FnMut(SubAssign)) -> bool {
        let mut progressed = false;
        while let Some(outcome) = self.reactivate_one(&mut emit) {
            if outcome == PeelOutcome::Progress {
                progressed = true;
            }
        }
        progressed
    }

    fn reactivate_one(&mut self, emit: &mut impl FnMut(SubAssign)) -> Option<PeelOutcome> {
        let (row_idx, weight) = self.inactivated.peek_min()?;
        if weight != 1 {
            return None;
        }
        self.inactivated.remove_min();

        let s = self.rows[row_idx]
            .intermediate_symbol_ids
            .first()
            .expect("inactivated row with size 1 must have one member");
        debug_assert!(self.symbols[s as usize].is_inactivated());

        let old_backptrs = self.make_used(s, row_idx as u16);
        self.rows[row_idx].active_used_weight = 1;
        self.rows[row_idx].used = true;
        self.sync_heap(row_idx);

        let pinning_members = self.rows[row_idx].intermediate_symbol_ids.clone();
        for &reducee in old_backptrs.values() {
            if reducee as usize == row_idx {
                continue;
            }
            self.reduce_row(reducee as usize, row_idx, &pinning_members, emit);
        }

        Some(PeelOutcome::Progress)
    }

    fn maybe_gauss(&mut self, mut emit: impl FnMut(SubAssign)) -> bool {
        let mut row_indices: Vec<usize> = Vec::new();
        self.inactivated.for_each(|idx, _| row_indices.push(idx));
        if row_indices.is_empty() {
            return false;
        }

        let mut col_ids: Vec<u16> = Vec::new();
        for &idx in &row_indices {
            col_ids.extend_from_slice(self.rows[idx].intermediate_symbol_ids.values());
        }
        col_ids.sort_unstable();
        col_ids.dedup();

        if row_indices.len() < col_ids.len() {
            return false;
        }

        let col_pos: HashMap<u16, usize> = col_ids.iter().enumerate().map(|(i, &c)| (c, i)).collect();

        let mut matrix = DenseMatrix::new(row_indices.len(), col_ids.len());
        for (r, &idx) in row_indices.iter().enumerate() {
            for &sym in self.rows[idx].intermediate_symbol_ids.values() {
                matrix.set(r, col_pos[&sym], true);
            }
        }

        let mut ops = Vec::new();
        matrix.eliminate_full_pivot(|op| ops.push(op));
        if ops.is_empty() {
            return false;
        }

        for op in ops {
            let dst_row = row_indices[op.dst];
            let src_row = row_indices[op.src];
            let pinning_members = self.rows[src_row].intermediate_symbol_ids.clone();
            self.xor_merge_symbols(dst_row, &pinning_members);
            emit(SubAssign {
                dst: dst_row,
                src: src_row,
            });
        }

        for &idx in &row_indices {
            self.sync_heap(idx);
        }

        true
    }

    fn inactivate_one(&mut self) -> bool {
        let (row_idx, weight) = match self.active_usable.peek_min() {
            Some(v) => v,
            None => return false,
        };
        if weight <= 1 {
            return false;
        }

        let members = self.rows[row_idx].intermediate_symbol_ids.values().to_vec();
        let target = members
            .into_iter()
            .find(|&m| self.symbols[m as usize].is_active())
            .expect("active_usable row with weight>1 must contain an Active symbol");

        self.symbols[target as usize].active_inactivate();
        let backptrs: Vec<u16> = self.symbols[target as usize]
            .inactivated_values()
            .values()
            .to_vec();

        for row in backptrs {
            let idx = row as usize;
            self.rows[idx].active_used_weight = self.rows[idx].active_used_weight.saturating_sub(1);
            self.sync_heap(idx);
        }

        true
    }

    /// XOR-subtract one reducee against a pinning row's remaining members
    /// (used by Peel/Reactivate, which also carry a weight decrement).
    fn reduce_row(
        &mut self,
        reducee_idx: usize,
        pinning_idx: usize,
        pinning_members: &OrderedSet,
        emit: &mut impl FnMut(SubAssign),
    ) {
        self.xor_merge_symbols(reducee_idx, pinning_members);
        self.rows[reducee_idx].active_used_weight =
            self.rows[reducee_idx].active_used_weight.saturating_sub(1);
        self.sync_heap(reducee_idx);
        emit(SubAssign {
            dst: reducee_idx,
            src: pinning_idx,
        });
    }

    /// Set-XOR `pinning_members` into `reducee_idx`'s member set, keeping
    /// every toggled Inactivated symbol's back-pointer set in sync. Active
    /// and Used members never need a back-pointer fix-up here: an Active
    /// member only leaves a row via its own pin (handled by the caller's
    /// discarded back-pointer set), and a Used member's presence in any
    /// non-pinning row is already an invariant violation.
    fn xor_merge_symbols(&mut self, reducee_idx: usize, pinning_members: &OrderedSet) {
        let toggled = pinning_members.values().to_vec();
        self.rows[reducee_idx].intermediate_symbol_ids.xor_with(pinning_members);
        for m in toggled {
            if self.symbols[m as usize].is_inactivated() {
                if self.rows[reducee_idx].intermediate_symbol_ids.contains(m) {
                    self.symbols[m as usize].inactivated_insert(reducee_idx as u16);
                } else {
                    self.symbols[m as usize].inactivated_remove(reducee_idx as u16);
                }
            }
        }
    }

    /// Recomputes which heap (if any) row `idx` belongs to, and its key,
    /// from its current weight/size. Used after every mutation instead of
    /// tracking the delta by hand -- simpler to get right than threading
    /// incremental heap updates through every call site, and no less
    /// correct: it re-derives exactly the membership rule in invariant 4.
    fn sync_heap(&mut self, idx: usize) {
        let weight = self.rows[idx].active_used_weight;
        let size = self.rows[idx].intermediate_symbol_ids.len();
        let in_active = self.active_usable.contains(idx);
        let in_inactivated = self.inactivated.contains(idx);

        if weight > 0 {
            if in_inactivated {
                self.inactivated.remove(idx);
            }
            if in_active {
                self.active_usable.update(idx, weight);
            } else {
                self.active_usable.insert(idx, weight);
            }
        } else if size > 0 {
            if in_active {
                self.active_usable.remove(idx);
            }
            if in_inactivated {
                self.inactivated.update(idx, size as u16);
            } else {
                self.inactivated.insert(idx, size as u16);
            }
        } else if in_active {
            self.active_usable.remove(idx);
            self.redundant += 1;
        } else if in_inactivated {
            self.inactivated.remove(idx);
            self.redundant += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_populates_s_plus_h_rows() {
        let params = CodeParameters::new(10).unwrap();
        let decoder = LowLevelDecoder::new(params);
        assert_eq!(decoder.total_rows(), params.s as usize + params.h as usize);
        assert!(!decoder.is_done());
        assert_eq!(decoder.source_paired(), 0);
    }

    #[test]
    fn receive_symbol_rejects_oversized_esi() {
        let params = CodeParameters::new(4).unwrap();
        let mut decoder = LowLevelDecoder::new(params);
        let err = decoder.receive_symbol(1_000_000, |_| {}).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidSymbol {
                esi: 1_000_000,
                size: 0,
                expected: 0
            }
        );
    }

    #[test]
    fn receive_symbol_grows_row_count_monotonically() {
        let params = CodeParameters::new(4).unwrap();
        let mut decoder = LowLevelDecoder::new(params);
        let base = decoder.total_rows();
        let idx0 = decoder.receive_symbol(0, |_| {}).unwrap();
        let idx1 = decoder.receive_symbol(1, |_| {}).unwrap();
        assert_eq!(idx0, base);
        assert_eq!(idx1, base + 1);
        assert_eq!(decoder.total_rows(), base + 2);
    }

    #[test]
    fn try_decode_is_stable_once_no_stage_makes_progress() {
        let params = CodeParameters::new(20).unwrap();
        let mut decoder = LowLevelDecoder::new(params);
        for esi in 0..5u32 {
            decoder.receive_symbol(esi, |_| {}).unwrap();
        }
        let done_first = decoder.try_decode(0, |_| {});
        let paired_first = decoder.source_paired();
        let done_second = decoder.try_decode(0, |_| {});
        assert_eq!(done_first, done_second);
        assert_eq!(paired_first, decoder.source_paired());
    }

    #[test]
    fn k_one_solves_with_a_handful_of_symbols() {
        let params = CodeParameters::new(1).unwrap();
        let mut decoder = LowLevelDecoder::new(params);
        for esi in 0..16u32 {
            decoder.receive_symbol(esi, |_| {}).unwrap();
            if decoder.try_decode(0, |_| {}) {
                break;
            }
        }
        assert!(decoder.is_done());
        assert_eq!(decoder.source_paired(), 1);
        assert!(decoder.source_symbol_row(0).is_ok());
    }
}
