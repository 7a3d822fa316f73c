//! `IntermediateSymbol`, the per-variable state machine driving peeling and
//! reactivation, and `Buffer`, the per-equation-row bookkeeping the low-level
//! decoder folds symbols into.

use super::ordered_set::OrderedSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolState {
    Active,
    Inactivated,
    Used,
}

/// State of a single intermediate symbol (one unknown in the system).
///
/// `Active` and `Inactivated` both track the set of buffer rows the symbol
/// currently appears in; `Used` replaces that set with the single buffer row
/// that determines its value.
#[derive(Debug, Clone)]
pub struct IntermediateSymbol {
    state: SymbolState,
    buffer_indices: OrderedSet,
    buffer_index_used: u16,
}

impl IntermediateSymbol {
    pub fn new() -> Self {
        IntermediateSymbol {
            state: SymbolState::Active,
            buffer_indices: OrderedSet::new(),
            buffer_index_used: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SymbolState::Active
    }

    pub fn is_inactivated(&self) -> bool {
        self.state == SymbolState::Inactivated
    }

    pub fn is_used(&self) -> bool {
        self.state == SymbolState::Used
    }

    pub fn used_buffer_index(&self) -> Option<u16> {
        (self.state == SymbolState::Used).then_some(self.buffer_index_used)
    }

    /// `Active -> Used`. Returns the buffer-index set the symbol carried so
    /// the caller can fold it into the resolving buffer.
    pub fn active_make_used(&mut self, buffer_index: u16) -> OrderedSet {
        assert!(self.is_active(), "active_make_used on non-Active symbol");
        let old = std::mem::replace(&mut self.buffer_indices, OrderedSet::new());
        self.state = SymbolState::Used;
        self.buffer_index_used = buffer_index;
        old
    }

    /// `Active -> Inactivated`.
    pub fn active_inactivate(&mut self) {
        assert!(self.is_active(), "active_inactivate on non-Active symbol");
        self.state = SymbolState::Inactivated;
    }

    /// `Inactivated -> Used`. Returns the buffer-index set the symbol carried.
    pub fn inactivated_make_used(&mut self, buffer_index: u16) -> OrderedSet {
        assert!(
            self.is_inactivated(),
            "inactivated_make_used on non-Inactivated symbol"
        );
        let old = std::mem::replace(&mut self.buffer_indices, OrderedSet::new());
        self.state = SymbolState::Used;
        self.buffer_index_used = buffer_index;
        old
    }

    pub fn active_push(&mut self, buffer_index: u16) {
        assert!(self.is_active(), "active_push on non-Active symbol");
        self.buffer_indices.append(buffer_index);
    }

    /// Insert-tolerant variant of `active_push`, used where the same row
    /// could otherwise be recorded twice (e.g. a degenerate LDPC triple).
    pub fn active_insert(&mut self, buffer_index: u16) {
        assert!(self.is_active(), "active_insert on non-Active symbol");
        self.buffer_indices.insert(buffer_index);
    }

    /// Valid in `Active` or `Inactivated` state; panics on `Used`.
    pub fn active_inactivated_push(&mut self, buffer_index: u16) {
        assert!(
            self.is_active() || self.is_inactivated(),
            "active_inactivated_push on Used symbol"
        );
        self.buffer_indices.append(buffer_index);
    }

    pub fn inactivated_values(&self) -> &OrderedSet {
        assert!(
            self.is_inactivated(),
            "inactivated_values on non-Inactivated symbol"
        );
        &self.buffer_indices
    }

    pub fn inactivated_insert(&mut self, buffer_index: u16) {
        assert!(
            self.is_inactivated(),
            "inactivated_insert on non-Inactivated symbol"
        );
        self.buffer_indices.insert(buffer_index);
    }

    pub fn inactivated_remove(&mut self, buffer_index: u16) {
        assert!(
            self.is_inactivated(),
            "inactivated_remove on non-Inactivated symbol"
        );
        self.buffer_indices.remove(buffer_index);
    }
}

impl Default for IntermediateSymbol {
    fn default() -> Self {
        Self::new()
    }
}

/// A single equation row: the set of intermediate symbol ids it relates via
/// XOR, plus the peeling weight (count of members still `Active`/`Used`).
#[derive(Debug, Clone)]
pub struct Buffer {
    pub intermediate_symbol_ids: OrderedSet,
    pub active_used_weight: u16,
    pub used: bool,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer {
            intermediate_symbol_ids: OrderedSet::new(),
            active_used_weight: 0,
            used: false,
        }
    }

    pub fn append_intermediate_symbol_id(&mut self, id: u16, increment_active_used_weight: bool) {
        self.intermediate_symbol_ids.append(id);
        if increment_active_used_weight {
            self.active_used_weight += 1;
        }
    }

    /// Like `append_intermediate_symbol_id` but tolerant of an id already
    /// present (the LDPC triple can repeat a row when `S` is tiny). Weight
    /// only increments on an actual insertion.
    pub fn insert_intermediate_symbol_id(&mut self, id: u16, increment_active_used_weight: bool) {
        if self.intermediate_symbol_ids.insert(id) && increment_active_used_weight {
            self.active_used_weight += 1;
        }
    }

    pub fn first_intermediate_symbol_id(&self) -> Option<u16> {
        self.intermediate_symbol_ids.first()
    }

    /// `self ^= other` over the row's member set.
    pub fn xor_eq(&mut self, other: &Buffer) {
        self.intermediate_symbol_ids.xor_with(&other.intermediate_symbol_ids);
    }

    pub fn is_paired(&self) -> bool {
        self.active_used_weight == 1
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_symbol_is_active() {
        let s = IntermediateSymbol::new();
        assert!(s.is_active());
        assert!(s.used_buffer_index().is_none());
    }

    #[test]
    fn active_to_used_transition_carries_old_indices() {
        let mut s = IntermediateSymbol::new();
        s.active_push(3);
        s.active_push(7);
        let old = s.active_make_used(99);
        assert!(s.is_used());
        assert_eq!(s.used_buffer_index(), Some(99));
        assert_eq!(old.values(), &[3, 7]);
    }

    #[test]
    fn active_to_inactivated_then_used() {
        let mut s = IntermediateSymbol::new();
        s.active_push(1);
        s.active_inactivate();
        assert!(s.is_inactivated());
        s.inactivated_insert(2);
        s.inactivated_remove(1);
        assert_eq!(s.inactivated_values().values(), &[2]);
        let old = s.inactivated_make_used(5);
        assert!(s.is_used());
        assert_eq!(old.values(), &[2]);
    }

    #[test]
    #[should_panic]
    fn active_push_on_used_symbol_panics() {
        let mut s = IntermediateSymbol::new();
        let _ = s.active_make_used(0);
        s.active_push(1);
    }

    #[test]
    fn buffer_xor_eq_cancels_shared_members() {
        let mut a = Buffer::new();
        a.append_intermediate_symbol_id(1, true);
        a.append_intermediate_symbol_id(2, true);
        let mut b = Buffer::new();
        b.append_intermediate_symbol_id(2, true);
        b.append_intermediate_symbol_id(3, true);
        a.xor_eq(&b);
        assert_eq!(a.intermediate_symbol_ids.values(), &[1, 3]);
    }

    #[test]
    fn is_paired_reflects_weight() {
        let mut b = Buffer::new();
        assert!(!b.is_paired());
        b.append_intermediate_symbol_id(1, true);
        assert!(b.is_paired());
        b.append_intermediate_symbol_id(2, true);
        assert!(!b.is_paired());
    }
}
