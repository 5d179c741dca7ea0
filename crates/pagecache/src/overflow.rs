//! Per-page overflow-object lifecycle tracker (C3, spec §4.5).
//!
//! An overflow block can only ever be in one of four states:
//! `Ovfl` (live, referenced by the page currently being built),
//! `OvflDiscard` (tentatively retired — it was live before this
//! reconciliation started, but hasn't been re-confirmed yet),
//! `Block` (scheduled for `block_free` regardless — an explicit
//! discard, not a tentative one), and `Empty` (freed, slot reusable).

use std::collections::HashMap;

use crate::block::BlockManager;
use crate::cell::BlockRef;
use crate::error::Result;

/// Capacity grows in chunks of this size (spec §4.5), mirrored here as
/// the `Vec::reserve` step rather than a literal fixed-size reallocation
/// the way the source's C array does it.
const GROWTH_CHUNK: usize = 20;

/// One overflow object's lifecycle state.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OverflowState {
    /// Scheduled to be freed regardless of reuse (an explicit discard).
    Block,
    /// Live: referenced by the page as currently built.
    Ovfl,
    /// Tentatively retired; will be freed at commit unless reused.
    OvflDiscard,
    /// Freed; the slot carries no live information.
    Empty,
}

#[derive(Copy, Clone, Debug)]
struct OverflowEntry {
    state: OverflowState,
    block_ref: BlockRef,
}

/// Per-page registry of overflow blocks.
#[derive(Default)]
pub struct OverflowTracker {
    entries: Vec<OverflowEntry>,
}

impl OverflowTracker {
    /// A tracker pre-populated with the overflow blocks already live on
    /// the page from a previous reconciliation.
    pub fn from_existing(live: impl IntoIterator<Item = BlockRef>) -> OverflowTracker {
        let mut entries = Vec::new();
        entries.reserve(GROWTH_CHUNK);
        for block_ref in live {
            entries.push(OverflowEntry { state: OverflowState::Ovfl, block_ref });
        }
        OverflowTracker { entries }
    }

    /// Step 1 of the lifecycle: every currently-`Ovfl` entry is demoted
    /// to `OvflDiscard`, tentative retirement pending reuse.
    pub fn begin(&mut self) {
        for entry in self.entries.iter_mut() {
            if entry.state == OverflowState::Ovfl {
                entry.state = OverflowState::OvflDiscard;
            }
        }
    }

    /// Build a value overflow: search for a matching `OvflDiscard` entry
    /// by the *original* block it replaces and reuse its `(addr, size)`
    /// if found (no block write); otherwise write a fresh overflow
    /// block. `original` is `None` when the value was never previously
    /// an overflow (there is nothing to reuse).
    pub fn build_value_overflow(
        &mut self,
        original: Option<BlockRef>,
        data: &[u8],
        block_mgr: &dyn BlockManager,
    ) -> Result<BlockRef> {
        if let Some(orig) = original {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| e.state == OverflowState::OvflDiscard && e.block_ref == orig)
            {
                entry.state = OverflowState::Ovfl;
                return Ok(entry.block_ref);
            }
        }
        let block_ref = block_mgr.block_write(data)?;
        if self.entries.len() == self.entries.capacity() {
            self.entries.reserve(GROWTH_CHUNK);
        }
        self.entries.push(OverflowEntry { state: OverflowState::Ovfl, block_ref });
        Ok(block_ref)
    }

    /// Explicit cell discard: an original overflow key/value is no
    /// longer referenced (superseded by an update, or deleted).
    /// Unconditionally scheduled for `block_free` at commit, regardless
    /// of whether a matching `OvflDiscard` entry exists.
    pub fn discard(&mut self, block_ref: BlockRef) {
        if self.entries.len() == self.entries.capacity() {
            self.entries.reserve(GROWTH_CHUNK);
        }
        self.entries.push(OverflowEntry { state: OverflowState::Block, block_ref });
    }

    /// Mark a block as still actively referenced without going through
    /// `build_value_overflow` — used by the variable-column writer's
    /// overflow-with-no-update fast path, which rewrites a cell
    /// raw without ever asking the tracker to reuse/write anything, but
    /// must still keep the block alive.
    pub fn keep_active(&mut self, block_ref: BlockRef) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.block_ref == block_ref) {
            entry.state = OverflowState::Ovfl;
        } else {
            self.entries.push(OverflowEntry { state: OverflowState::Ovfl, block_ref });
        }
    }

    /// Commit (wrap-up): free every `OvflDiscard` or `Block` entry,
    /// reset it to `Empty`; `Ovfl` entries survive to the next
    /// reconciliation. Returns the blocks that were freed, for callers
    /// that want to log or assert on them.
    pub fn commit(&mut self, block_mgr: &dyn BlockManager) -> Result<Vec<BlockRef>> {
        let mut freed = Vec::new();
        for entry in self.entries.iter_mut() {
            match entry.state {
                OverflowState::OvflDiscard | OverflowState::Block => {
                    block_mgr.block_free(entry.block_ref)?;
                    freed.push(entry.block_ref);
                    entry.state = OverflowState::Empty;
                }
                OverflowState::Ovfl | OverflowState::Empty => {}
            }
        }
        self.entries.retain(|e| e.state != OverflowState::Empty);
        Ok(freed)
    }

    /// The blocks still live (`Ovfl`) after commit — the tracker law
    /// from spec §8: "after wrapup, every entry is `OVFL` (still live)
    /// or `EMPTY` (freed)".
    pub fn live_blocks(&self) -> Vec<BlockRef> {
        self.entries
            .iter()
            .filter(|e| e.state == OverflowState::Ovfl)
            .map(|e| e.block_ref)
            .collect()
    }

    /// Dedup helper used by tests/assertions: a map from block to state.
    pub fn states(&self) -> HashMap<BlockRef, OverflowState> {
        self.entries.iter().map(|e| (e.block_ref, e.state)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::mock::MockBlockManager;

    #[test]
    fn reuses_matching_discard_entry_without_a_write() {
        let mgr = MockBlockManager::new();
        let mut tracker = OverflowTracker::default();
        let first = tracker.build_value_overflow(None, b"payload", &mgr).unwrap();
        tracker.commit(&mgr).unwrap();

        // Next reconciliation of the same page: demote, then rebuild
        // with the same original pointer and identical bytes.
        tracker.begin();
        let second = tracker.build_value_overflow(Some(first), b"payload", &mgr).unwrap();
        assert_eq!(first, second);
        assert_eq!(mgr.writes.lock().unwrap().len(), 1, "no second write should occur");
        tracker.commit(&mgr).unwrap();
        assert_eq!(mgr.frees.lock().unwrap().len(), 0, "reused block must not be freed");
    }

    #[test]
    fn unreused_discard_entry_is_freed_on_commit() {
        let mgr = MockBlockManager::new();
        let mut tracker = OverflowTracker::default();
        let first = tracker.build_value_overflow(None, b"payload", &mgr).unwrap();
        tracker.commit(&mgr).unwrap();

        tracker.begin(); // demotes `first` to OvflDiscard
        // Nothing references `first` this time around.
        tracker.commit(&mgr).unwrap();
        assert_eq!(mgr.frees.lock().unwrap(), vec![first]);
        assert!(tracker.live_blocks().is_empty());
    }

    #[test]
    fn explicit_discard_frees_even_without_a_prior_begin() {
        let mgr = MockBlockManager::new();
        let mut tracker = OverflowTracker::default();
        let block_ref = BlockRef { addr: 7, size: 128 };
        tracker.discard(block_ref);
        tracker.commit(&mgr).unwrap();
        assert_eq!(mgr.frees.lock().unwrap(), vec![block_ref]);
    }

    #[test]
    fn tracker_law_every_entry_is_ovfl_or_pruned_after_commit() {
        let mgr = MockBlockManager::new();
        let mut tracker = OverflowTracker::default();
        let kept = tracker.build_value_overflow(None, b"a", &mgr).unwrap();
        let discarded = tracker.build_value_overflow(None, b"b", &mgr).unwrap();
        tracker.commit(&mgr).unwrap();

        tracker.begin();
        tracker.build_value_overflow(Some(kept), b"a", &mgr).unwrap();
        tracker.discard(discarded);
        tracker.commit(&mgr).unwrap();

        for state in tracker.states().values() {
            assert_eq!(*state, OverflowState::Ovfl);
        }
    }
}
