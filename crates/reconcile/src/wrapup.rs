//! C10: wrap-up/promotion. Converts a writer's closed boundary array
//! into the page's new `PageState` (spec §4.6): zero boundaries means
//! the page emptied out, one means a plain single-block replacement,
//! two or more means an ephemeral split whose child refs get inlined
//! into the parent the next time *it* reconciles.

use pagecache::{ClosedBoundary, OverflowTracker};

use crate::page::{ChildBoundary, ChildKey, PageState};

/// Turn a writer's closed boundaries into the page's new state. `keyed`
/// is `true` for row-store pages (promoted keys) and `false` for
/// column-store pages (starting recnos).
pub(crate) fn finalize(boundaries: Vec<ClosedBoundary>, keyed: bool) -> PageState {
    match boundaries.len() {
        0 => PageState::Empty,
        1 => {
            let only = boundaries.into_iter().next().unwrap();
            PageState::Replace(only.written.expect("a closed boundary must have been written"))
        }
        _ => {
            let children = boundaries
                .into_iter()
                .map(|b| {
                    let key = if keyed {
                        ChildKey::Key(b.promoted_key.unwrap_or_default())
                    } else {
                        ChildKey::Recno(b.recno)
                    };
                    ChildBoundary { key, block_ref: b.written.expect("a closed boundary must have been written") }
                })
                .collect();
            PageState::Split(children)
        }
    }
}

/// Spec §4.6: "on transition from an old `split` state to a new
/// result, the old ephemeral child's referenced blocks are re-added to
/// the tracker as `Block` entries so their storage is freed." Call
/// this with the page's *previous* state before building the new one.
pub(crate) fn retire_previous_split(previous: &PageState, overflow: &mut OverflowTracker) {
    if let PageState::Split(children) = previous {
        for child in children {
            overflow.discard(child.block_ref);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecache::BlockRef;

    fn written(addr: u64) -> ClosedBoundary {
        // ClosedBoundary's fields besides `written` aren't exercised
        // here; construct through the split engine in integration
        // tests for the fields that matter to the writers themselves.
        let mut engine_boundary = closed_boundary_stub();
        engine_boundary.written = Some(BlockRef { addr, size: 128 });
        engine_boundary
    }

    fn closed_boundary_stub() -> ClosedBoundary {
        // `ClosedBoundary` has a private field, so tests build one the
        // same way the split engine does: by running a trivial split
        // and reading back its own output.
        use pagecache::mock::MockBlockManager;
        use pagecache::{ConfigBuilder, DiskBuf, PageType, SplitEngine};
        let cfg = ConfigBuilder::new().maxleafpage(64).build().unwrap();
        let mgr = MockBlockManager::new();
        let mut dsk = DiskBuf::with_capacity(64);
        let mut engine = SplitEngine::new(PageType::ColFix, &cfg, 1);
        let payload = vec![1u8; 4];
        engine.ensure_space(payload.len(), &mut dsk, &mgr, None).unwrap();
        engine.append(&mut dsk, &payload, 1);
        engine.finish(&mut dsk, &mgr).unwrap().into_iter().next().unwrap()
    }

    #[test]
    fn zero_boundaries_is_empty() {
        assert_eq!(finalize(Vec::new(), false), PageState::Empty);
    }

    #[test]
    fn one_boundary_is_a_replace() {
        let b = written(5);
        match finalize(vec![b], false) {
            PageState::Replace(block_ref) => assert_eq!(block_ref.addr, 5),
            other => panic!("expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn two_or_more_boundaries_is_a_split() {
        let b1 = written(1);
        let b2 = written(2);
        match finalize(vec![b1, b2], false) {
            PageState::Split(children) => assert_eq!(children.len(), 2),
            other => panic!("expected Split, got {:?}", other),
        }
    }

    #[test]
    fn retiring_a_split_discards_every_child_block() {
        use pagecache::mock::MockBlockManager;
        let mgr = MockBlockManager::new();
        let mut tracker = OverflowTracker::default();
        let previous = PageState::Split(vec![
            ChildBoundary { key: ChildKey::Recno(1), block_ref: BlockRef { addr: 1, size: 4 } },
            ChildBoundary { key: ChildKey::Recno(2), block_ref: BlockRef { addr: 2, size: 4 } },
        ]);
        retire_previous_split(&previous, &mut tracker);
        tracker.commit(&mgr).unwrap();
        let mut freed: Vec<u64> = mgr.frees.lock().unwrap().iter().map(|r| r.addr).collect();
        freed.sort();
        assert_eq!(freed, vec![1, 2]);
    }
}
