//! The on-disk block manager (spec §1: "Deliberately out of scope...
//! named only by the contracts they expose"). Reconciliation only ever
//! calls `block_write` and `block_free`; everything about segment
//! allocation, free-space tracking, and durability lives on the other
//! side of this trait.

use crate::cell::BlockRef;
use crate::error::Result;

/// The block-manager contract reconciliation depends on.
pub trait BlockManager {
    /// Persist `buf` as a single block, returning where it landed.
    fn block_write(&self, buf: &[u8]) -> Result<BlockRef>;

    /// Release a previously written block for reuse.
    fn block_free(&self, block_ref: BlockRef) -> Result<()>;
}

/// An in-memory stand-in for the block manager, used only by tests: it
/// never actually discards freed blocks (so tests can assert on what
/// got freed), and it hands out addresses by bumping a counter.
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Records every write and every free for test assertions.
    #[derive(Default)]
    pub struct MockBlockManager {
        next_addr: AtomicU64,
        /// Every block written, in order, along with its bytes.
        pub writes: Mutex<Vec<(BlockRef, Vec<u8>)>>,
        /// Every block freed, in order.
        pub frees: Mutex<Vec<BlockRef>>,
    }

    impl MockBlockManager {
        /// A fresh mock with no recorded activity.
        pub fn new() -> MockBlockManager {
            MockBlockManager {
                next_addr: AtomicU64::new(1),
                writes: Mutex::new(Vec::new()),
                frees: Mutex::new(Vec::new()),
            }
        }

        /// Number of blocks written and not subsequently freed.
        pub fn live_blocks(&self) -> usize {
            let writes = self.writes.lock().unwrap();
            let frees = self.frees.lock().unwrap();
            writes
                .iter()
                .filter(|(r, _)| !frees.contains(r))
                .count()
        }
    }

    impl BlockManager for MockBlockManager {
        fn block_write(&self, buf: &[u8]) -> Result<BlockRef> {
            let addr = self.next_addr.fetch_add(1, Ordering::SeqCst);
            let block_ref = BlockRef { addr, size: buf.len() as u32 };
            self.writes.lock().unwrap().push((block_ref, buf.to_vec()));
            Ok(block_ref)
        }

        fn block_free(&self, block_ref: BlockRef) -> Result<()> {
            self.frees.lock().unwrap().push(block_ref);
            Ok(())
        }
    }
}
