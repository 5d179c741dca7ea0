//! `reconcile` serializes a dirty in-memory B-tree page into one or
//! more fresh disk images. It owns the page data model, the row-store
//! key compression helpers, the five page-format writers (C5–C9), and
//! wrap-up/promotion (C10); the primitives they all share — the
//! growable scratch buffer, the cell codec, the overflow tracker, and
//! the split engine — live in `pagecache`.
//!
//! # Examples
//!
//! ```
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use pagecache::{BlockManager, BlockRef, ConfigBuilder, OverflowTracker};
//! use reconcile::page::{Insert, PageInput, PageState, RowLeafPage};
//!
//! #[derive(Default)]
//! struct NullBlockManager(AtomicU64);
//! impl BlockManager for NullBlockManager {
//!     fn block_write(&self, buf: &[u8]) -> pagecache::Result<BlockRef> {
//!         let addr = self.0.fetch_add(1, Ordering::SeqCst);
//!         Ok(BlockRef { addr, size: buf.len() as u32 })
//!     }
//!     fn block_free(&self, _block_ref: BlockRef) -> pagecache::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let config = ConfigBuilder::new().build().unwrap();
//! let mgr = NullBlockManager::default();
//! let mut overflow = OverflowTracker::default();
//!
//! let page = RowLeafPage {
//!     leading_inserts: vec![Insert { key: b"a".to_vec(), value: Some(b"1".to_vec()) }],
//!     slots: Vec::new(),
//! };
//!
//! let state = reconcile::reconcile(
//!     &PageInput::RowLeaf(page),
//!     &PageState::Empty,
//!     &config,
//!     &mut overflow,
//!     None,
//!     &mgr,
//! ).unwrap();
//! assert!(matches!(state, PageState::Replace(_)));
//! ```

#![deny(missing_docs)]

pub use crate::reconcile::reconcile;

pub mod page;

mod prefix;
mod reconcile;
mod wrapup;
mod writers;
