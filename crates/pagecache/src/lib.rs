//! `pagecache` holds the primitives page reconciliation shares across
//! every page format: the growable disk-image buffer, the cell codec,
//! the overflow-object lifecycle tracker, the split engine, and the
//! block-manager contract reconciliation depends on but never
//! implements itself.
//!
//! # Examples
//!
//! ```
//! use pagecache::{ConfigBuilder, PageType};
//!
//! let config = ConfigBuilder::new().maxleafpage(32 * 1024).build().unwrap();
//! assert_eq!(config.split_size(PageType::RowLeaf), 24576);
//! ```

#![deny(missing_docs)]

pub use block::BlockManager;
#[cfg(any(test, feature = "test-support"))]
pub use block::mock;
pub use buffer::DiskBuf;
pub use cell::{
    cell_pack_data, cell_pack_data_ovfl, cell_pack_key, cell_pack_key_ovfl, cell_pack_off,
    cell_pack_type, cell_unpack, cell_unpack_copy, BlockRef, Cell, CellType, Unpacked,
};
pub use config::{Config, ConfigBuilder, HuffmanCodec};
pub use error::{Error, Result};
pub use overflow::{OverflowState, OverflowTracker};
pub use split::{read_header, BndState, ClosedBoundary, Header, SplitEngine, HEADER_SIZE};
pub use types::PageType;

mod block;
mod buffer;
mod cell;
mod config;
mod error;
mod overflow;
mod split;
mod types;
