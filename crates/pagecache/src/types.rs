//! Wire-level type codes shared by every layer of reconciliation.

use serde::{Deserialize, Serialize};

/// The six page formats the wire format knows about. Preserved
/// byte-for-byte in the disk header so a reader can dispatch without
/// consulting any other metadata.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PageType {
    /// Row-store internal page: child references keyed by variable-length byte strings.
    RowInt = 0,
    /// Row-store leaf page: key/value cells.
    RowLeaf = 1,
    /// Column-store internal page: child references keyed by record number.
    ColInt = 2,
    /// Column-store variable-length leaf page, RLE-encoded.
    ColVar = 3,
    /// Column-store fixed-length (bit-packed) leaf page.
    ColFix = 4,
    /// An out-of-band overflow block (a key or value too large to inline).
    Ovfl = 5,
}

impl PageType {
    /// Row-store pages carry explicit variable-length keys; column-store
    /// pages are keyed purely by record number.
    pub fn is_row_store(self) -> bool {
        matches!(self, PageType::RowInt | PageType::RowLeaf)
    }

    /// Internal (non-leaf) pages hold child references rather than data.
    pub fn is_internal(self) -> bool {
        matches!(self, PageType::RowInt | PageType::ColInt)
    }
}
