//! The key/value cell codec (C1). Spec §1 lists this as "deliberately
//! out of scope... a separate well-defined binary layer" exposing
//! `cell_pack_key`, `cell_pack_data`, `cell_pack_type`, `cell_unpack`,
//! and `cell_unpack_copy`. What follows is that contract given a
//! concrete (if minimal) shape so the rest of reconciliation has
//! something to build cells with; no writer in this crate reaches past
//! these functions to hand-roll its own byte layout.

use serde::{Deserialize, Serialize};

/// A reference to an out-of-band block written by the block manager.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block address, as returned by `block_write`.
    pub addr: u64,
    /// Block size in bytes, as returned by `block_write`.
    pub size: u32,
}

/// The cell-type codes that appear in a packed cell's header byte.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CellType {
    /// An in-line key, optionally prefix-compressed.
    Key = 0,
    /// A key stored out-of-band as an overflow block.
    KeyOvfl = 1,
    /// An in-line value, optionally carrying a run-length count.
    Value = 2,
    /// A value stored out-of-band as an overflow block.
    ValueOvfl = 3,
    /// A tombstone: the key/record existed but was deleted.
    Del = 4,
    /// An internal-page child reference.
    Off = 5,
}

/// A packed on-page cell plus the bookkeeping reconciliation needs
/// while building it: its total length on the page, and (if it's an
/// off-page key or value) the block it references.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// Which cell-type header this is.
    pub cell_type: CellType,
    /// Prefix-compression length, meaningful only for `CellType::Key`.
    pub prefix: u8,
    /// Run-length count, meaningful only for `CellType::Value`.
    pub rle: u64,
    /// The cell's packed bytes, ready to be appended to a page buffer.
    pub bytes: Vec<u8>,
    /// Set for `KeyOvfl` / `ValueOvfl` / `Off` cells.
    pub block_ref: Option<BlockRef>,
}

impl Cell {
    /// Total length of this cell as it will appear on the page.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the cell carries no bytes at all (used for the row-leaf
    /// trailing sentinel and for zero-length values).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_varint(buf: &[u8]) -> (u64, usize) {
    let mut value: u64 = 0;
    let mut shift = 0;
    let mut consumed = 0;
    for &byte in buf {
        consumed += 1;
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    (value, consumed)
}

/// Pack an in-line key cell: `prefix` shared bytes with the previous
/// key, followed by `suffix`, the non-shared trailing bytes.
pub fn cell_pack_key(prefix: u8, suffix: &[u8]) -> Cell {
    let mut bytes = Vec::with_capacity(2 + suffix.len());
    bytes.push(CellType::Key as u8);
    bytes.push(prefix);
    write_varint(&mut bytes, suffix.len() as u64);
    bytes.extend_from_slice(suffix);
    Cell { cell_type: CellType::Key, prefix, rle: 0, bytes, block_ref: None }
}

/// Pack an overflow key cell referencing an out-of-band block.
pub fn cell_pack_key_ovfl(block_ref: BlockRef) -> Cell {
    let mut bytes = Vec::with_capacity(13);
    bytes.push(CellType::KeyOvfl as u8);
    bytes.extend_from_slice(&block_ref.addr.to_le_bytes());
    bytes.extend_from_slice(&block_ref.size.to_le_bytes());
    Cell { cell_type: CellType::KeyOvfl, prefix: 0, rle: 0, bytes, block_ref: Some(block_ref) }
}

/// Pack an in-line value cell carrying `rle` repeats (1 for row-store,
/// where run-length has no meaning).
pub fn cell_pack_data(data: &[u8], rle: u64) -> Cell {
    let mut bytes = Vec::with_capacity(2 + data.len());
    bytes.push(CellType::Value as u8);
    write_varint(&mut bytes, rle);
    write_varint(&mut bytes, data.len() as u64);
    bytes.extend_from_slice(data);
    Cell { cell_type: CellType::Value, prefix: 0, rle, bytes, block_ref: None }
}

/// Pack an overflow value cell referencing an out-of-band block.
pub fn cell_pack_data_ovfl(block_ref: BlockRef, rle: u64) -> Cell {
    let mut bytes = Vec::with_capacity(13);
    bytes.push(CellType::ValueOvfl as u8);
    write_varint(&mut bytes, rle);
    bytes.extend_from_slice(&block_ref.addr.to_le_bytes());
    bytes.extend_from_slice(&block_ref.size.to_le_bytes());
    Cell { cell_type: CellType::ValueOvfl, prefix: 0, rle, bytes, block_ref: Some(block_ref) }
}

/// Pack a bare type marker with no payload: a deletion tombstone, or
/// the row-leaf trailing zero-length key sentinel (spec §4.2).
pub fn cell_pack_type(cell_type: CellType) -> Cell {
    let bytes = vec![cell_type as u8];
    Cell { cell_type, prefix: 0, rle: 0, bytes, block_ref: None }
}

/// Pack an internal-page child reference.
pub fn cell_pack_off(block_ref: BlockRef) -> Cell {
    let mut bytes = Vec::with_capacity(13);
    bytes.push(CellType::Off as u8);
    bytes.extend_from_slice(&block_ref.addr.to_le_bytes());
    bytes.extend_from_slice(&block_ref.size.to_le_bytes());
    Cell { cell_type: CellType::Off, prefix: 0, rle: 0, bytes, block_ref: Some(block_ref) }
}

/// The decoded view of a cell: type plus whatever payload it carries.
#[derive(Clone, Debug, PartialEq)]
pub enum Unpacked {
    /// `(prefix, suffix)`.
    Key(u8, Vec<u8>),
    /// Overflow key block reference.
    KeyOvfl(BlockRef),
    /// `(rle, value_bytes)`.
    Value(u64, Vec<u8>),
    /// `(rle, overflow block reference)`.
    ValueOvfl(u64, BlockRef),
    /// A deletion tombstone.
    Del,
    /// An internal-page child reference.
    Off(BlockRef),
}

/// Unpack a cell from the front of `buf`, returning the decoded form
/// and the number of bytes consumed. Referred to as `cell_unpack` in
/// the external contract; since this crate never borrows page buffers
/// across calls, this always returns owned data (`cell_unpack_copy`'s
/// behavior) rather than the zero-copy variant the real codec affords.
pub fn cell_unpack(buf: &[u8]) -> (Unpacked, usize) {
    cell_unpack_copy(buf)
}

/// Always-owning unpack, matching the external contract's
/// `cell_unpack_copy`.
pub fn cell_unpack_copy(buf: &[u8]) -> (Unpacked, usize) {
    assert!(!buf.is_empty(), "cannot unpack an empty cell buffer");
    let tag = buf[0];
    let rest = &buf[1..];
    match tag {
        t if t == CellType::Key as u8 => {
            let prefix = rest[0];
            let (len, n) = read_varint(&rest[1..]);
            let suffix_start = 1 + n;
            let suffix = rest[suffix_start..suffix_start + len as usize].to_vec();
            (Unpacked::Key(prefix, suffix), 1 + suffix_start + len as usize)
        }
        t if t == CellType::KeyOvfl as u8 => {
            let addr = u64::from_le_bytes(rest[0..8].try_into().unwrap());
            let size = u32::from_le_bytes(rest[8..12].try_into().unwrap());
            (Unpacked::KeyOvfl(BlockRef { addr, size }), 13)
        }
        t if t == CellType::Value as u8 => {
            let (rle, n1) = read_varint(rest);
            let (len, n2) = read_varint(&rest[n1..]);
            let start = n1 + n2;
            let data = rest[start..start + len as usize].to_vec();
            (Unpacked::Value(rle, data), 1 + start + len as usize)
        }
        t if t == CellType::ValueOvfl as u8 => {
            let (rle, n1) = read_varint(rest);
            let addr = u64::from_le_bytes(rest[n1..n1 + 8].try_into().unwrap());
            let size = u32::from_le_bytes(rest[n1 + 8..n1 + 12].try_into().unwrap());
            (Unpacked::ValueOvfl(rle, BlockRef { addr, size }), 1 + n1 + 12)
        }
        t if t == CellType::Del as u8 => (Unpacked::Del, 1),
        t if t == CellType::Off as u8 => {
            let addr = u64::from_le_bytes(rest[0..8].try_into().unwrap());
            let size = u32::from_le_bytes(rest[8..12].try_into().unwrap());
            (Unpacked::Off(BlockRef { addr, size }), 13)
        }
        _ => panic!("unrecognized cell type tag {}", tag),
    }
}
