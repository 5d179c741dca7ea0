//! C5: the row-leaf writer. Walks the page's original slots and its
//! insert skiplists in key order, builds prefix-compressed key cells
//! and (possibly overflowed) key and value cells, and hands every cell
//! to the shared split engine.

use pagecache::{
    cell_pack_data, cell_pack_data_ovfl, cell_pack_key, cell_pack_key_ovfl, BlockManager,
    ClosedBoundary, Config, DiskBuf, OverflowTracker, PageType, Result, SplitEngine,
};

use crate::page::{Insert, KeySource, RowLeafPage, Update, ValueSource};
use crate::prefix::{common_prefix_len, suffix_truncate};

/// Reconcile a row-leaf page, returning its closed split boundaries.
/// The caller (C10 wrap-up) turns these into the page's new
/// `PageState`.
pub fn write_row_leaf(
    page: &RowLeafPage,
    config: &Config,
    overflow: &mut OverflowTracker,
    block_mgr: &dyn BlockManager,
) -> Result<Vec<ClosedBoundary>> {
    let page_size = config.page_size(PageType::RowLeaf) as usize;
    let mut dsk = DiskBuf::with_capacity(page_size);
    let mut engine = SplitEngine::new(PageType::RowLeaf, config, 0);
    let mut w = Writer { engine: &mut engine, dsk: &mut dsk, block_mgr, config, overflow, last: Vec::new(), last_valid: false, chunk_has_full_key: false };

    overflow.begin();

    for insert in &page.leading_inserts {
        w.emit_insert(insert)?;
    }

    for slot in &page.slots {
        match &slot.update {
            Update::Deleted => {
                if let KeySource::Overflow(block_ref) = &slot.key {
                    w.overflow.discard(*block_ref);
                }
                if let ValueSource::Overflow(block_ref) = &slot.original_value {
                    w.overflow.discard(*block_ref);
                }
            }
            Update::None => match &slot.original_value {
                ValueSource::Inline(bytes) => {
                    let value_cell = cell_pack_data(bytes, 1);
                    w.emit_key_value(&slot.key, value_cell.bytes)?;
                }
                ValueSource::Overflow(block_ref) => {
                    w.overflow.keep_active(*block_ref);
                    let value_cell = cell_pack_data_ovfl(*block_ref, 1);
                    w.emit_key_value(&slot.key, value_cell.bytes)?;
                }
            },
            Update::Value(bytes) => {
                let original_ref = match &slot.original_value {
                    ValueSource::Overflow(r) => Some(*r),
                    ValueSource::Inline(_) => None,
                };
                let value_bytes = if bytes.len() as u32 > config.max_item_size(PageType::RowLeaf) {
                    let block_ref = w.overflow.build_value_overflow(original_ref, bytes, block_mgr)?;
                    cell_pack_data_ovfl(block_ref, 1).bytes
                } else {
                    cell_pack_data(bytes, 1).bytes
                };
                w.emit_key_value(&slot.key, value_bytes)?;
            }
        }

        for insert in &slot.appended_inserts {
            w.emit_insert(insert)?;
        }
    }

    engine.finish(&mut dsk, block_mgr)
}

struct Writer<'a> {
    engine: &'a mut SplitEngine,
    dsk: &'a mut DiskBuf,
    block_mgr: &'a dyn BlockManager,
    config: &'a Config,
    overflow: &'a mut OverflowTracker,
    last: Vec<u8>,
    last_valid: bool,
    chunk_has_full_key: bool,
}

impl<'a> Writer<'a> {
    fn emit_insert(&mut self, insert: &Insert) -> Result<()> {
        let value_bytes = match &insert.value {
            Some(bytes) if bytes.len() as u32 > self.config.max_item_size(PageType::RowLeaf) => {
                let block_ref = self.overflow.build_value_overflow(None, bytes, self.block_mgr)?;
                cell_pack_data_ovfl(block_ref, 1).bytes
            }
            Some(bytes) => cell_pack_data(bytes, 1).bytes,
            None => cell_pack_data(&[], 1).bytes,
        };
        self.emit_key_value(&KeySource::Instantiated(insert.key.clone()), value_bytes)
    }

    fn emit_key_value(&mut self, key: &KeySource, value_bytes: Vec<u8>) -> Result<()> {
        self.append_reserving_sentinel(value_bytes, None)?;

        match key {
            KeySource::Overflow(block_ref) => {
                let cell = cell_pack_key_ovfl(*block_ref);
                let last_for_promote = if self.last_valid { self.last.clone() } else { Vec::new() };
                let truncate = self.config.internal_key_truncate;
                let mut cb = move |_: &DiskBuf, _: usize| -> Vec<u8> {
                    // An overflow key's decoded bytes aren't available at
                    // this layer; promote an empty boundary key rather
                    // than panic (see pagecache::split::read_first_key).
                    let _ = &last_for_promote;
                    let _ = truncate;
                    Vec::new()
                };
                self.append_reserving_sentinel(cell.bytes, Some(&mut cb))?;
                self.last_valid = false;
            }
            KeySource::Instantiated(cur) => self.emit_full_key(cur.clone())?,
            KeySource::Uninstantiated { prefix_len, suffix } => {
                // This writer always rebuilds prefix compression fresh
                // against whatever key preceded it on the *new* chunk,
                // so an uninstantiated key is first expanded against the
                // original on-disk previous key (`self.last`, still
                // valid from the prior slot) before being re-compressed.
                let expanded = crate::prefix::prefix_decode(&self.last, *prefix_len, suffix);
                self.emit_full_key(expanded)?;
            }
        }
        Ok(())
    }

    fn emit_full_key(&mut self, cur: Vec<u8>) -> Result<()> {
        // A key, like a value, can exceed the per-item cap (glossary:
        // "a key *or* value whose serialized size exceeds the per-item
        // cap"); `__rec_cell_build_key` runs this same check on keys,
        // not just values. Overflow keys are never prefix-compressed
        // and are never reused across reconciliations (spec §9 open
        // question 2), unlike overflow values.
        if cur.len() as u32 > self.config.max_item_size(PageType::RowLeaf) {
            return self.emit_overflow_key(cur);
        }

        let prefix = if self.config.prefix_compression && self.chunk_has_full_key && self.last_valid {
            common_prefix_len(&self.last, &cur)
        } else {
            0
        };
        let suffix = cur[prefix as usize..].to_vec();
        let cell = cell_pack_key(prefix, &suffix);

        let cur_for_promote = cur.clone();
        let last_for_promote = if self.last_valid { self.last.clone() } else { Vec::new() };
        let truncate = self.config.internal_key_truncate;
        let mut cb = move |_: &DiskBuf, _: usize| -> Vec<u8> {
            if truncate && !last_for_promote.is_empty() {
                suffix_truncate(&last_for_promote, &cur_for_promote)
            } else {
                cur_for_promote.clone()
            }
        };
        self.append_reserving_sentinel(cell.bytes, Some(&mut cb))?;
        self.last = cur;
        self.last_valid = true;
        self.chunk_has_full_key = true;
        Ok(())
    }

    fn emit_overflow_key(&mut self, cur: Vec<u8>) -> Result<()> {
        let block_ref = self.overflow.build_value_overflow(None, &cur, self.block_mgr)?;
        let cell = cell_pack_key_ovfl(block_ref);
        let mut cb = move |_: &DiskBuf, _: usize| -> Vec<u8> { Vec::new() };
        self.append_reserving_sentinel(cell.bytes, Some(&mut cb))?;
        self.last_valid = false;
        Ok(())
    }

    fn append_reserving_sentinel(
        &mut self,
        bytes: Vec<u8>,
        row_promote: Option<&mut dyn FnMut(&DiskBuf, usize) -> Vec<u8>>,
    ) -> Result<()> {
        let avail_before = self.engine.space_avail();
        self.engine.ensure_space(bytes.len() + 1, self.dsk, self.block_mgr, row_promote)?;
        if self.engine.space_avail() != avail_before {
            self.chunk_has_full_key = false;
        }
        self.engine.append(self.dsk, &bytes, 0);
        Ok(())
    }
}
