//! C6: the row-internal writer. Walks child references in key order,
//! inlining any child that last reconciled into an ephemeral split
//! (spec §4.3/§4.6: a split child is never itself persisted as its own
//! internal page, its boundary refs just get flattened into the parent
//! on the parent's next reconciliation) before emitting an `Off` cell
//! per surviving child.

use pagecache::{cell_pack_key, cell_pack_key_ovfl, cell_pack_off, BlockManager, ClosedBoundary,
    Config, DiskBuf, PageType, Result, SplitEngine};

use crate::page::{ChildKey, KeySource, PageState, RowInternalChild, RowInternalPage};

/// One flattened child ready to be written: its routing key plus the
/// block it landed on.
struct FlatChild {
    key: KeySource,
    block_ref: pagecache::BlockRef,
}

/// Reconcile a row-internal page. Unlike the leaf writer, promoted keys
/// here are never suffix-compressed again (spec §4.3: suffix
/// compression happens once, when a key is first promoted out of a
/// leaf; a row-internal page's own promotion to its parent reuses
/// whatever key it already holds for that child, verbatim).
pub fn write_row_internal(
    page: &RowInternalPage,
    config: &Config,
    block_mgr: &dyn BlockManager,
) -> Result<Vec<ClosedBoundary>> {
    let flattened = flatten_children(page);

    let page_size = config.page_size(PageType::RowInt) as usize;
    let mut dsk = DiskBuf::with_capacity(page_size);
    let mut engine = SplitEngine::new(PageType::RowInt, config, 0);

    let mut last: Vec<u8> = Vec::new();
    let mut last_valid = false;

    for (i, child) in flattened.iter().enumerate() {
        let off_cell = cell_pack_off(child.block_ref);
        // The 0th key on an internal page routes to -infinity; search
        // never looks at its bytes, so it is truncated to one byte
        // regardless of source (spec §4.3's "Core rule").
        let cell_zero = i == 0;

        match &child.key {
            KeySource::Overflow(block_ref) => {
                let key_cell = if cell_zero {
                    cell_pack_key(0, &[0u8])
                } else {
                    cell_pack_key_ovfl(*block_ref)
                };
                ensure_and_append(&mut engine, &mut dsk, block_mgr, key_cell.bytes, off_cell.bytes)?;
                last_valid = false;
            }
            KeySource::Instantiated(cur) => {
                // Row-internal keys are not prefix-compressed against
                // one another (only row-leaf keys are, spec §4.2); each
                // child's key is written in full, except the 0th.
                let truncated = &cur[..cur.len().min(1)];
                let key_cell = cell_pack_key(0, if cell_zero { truncated } else { cur });
                ensure_and_append(&mut engine, &mut dsk, block_mgr, key_cell.bytes, off_cell.bytes)?;
                last = cur.clone();
                last_valid = true;
            }
            KeySource::Uninstantiated { prefix_len, suffix } => {
                let expanded = crate::prefix::prefix_decode(&last, *prefix_len, suffix);
                let truncated = &expanded[..expanded.len().min(1)];
                let key_cell = cell_pack_key(0, if cell_zero { truncated } else { &expanded });
                ensure_and_append(&mut engine, &mut dsk, block_mgr, key_cell.bytes, off_cell.bytes)?;
                last = expanded;
                last_valid = true;
            }
        }
    }

    let _ = last_valid;
    engine.finish(&mut dsk, block_mgr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecache::{cell_unpack, mock::MockBlockManager, ConfigBuilder, Unpacked};

    fn config() -> Config {
        ConfigBuilder::new().build().unwrap()
    }

    #[test]
    fn zeroth_key_is_truncated_to_one_byte_even_when_multi_byte() {
        let mgr = MockBlockManager::new();
        let left = pagecache::BlockRef { addr: 1, size: 64 };
        let right = pagecache::BlockRef { addr: 2, size: 64 };
        let page = RowInternalPage {
            children: vec![
                RowInternalChild { key: KeySource::Instantiated(b"alpha".to_vec()), state: PageState::Disk(left) },
                RowInternalChild { key: KeySource::Instantiated(b"zulu".to_vec()), state: PageState::Disk(right) },
            ],
        };
        let boundaries = write_row_internal(&page, &config(), &mgr).unwrap();
        assert_eq!(boundaries.len(), 1);

        let bytes = mgr.writes.lock().unwrap().iter().find(|(r, _)| *r == boundaries[0].written.unwrap()).unwrap().1.clone();
        let (first_key, consumed) = cell_unpack(&bytes[pagecache::HEADER_SIZE..]);
        match first_key {
            Unpacked::Key(prefix, suffix) => {
                assert_eq!(prefix, 0);
                assert_eq!(suffix.len(), 1, "0th key must be truncated to a single byte");
            }
            other => panic!("unexpected cell {:?}", other),
        }

        let (_off, consumed_off) = cell_unpack(&bytes[pagecache::HEADER_SIZE + consumed..]);
        let (second_key, _) = cell_unpack(&bytes[pagecache::HEADER_SIZE + consumed + consumed_off..]);
        match second_key {
            Unpacked::Key(_, suffix) => assert_eq!(suffix, b"zulu"),
            other => panic!("unexpected cell {:?}", other),
        }
    }
}

fn ensure_and_append(
    engine: &mut SplitEngine,
    dsk: &mut DiskBuf,
    block_mgr: &dyn BlockManager,
    key_bytes: Vec<u8>,
    off_bytes: Vec<u8>,
) -> Result<()> {
    engine.ensure_space(key_bytes.len() + off_bytes.len(), dsk, block_mgr, None)?;
    engine.append(dsk, &key_bytes, 0);
    engine.append(dsk, &off_bytes, 0);
    Ok(())
}

/// Resolve every child down to a concrete `(key, block_ref)` pair,
/// recursively flattening ephemeral splits in place. A split child
/// contributes one flattened entry per boundary it produced, each
/// routed under the boundary's own promoted key except the first,
/// which keeps the parent's original routing key for that child (the
/// "merge-correction key", spec §4.3: the first child of a split still
/// has to compare correctly against its left sibling, which only the
/// parent's original key for it is guaranteed to do).
fn flatten_children(page: &RowInternalPage) -> Vec<FlatChild> {
    let mut out = Vec::with_capacity(page.children.len());
    for child in &page.children {
        flatten_one(child, &mut out);
    }
    out
}

fn flatten_one(child: &RowInternalChild, out: &mut Vec<FlatChild>) {
    match &child.state {
        PageState::Empty => {
            // The child has no live entries left; the parent simply
            // drops its reference.
        }
        PageState::Replace(block_ref) | PageState::Disk(block_ref) => {
            out.push(FlatChild { key: child.key.clone(), block_ref: *block_ref });
        }
        PageState::Split(boundaries) => {
            for (i, boundary) in boundaries.iter().enumerate() {
                let key = if i == 0 {
                    child.key.clone()
                } else {
                    match &boundary.key {
                        ChildKey::Key(bytes) => KeySource::Instantiated(bytes.clone()),
                        ChildKey::Recno(_) => unreachable!("row-internal split boundary must carry a key"),
                    }
                };
                out.push(FlatChild { key, block_ref: boundary.block_ref });
            }
        }
    }
}
