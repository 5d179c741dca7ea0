//! C9: the column-internal writer. Same child-flattening shape as C6
//! but keyed purely by record number — there is no key cell to emit or
//! compress, each child is a bare `Off` cell addressed by its starting
//! recno (spec §4.1's component table, column-store internal row).

use pagecache::{cell_pack_off, BlockManager, ClosedBoundary, Config, DiskBuf, PageType, Result,
    SplitEngine};

use crate::page::{ChildKey, ColInternalChild, ColInternalPage, PageState};

struct FlatChild {
    recno: u64,
    block_ref: pagecache::BlockRef,
}

/// Reconcile a column-internal page.
pub fn write_col_internal(
    page: &ColInternalPage,
    config: &Config,
    block_mgr: &dyn BlockManager,
) -> Result<Vec<ClosedBoundary>> {
    let flattened = flatten_children(page);

    let page_size = config.page_size(PageType::ColInt) as usize;
    let mut dsk = DiskBuf::with_capacity(page_size);
    let starting_recno = flattened.first().map(|c| c.recno).unwrap_or(0);
    let mut engine = SplitEngine::new(PageType::ColInt, config, starting_recno);

    // The cell codec carries no recno field for an `Off` cell; a
    // written chunk's starting recno instead comes from the split
    // engine's own `recno` cursor, which a boundary captures at the
    // moment it opens. So each child's recno has to be driven in as
    // the *advance* applied by the append preceding it, not attached to
    // its own cell.
    for (i, child) in flattened.iter().enumerate() {
        let cell = cell_pack_off(child.block_ref);
        engine.ensure_space(cell.bytes.len(), &mut dsk, block_mgr, None)?;
        let recno_advance = match flattened.get(i + 1) {
            Some(next) => next.recno - child.recno,
            None => 0,
        };
        engine.append(&mut dsk, &cell.bytes, recno_advance);
    }

    engine.finish(&mut dsk, block_mgr)
}

fn flatten_children(page: &ColInternalPage) -> Vec<FlatChild> {
    let mut out = Vec::with_capacity(page.children.len());
    for child in &page.children {
        flatten_one(child, &mut out);
    }
    out
}

fn flatten_one(child: &ColInternalChild, out: &mut Vec<FlatChild>) {
    match &child.state {
        PageState::Empty => {}
        PageState::Replace(block_ref) | PageState::Disk(block_ref) => {
            out.push(FlatChild { recno: child.recno, block_ref: *block_ref });
        }
        PageState::Split(boundaries) => {
            for (i, boundary) in boundaries.iter().enumerate() {
                let recno = if i == 0 {
                    child.recno
                } else {
                    match &boundary.key {
                        ChildKey::Recno(r) => *r,
                        ChildKey::Key(_) => unreachable!("column-internal split boundary must carry a recno"),
                    }
                };
                out.push(FlatChild { recno, block_ref: boundary.block_ref });
            }
        }
    }
}
