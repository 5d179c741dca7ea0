//! The public entry point (spec §6): `reconcile(page, salvage_cookie?)`.
//! Dispatches on the page's format to the right C5–C9 writer, then
//! hands the writer's closed boundaries to C10 wrap-up.

use log::debug;

use pagecache::{BlockManager, Config, OverflowTracker, Result};

use crate::page::{PageInput, PageState, SalvageCookie};
use crate::wrapup;
use crate::writers;

/// Reconcile one dirty page: serialize it to one or more fresh disk
/// images and report the page's new state. `salvage` is only consulted
/// by the column-store writers (spec §6); row-store salvage narrowing
/// belongs to the metadata layer that builds `RowLeafPage` in the first
/// place, out of scope here (spec §1).
pub fn reconcile(
    input: &PageInput,
    previous: &PageState,
    config: &Config,
    overflow: &mut OverflowTracker,
    salvage: Option<&SalvageCookie>,
    block_mgr: &dyn BlockManager,
) -> Result<PageState> {
    wrapup::retire_previous_split(previous, overflow);

    let (boundaries, keyed) = match input {
        PageInput::RowLeaf(page) => {
            (writers::write_row_leaf(page, config, overflow, block_mgr)?, true)
        }
        PageInput::RowInternal(page) => {
            (writers::write_row_internal(page, config, block_mgr)?, true)
        }
        PageInput::ColInternal(page) => {
            (writers::write_col_internal(page, config, block_mgr)?, false)
        }
        PageInput::ColVar(page) => {
            (writers::write_col_var(page, config, overflow, salvage, block_mgr)?, false)
        }
        PageInput::ColFix(page) => {
            (writers::write_col_fix(page, config, block_mgr)?, false)
        }
    };

    let state = wrapup::finalize(boundaries, keyed);

    // Commit (spec §4.5 step 4 / §8's tracker law): free every entry
    // still `OvflDiscard` or `Block`, reset it to `Empty`; `Ovfl`
    // entries survive untouched into the next reconciliation.
    let freed = overflow.commit(block_mgr)?;
    if !freed.is_empty() {
        debug!("freed {} overflow block(s) during commit", freed.len());
    }

    debug!("reconciled {:?} page to {:?}", input.page_type(), state);
    Ok(state)
}
