//! C7: the variable-length column-store leaf writer. Unlike the other
//! writers, this one does its own run-length collapse (spec §4.4):
//! `collapse` walks the page's original runs and pending updates
//! together, maintaining a `(last_value, last_deleted, rle_count)`
//! window, before the result is salvage-narrowed and packed one RLE
//! cell per run.

use pagecache::{cell_pack_data, cell_pack_data_ovfl, cell_pack_type, BlockManager, CellType,
    ClosedBoundary, Config, DiskBuf, OverflowTracker, PageType, Result, SplitEngine};

use crate::page::{ColVarPage, ColVarRun, ColVarUpdate, ColVarValue, SalvageCookie};

/// Reconcile a variable-length column-store leaf page.
pub fn write_col_var(
    page: &ColVarPage,
    config: &Config,
    overflow: &mut OverflowTracker,
    salvage: Option<&SalvageCookie>,
    block_mgr: &dyn BlockManager,
) -> Result<Vec<ClosedBoundary>> {
    let page_size = config.page_size(PageType::ColVar) as usize;
    let mut dsk = DiskBuf::with_capacity(page_size);
    let mut engine = SplitEngine::new(PageType::ColVar, config, page.starting_recno);

    let collapsed = collapse(page, config, overflow, block_mgr)?;
    let runs = apply_salvage(&collapsed, salvage);

    for run in &runs {
        let cell = build_run_cell(run, config);
        engine.ensure_space(cell.bytes.len(), &mut dsk, block_mgr, None)?;
        engine.append(&mut dsk, &cell.bytes, run.rle);
    }

    engine.finish(&mut dsk, block_mgr)
}

/// Walk `page.original_runs` in record-number order against
/// `page.updates`, collapsing the result into fresh RLE runs (spec
/// §4.4). `updates` is sorted ascending and covers overrides inside
/// the original record range plus any trailing appends past it.
fn collapse(
    page: &ColVarPage,
    config: &Config,
    overflow: &mut OverflowTracker,
    block_mgr: &dyn BlockManager,
) -> Result<Vec<ColVarRun>> {
    let updates = &page.updates;
    let mut ui = 0usize;
    let mut pos = page.starting_recno;
    let mut window = Window::default();

    for run in &page.original_runs {
        let run_start = pos;
        let run_end = run_start + run.rle;
        pos = run_end;

        let touched = ui < updates.len() && updates[ui].recno < run_end;

        if !touched {
            match run.overflow_unchanged {
                // No update touches this run at all: flush the window
                // and copy the cell through raw, without decoding or
                // comparing it against anything (spec §4.4's
                // "overflow-with-no-update fast path").
                Some(block_ref) => {
                    overflow.keep_active(block_ref);
                    window.push_raw(ColVarRun {
                        rle: run.rle,
                        deleted: run.deleted,
                        value: run.value.clone(),
                        overflow_unchanged: Some(block_ref),
                    });
                }
                None => window.push(run.deleted, run.value.clone(), run.rle),
            }
            continue;
        }

        // Some record in this run is overridden: the run's shared
        // value no longer holds for the whole range, so an original
        // overflow reference for it is retired rather than reused
        // (spec §9 open question 3: no partial-run reuse attempted).
        if let Some(block_ref) = run.overflow_unchanged {
            overflow.discard(block_ref);
        }

        let mut cur = run_start;
        while cur < run_end {
            if ui < updates.len() && updates[ui].recno == cur {
                push_update(&mut window, &updates[ui]);
                ui += 1;
                cur += 1;
                continue;
            }
            let next_update = if ui < updates.len() && updates[ui].recno < run_end {
                updates[ui].recno
            } else {
                run_end
            };
            window.push(run.deleted, run.value.clone(), next_update - cur);
            cur = next_update;
        }
    }

    // Trailing appends past the original record range, gap-filling any
    // non-contiguous record numbers with synthetic deletions.
    let mut expected = pos;
    while ui < updates.len() {
        let update = &updates[ui];
        if update.recno > expected {
            window.push(true, Vec::new(), update.recno - expected);
        }
        push_update(&mut window, update);
        expected = update.recno + 1;
        ui += 1;
    }

    let mut out = window.finish();
    for run in out.iter_mut() {
        if !run.deleted && run.overflow_unchanged.is_none()
            && run.value.len() as u32 > config.max_item_size(PageType::ColVar)
        {
            let block_ref = overflow.build_value_overflow(None, &run.value, block_mgr)?;
            run.overflow_unchanged = Some(block_ref);
        }
    }
    Ok(out)
}

fn push_update(window: &mut Window, update: &ColVarUpdate) {
    match &update.value {
        ColVarValue::Deleted => window.push(true, Vec::new(), 1),
        ColVarValue::Value(bytes) => window.push(false, bytes.clone(), 1),
    }
}

/// The `(last_value, last_deleted, rle_count)` merge window spec §4.4
/// describes, plus the runs it has already flushed.
#[derive(Default)]
struct Window {
    current: Option<ColVarRun>,
    out: Vec<ColVarRun>,
}

impl Window {
    /// Compare one more segment of `count` identically-valued records
    /// against the open run, extending it on a match or flushing and
    /// starting a new one otherwise.
    fn push(&mut self, deleted: bool, value: Vec<u8>, count: u64) {
        if count == 0 {
            return;
        }
        if let Some(cur) = &mut self.current {
            let same = cur.overflow_unchanged.is_none()
                && cur.deleted == deleted
                && (deleted || cur.value == value);
            if same {
                cur.rle += count;
                return;
            }
        }
        self.flush();
        self.current = Some(ColVarRun { rle: count, deleted, value, overflow_unchanged: None });
    }

    /// Flush the open window, then push `run` standalone without ever
    /// comparing it to a neighbor (the overflow fast path).
    fn push_raw(&mut self, run: ColVarRun) {
        self.flush();
        self.out.push(run);
    }

    fn flush(&mut self) {
        if let Some(cur) = self.current.take() {
            self.out.push(cur);
        }
    }

    fn finish(mut self) -> Vec<ColVarRun> {
        self.flush();
        self.out
    }
}

fn build_run_cell(run: &ColVarRun, config: &Config) -> pagecache::Cell {
    if let Some(block_ref) = run.overflow_unchanged {
        // No update touched any record in this run; copy the existing
        // overflow reference through without decoding it.
        return cell_pack_data_ovfl(block_ref, run.rle);
    }
    if run.deleted {
        return cell_pack_type(CellType::Del);
    }
    if run.value.len() as u32 > config.max_item_size(PageType::ColVar) {
        // `collapse` promotes every oversized merged run to overflow
        // before returning, so this never fires.
        unreachable!("oversized ColVarRun value must be pre-promoted to overflow by collapse");
    }
    cell_pack_data(&run.value, run.rle)
}

/// Narrow `runs` to the salvage cookie's `[skip, skip+take)` window,
/// synthesizing `missing` leading deletions (spec §6's salvage cookie
/// schema).
fn apply_salvage(runs: &[ColVarRun], salvage: Option<&SalvageCookie>) -> Vec<ColVarRun> {
    let cookie = match salvage {
        Some(c) if !c.done => c,
        _ => return runs.to_vec(),
    };

    let mut out = Vec::new();
    if cookie.missing > 0 {
        out.push(ColVarRun { rle: cookie.missing, deleted: true, value: Vec::new(), overflow_unchanged: None });
    }

    let mut remaining_skip = cookie.skip;
    let mut remaining_take = if cookie.take == 0 { u64::MAX } else { cookie.take };

    for run in runs {
        if remaining_take == 0 {
            break;
        }
        let mut rle = run.rle;
        if remaining_skip > 0 {
            if remaining_skip >= rle {
                remaining_skip -= rle;
                continue;
            }
            rle -= remaining_skip;
            remaining_skip = 0;
        }
        let taken = rle.min(remaining_take);
        remaining_take -= taken;
        let mut kept = run.clone();
        kept.rle = taken;
        out.push(kept);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecache::mock::MockBlockManager;
    use pagecache::ConfigBuilder;

    fn config() -> Config {
        ConfigBuilder::new().maxleafpage(4096).build().unwrap()
    }

    #[test]
    fn salvage_skip_shortens_the_first_overlapping_run() {
        let runs = vec![
            ColVarRun { rle: 10, deleted: false, value: b"a".to_vec(), overflow_unchanged: None },
            ColVarRun { rle: 5, deleted: false, value: b"b".to_vec(), overflow_unchanged: None },
        ];
        let cookie = SalvageCookie { skip: 12, take: 0, missing: 0, done: false };
        let out = apply_salvage(&runs, Some(&cookie));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].rle, 8);
        assert_eq!(out[0].value, b"b".to_vec());
        assert_eq!(out[1].rle, 5);
    }

    #[test]
    fn salvage_missing_prepends_a_deleted_run() {
        let runs = vec![ColVarRun { rle: 3, deleted: false, value: b"a".to_vec(), overflow_unchanged: None }];
        let cookie = SalvageCookie { skip: 0, take: 0, missing: 2, done: false };
        let out = apply_salvage(&runs, Some(&cookie));
        assert_eq!(out[0].rle, 2);
        assert!(out[0].deleted);
        assert_eq!(out[1].rle, 3);
    }

    #[test]
    fn no_salvage_passes_runs_through_unchanged() {
        let runs = vec![ColVarRun { rle: 3, deleted: false, value: b"a".to_vec(), overflow_unchanged: None }];
        let out = apply_salvage(&runs, None);
        assert_eq!(out, runs);
    }

    #[test]
    fn writes_one_chunk_for_a_handful_of_small_runs() {
        let cfg = config();
        let mgr = MockBlockManager::new();
        let mut overflow = OverflowTracker::default();
        let page = ColVarPage {
            starting_recno: 1,
            original_runs: vec![
                ColVarRun { rle: 4, deleted: false, value: b"hello".to_vec(), overflow_unchanged: None },
                ColVarRun { rle: 1, deleted: true, value: Vec::new(), overflow_unchanged: None },
            ],
            updates: Vec::new(),
        };
        let boundaries = write_col_var(&page, &cfg, &mut overflow, None, &mgr).unwrap();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].recno, 1);
    }

    #[test]
    fn adjacent_equal_runs_collapse_into_one() {
        let mut overflow = OverflowTracker::default();
        let mgr = MockBlockManager::new();
        let page = ColVarPage {
            starting_recno: 1,
            original_runs: vec![
                ColVarRun { rle: 4, deleted: false, value: b"x".to_vec(), overflow_unchanged: None },
                ColVarRun { rle: 6, deleted: false, value: b"x".to_vec(), overflow_unchanged: None },
            ],
            updates: Vec::new(),
        };
        let out = collapse(&page, &config(), &mut overflow, &mgr).unwrap();
        assert_eq!(out, vec![ColVarRun { rle: 10, deleted: false, value: b"x".to_vec(), overflow_unchanged: None }]);
    }

    #[test]
    fn an_update_splits_a_run_into_three() {
        let mut overflow = OverflowTracker::default();
        let mgr = MockBlockManager::new();
        let page = ColVarPage {
            starting_recno: 1,
            original_runs: vec![ColVarRun { rle: 1000, deleted: false, value: b"x".to_vec(), overflow_unchanged: None }],
            updates: vec![ColVarUpdate { recno: 500, value: ColVarValue::Value(b"y".to_vec()) }],
        };
        let out = collapse(&page, &config(), &mut overflow, &mgr).unwrap();
        assert_eq!(
            out,
            vec![
                ColVarRun { rle: 499, deleted: false, value: b"x".to_vec(), overflow_unchanged: None },
                ColVarRun { rle: 1, deleted: false, value: b"y".to_vec(), overflow_unchanged: None },
                ColVarRun { rle: 500, deleted: false, value: b"x".to_vec(), overflow_unchanged: None },
            ]
        );
    }

    #[test]
    fn an_update_matching_its_neighbor_merges_back_in() {
        let mut overflow = OverflowTracker::default();
        let mgr = MockBlockManager::new();
        let page = ColVarPage {
            starting_recno: 1,
            original_runs: vec![ColVarRun { rle: 10, deleted: false, value: b"x".to_vec(), overflow_unchanged: None }],
            updates: vec![ColVarUpdate { recno: 5, value: ColVarValue::Value(b"x".to_vec()) }],
        };
        let out = collapse(&page, &config(), &mut overflow, &mgr).unwrap();
        assert_eq!(out, vec![ColVarRun { rle: 10, deleted: false, value: b"x".to_vec(), overflow_unchanged: None }]);
    }

    #[test]
    fn untouched_overflow_run_takes_the_raw_copy_fast_path() {
        let mut overflow = OverflowTracker::default();
        let mgr = MockBlockManager::new();
        let block_ref = pagecache::BlockRef { addr: 9, size: 128 };
        let page = ColVarPage {
            starting_recno: 1,
            original_runs: vec![
                ColVarRun { rle: 3, deleted: false, value: b"a".to_vec(), overflow_unchanged: None },
                ColVarRun { rle: 4, deleted: false, value: b"big".to_vec(), overflow_unchanged: Some(block_ref) },
            ],
            updates: Vec::new(),
        };
        let out = collapse(&page, &config(), &mut overflow, &mgr).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].overflow_unchanged, Some(block_ref));
        assert_eq!(out[1].rle, 4);
    }

    #[test]
    fn touching_one_record_in_an_overflow_run_discards_and_decollapses_it() {
        let mut overflow = OverflowTracker::default();
        let mgr = MockBlockManager::new();
        let block_ref = pagecache::BlockRef { addr: 9, size: 128 };
        let page = ColVarPage {
            starting_recno: 1,
            original_runs: vec![ColVarRun { rle: 4, deleted: false, value: b"big".to_vec(), overflow_unchanged: Some(block_ref) }],
            updates: vec![ColVarUpdate { recno: 2, value: ColVarValue::Deleted }],
        };
        let out = collapse(&page, &config(), &mut overflow, &mgr).unwrap();
        assert_eq!(
            out,
            vec![
                ColVarRun { rle: 1, deleted: false, value: b"big".to_vec(), overflow_unchanged: None },
                ColVarRun { rle: 1, deleted: true, value: Vec::new(), overflow_unchanged: None },
                ColVarRun { rle: 2, deleted: false, value: b"big".to_vec(), overflow_unchanged: None },
            ]
        );
        assert!(overflow.commit(&mgr).unwrap().contains(&block_ref));
    }

    #[test]
    fn trailing_appends_gap_fill_non_contiguous_record_numbers() {
        let mut overflow = OverflowTracker::default();
        let mgr = MockBlockManager::new();
        let page = ColVarPage {
            starting_recno: 1,
            original_runs: vec![ColVarRun { rle: 2, deleted: false, value: b"a".to_vec(), overflow_unchanged: None }],
            updates: vec![ColVarUpdate { recno: 5, value: ColVarValue::Value(b"z".to_vec()) }],
        };
        let out = collapse(&page, &config(), &mut overflow, &mgr).unwrap();
        assert_eq!(
            out,
            vec![
                ColVarRun { rle: 2, deleted: false, value: b"a".to_vec(), overflow_unchanged: None },
                ColVarRun { rle: 2, deleted: true, value: Vec::new(), overflow_unchanged: None },
                ColVarRun { rle: 1, deleted: false, value: b"z".to_vec(), overflow_unchanged: None },
            ]
        );
    }

    #[test]
    fn oversized_update_value_is_promoted_to_overflow() {
        let cfg = ConfigBuilder::new().maxleafpage(4096).maxleafitem(4).build().unwrap();
        let mut overflow = OverflowTracker::default();
        let mgr = MockBlockManager::new();
        let page = ColVarPage {
            starting_recno: 1,
            original_runs: vec![ColVarRun { rle: 1, deleted: false, value: b"a".to_vec(), overflow_unchanged: None }],
            updates: vec![ColVarUpdate { recno: 1, value: ColVarValue::Value(b"much-too-long".to_vec()) }],
        };
        let out = collapse(&page, &cfg, &mut overflow, &mgr).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].overflow_unchanged.is_some());
    }
}
