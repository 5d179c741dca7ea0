//! The page data model (spec §3): what a writer consumes as input, and
//! what reconciliation produces as output. Grounded on the shape of
//! `tree::node::Node`/`Frag` in the teacher repo (a page is either
//! still on disk, fully replaced, emptied, or holding an ephemeral
//! split), generalized here to the four on-disk page formats instead
//! of a single LSM-style fragment chain.

use pagecache::BlockRef;

/// Guides salvage (recovery) reconciliation: which records to drop
/// from the head/tail of a page and which to synthesize as missing
/// (spec §6). `None` everywhere but `done` means "not salvaging".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SalvageCookie {
    /// Records to drop from the head of the page.
    pub skip: u64,
    /// Records to keep starting at `skip`; `0` means all remaining.
    pub take: u64,
    /// Records to synthesize as deletions before any real content.
    pub missing: u64,
    /// Set once `take` is exhausted.
    pub done: bool,
}

/// The result of reconciling one page (spec §3/§4.6): what the page's
/// `modify` record becomes.
#[derive(Clone, Debug, PartialEq)]
pub enum PageState {
    /// The page has no live entries; the parent should drop its
    /// reference on next eviction.
    Empty,
    /// Single-block replacement.
    Replace(BlockRef),
    /// The page split; these are the ephemeral in-memory child
    /// references, never persisted as their own internal page.
    Split(Vec<ChildBoundary>),
    /// Unmodified: still exactly the on-disk block it started as.
    Disk(BlockRef),
}

/// One child reference in an ephemeral split page or a row/column
/// internal page, keyed either by a row-store key or a column-store
/// starting record number.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildBoundary {
    /// The promoted key (row-store) or starting recno (column-store),
    /// already resolved to whichever this page format uses.
    pub key: ChildKey,
    /// Where the child's chunk landed.
    pub block_ref: BlockRef,
}

/// A child reference's routing key.
#[derive(Clone, Debug, PartialEq)]
pub enum ChildKey {
    /// Row-store: a (possibly suffix-compressed) key.
    Key(Vec<u8>),
    /// Column-store: a starting record number.
    Recno(u64),
}

/// How a row-leaf key is represented in the source page, before the
/// writer rebuilds it (spec §4.2).
#[derive(Clone, Debug, PartialEq)]
pub enum KeySource {
    /// Stored out-of-band; the writer copies the reference through
    /// without ever materializing the bytes.
    Overflow(BlockRef),
    /// Already a full, in-memory key.
    Instantiated(Vec<u8>),
    /// Still compressed relative to the preceding key in the
    /// *original* on-disk chunk (not the chunk currently being built).
    Uninstantiated {
        /// Shared-prefix length with the previous on-disk key.
        prefix_len: u8,
        /// Bytes distinguishing this key from that prefix.
        suffix: Vec<u8>,
    },
}

/// How a row-leaf slot's original value is represented.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueSource {
    /// In-line, already-decoded bytes.
    Inline(Vec<u8>),
    /// Stored out-of-band.
    Overflow(BlockRef),
}

/// The pending update chain for one slot, already collapsed to its
/// single effective outcome (chain resolution itself belongs to the
/// out-of-scope metadata/cache layer, spec §1).
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    /// No pending update: use the original value verbatim.
    None,
    /// The slot was deleted.
    Deleted,
    /// Replaced with fresh bytes.
    Value(Vec<u8>),
}

/// A freshly inserted key/value pair, always fully instantiated (spec
/// §4.2: "Inserts go through the same key/value build path but always
/// with instantiated keys").
#[derive(Clone, Debug, PartialEq)]
pub struct Insert {
    /// The inserted key.
    pub key: Vec<u8>,
    /// The inserted value (`None` for an inserted tombstone).
    pub value: Option<Vec<u8>>,
}

/// One original on-disk row-leaf slot plus whatever inserts follow it
/// before the next slot.
#[derive(Clone, Debug, PartialEq)]
pub struct RowLeafSlot {
    /// The slot's key, in whichever form the source page left it.
    pub key: KeySource,
    /// The slot's original value.
    pub original_value: ValueSource,
    /// The slot's pending update, if any.
    pub update: Update,
    /// Inserts sorted immediately after this slot's key, before the
    /// next slot's key.
    pub appended_inserts: Vec<Insert>,
}

/// A row-store leaf page's reconciliation input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowLeafPage {
    /// Inserts preceding the smallest key already on disk.
    pub leading_inserts: Vec<Insert>,
    /// Original slots, each carrying whatever was inserted after it.
    pub slots: Vec<RowLeafSlot>,
}

/// What a row-internal page's child currently is.
#[derive(Clone, Debug, PartialEq)]
pub struct RowInternalChild {
    /// The child's routing key (the parent's own copy, used as the
    /// merge-correction key if the child turns out to be an ephemeral
    /// split — spec §4.3).
    pub key: KeySource,
    /// The child's current reconciliation state.
    pub state: PageState,
}

/// A row-store internal page's reconciliation input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowInternalPage {
    /// Child references, in key order.
    pub children: Vec<RowInternalChild>,
}

/// What a column-internal page's child currently is.
#[derive(Clone, Debug, PartialEq)]
pub struct ColInternalChild {
    /// The child's starting record number.
    pub recno: u64,
    /// The child's current reconciliation state.
    pub state: PageState,
}

/// A column-store internal page's reconciliation input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColInternalPage {
    /// Child references, in record-number order.
    pub children: Vec<ColInternalChild>,
}

/// One run of identically-valued variable-column records (spec §4.4).
/// A run of length 1 is just an un-collapsed single record. Used both
/// as the original on-disk run shape and as this writer's own output.
#[derive(Clone, Debug, PartialEq)]
pub struct ColVarRun {
    /// Number of consecutive record numbers this run covers.
    pub rle: u64,
    /// Whether these records are tombstoned.
    pub deleted: bool,
    /// The shared value (ignored when `deleted`, unless
    /// `overflow_unchanged` is set).
    pub value: Vec<u8>,
    /// Set when this run is an original overflow cell with no update
    /// touching any record in it: the fast path copies the reference
    /// through without decoding or comparing (spec §4.4).
    pub overflow_unchanged: Option<BlockRef>,
}

/// A single record's replacement value, from the pending update chain.
#[derive(Clone, Debug, PartialEq)]
pub enum ColVarValue {
    /// The record was deleted.
    Deleted,
    /// The record was replaced with fresh bytes.
    Value(Vec<u8>),
}

/// One pending update against a variable-column leaf page: either
/// overriding a record already covered by `original_runs`, filling a
/// gap between them, or appending past the page's original record
/// range (spec §4.4).
#[derive(Clone, Debug, PartialEq)]
pub struct ColVarUpdate {
    /// The record number this update applies to.
    pub recno: u64,
    /// The update's effective value.
    pub value: ColVarValue,
}

/// A variable-length column-store leaf page's reconciliation input.
/// Unlike the other page formats, this writer itself performs the
/// run-length collapse (spec §4.4): `original_runs` is exactly what
/// was on disk, and `updates` carries every override, gap-fill, or
/// trailing append still pending against it, in ascending `recno`
/// order with no duplicate record numbers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColVarPage {
    /// The page's starting record number.
    pub starting_recno: u64,
    /// Runs in record-number order, exactly as last persisted.
    pub original_runs: Vec<ColVarRun>,
    /// Pending updates against `original_runs`' record range, plus any
    /// trailing appends beyond it, sorted by `recno` ascending.
    pub updates: Vec<ColVarUpdate>,
}

/// A fixed-length (bit-packed) column-store leaf page's reconciliation
/// input. Sparse: only explicitly present record numbers carry a
/// value; everything else up to the highest record number is a gap,
/// filled with `0` (spec §4.4's "gap-filling for sparse record
/// numbers" generalized from append-only to the general sparse case).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColFixPage {
    /// The page's starting record number.
    pub starting_recno: u64,
    /// Explicit (record number, value) pairs, `value` using only the
    /// low `bitcnt` bits configured for this tree.
    pub records: Vec<(u64, u8)>,
    /// One past the highest record number this page covers; any
    /// record in `[starting_recno, highest)` absent from `records` is
    /// a gap filled with `0`.
    pub highest_recno: u64,
}

/// Dispatch union over the five reconcilable page formats (spec §4.1's
/// `PageWriter` capability, re-expressed as data rather than a trait
/// object since each variant's writer needs format-specific input
/// anyway).
#[derive(Clone, Debug, PartialEq)]
pub enum PageInput {
    /// C5.
    RowLeaf(RowLeafPage),
    /// C6.
    RowInternal(RowInternalPage),
    /// C9.
    ColInternal(ColInternalPage),
    /// C7.
    ColVar(ColVarPage),
    /// C8.
    ColFix(ColFixPage),
}

impl PageInput {
    /// The wire page-type tag this input reconciles to.
    pub fn page_type(&self) -> pagecache::PageType {
        match self {
            PageInput::RowLeaf(_) => pagecache::PageType::RowLeaf,
            PageInput::RowInternal(_) => pagecache::PageType::RowInt,
            PageInput::ColInternal(_) => pagecache::PageType::ColInt,
            PageInput::ColVar(_) => pagecache::PageType::ColVar,
            PageInput::ColFix(_) => pagecache::PageType::ColFix,
        }
    }
}
