//! Growable, offset-addressed scratch buffers (C2). Spec §9 calls out
//! the source's raw-pointer-into-`dsk` approach as something to
//! re-architect: "replace with byte offsets into `dsk`... offsets are
//! stable across growth and make the fix-up `memmove` safer." Every
//! buffer here is addressed by `usize` offset, never by pointer.

/// A single growable byte buffer standing in for the source's `WT_BUF`:
/// `data` is the live content, `size` the logical length in use,
/// `memsize` the allocated capacity.
#[derive(Debug, Default, Clone)]
pub struct DiskBuf {
    data: Vec<u8>,
}

impl DiskBuf {
    /// A buffer pre-sized (and zero-filled) to exactly `memsize` bytes,
    /// matching the reconcile state's `dsk` working buffer sized to the
    /// configured maximum page size for the page type being built.
    pub fn with_capacity(memsize: usize) -> DiskBuf {
        DiskBuf { data: vec![0u8; memsize] }
    }

    /// Logical capacity of the buffer.
    pub fn memsize(&self) -> usize {
        self.data.len()
    }

    /// Reset the buffer for reuse without freeing its allocation —
    /// the reconcile state is cached on the tree handle and reused
    /// across calls (spec §3/§5); we zero only the bytes we are about
    /// to reuse, not the whole backing `Vec`.
    pub fn reset(&mut self) {
        for b in self.data.iter_mut() {
            *b = 0;
        }
    }

    /// Grow the buffer so it can hold at least `needed` bytes,
    /// preserving existing content. Returns the new capacity.
    pub fn ensure(&mut self, needed: usize) -> usize {
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }
        self.data.len()
    }

    /// Write `bytes` starting at `offset`, growing the buffer if
    /// necessary.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        self.ensure(end);
        self.data[offset..end].copy_from_slice(bytes);
    }

    /// Immutable view of `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Copy `len` bytes starting at `src` down to `dst` within the same
    /// buffer — the fix-up algorithm's residual-chunk `memmove` (spec
    /// §4.1 step 4). `dst <= src` is expected (shifting data toward the
    /// front of the buffer) but not required; `copy_within` handles
    /// overlap in either direction.
    pub fn move_within(&mut self, src: usize, dst: usize, len: usize) {
        self.data.copy_within(src..src + len, dst);
    }

    /// The full buffer, for handing a padded chunk to the block manager.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// A zero-padded copy of `self.slice(0, len)`, grown or truncated to
    /// exactly `padded_len` bytes — the scratch buffer used by the
    /// fix-up algorithm's step 1 allocation.
    pub fn padded_copy(&self, len: usize, padded_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; padded_len];
        let copy_len = len.min(padded_len);
        out[..copy_len].copy_from_slice(&self.data[..copy_len]);
        out
    }
}
