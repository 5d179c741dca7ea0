//! Key compression helpers shared by the row-store writers (spec
//! §4.2/§4.3): prefix compression of row-leaf keys against the
//! previous key on the same chunk, and suffix truncation of the keys
//! promoted to a row-internal page's boundary cells. Adapted from
//! `sled::prefix`'s `prefix_encode`/`prefix_decode` pair, but working
//! directly in terms of `(prefix_len, suffix)` rather than a single
//! length-prefixed buffer, since `pagecache::cell::cell_pack_key`
//! already keeps those two pieces apart.

/// Number of leading bytes `cur` shares with `last`, capped at
/// `u8::MAX` (a cell's prefix-length field is a single byte).
pub(crate) fn common_prefix_len(last: &[u8], cur: &[u8]) -> u8 {
    let max = u8::MAX as usize;
    last.iter()
        .zip(cur)
        .take(max)
        .take_while(|(a, b)| a == b)
        .count() as u8
}

/// Reconstruct a full key from the previous key's leading `prefix_len`
/// bytes plus `suffix`. Exists for round-trip tests and for any reader
/// built against these pages; the writers here only ever encode.
pub(crate) fn prefix_decode(last: &[u8], prefix_len: u8, suffix: &[u8]) -> Vec<u8> {
    let prefix_len = prefix_len as usize;
    let mut out = Vec::with_capacity(prefix_len + suffix.len());
    out.extend_from_slice(&last[..prefix_len]);
    out.extend_from_slice(suffix);
    out
}

/// The shortest prefix of `cur` that still sorts strictly after `prev`
/// (spec §4.3's row-internal suffix compression): a promoted boundary
/// key only has to separate the left and right subtrees, not reproduce
/// the full key that triggered the split. Falls back to the whole key
/// if `cur` turns out to be a prefix of `prev` (should not happen for
/// keys already in sorted order, but truncating all the way down would
/// make the boundary key compare equal to `prev`).
pub(crate) fn suffix_truncate(prev: &[u8], cur: &[u8]) -> Vec<u8> {
    let mismatch = prev
        .iter()
        .zip(cur)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| prev.len().min(cur.len()));

    if mismatch >= cur.len() {
        return cur.to_vec();
    }
    cur[..=mismatch].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prefix_len_counts_matching_leading_bytes() {
        assert_eq!(common_prefix_len(b"cat", b"catt"), 3);
        assert_eq!(common_prefix_len(b"cat", b"cb"), 1);
        assert_eq!(common_prefix_len(b"cat", b"zig"), 0);
        assert_eq!(common_prefix_len(b"", b"zig"), 0);
    }

    #[test]
    fn prefix_decode_reverses_common_prefix_len() {
        let last = b"catalog";
        for cur in [&b"catalog"[..], b"catapult", b"cb", b"zzz"] {
            let n = common_prefix_len(last, cur);
            let suffix = &cur[n as usize..];
            assert_eq!(prefix_decode(last, n, suffix), cur);
        }
    }

    #[test]
    fn suffix_truncate_keeps_only_through_the_first_differing_byte() {
        assert_eq!(suffix_truncate(b"apple", b"apricot"), b"apr".to_vec());
        assert_eq!(suffix_truncate(b"abc", b"abd"), b"abd".to_vec());
        assert_eq!(suffix_truncate(b"", b"zzz"), b"z".to_vec());
    }

    #[test]
    fn suffix_truncate_result_always_sorts_after_distinct_prev() {
        for (prev, cur) in [(&b"apple"[..], &b"apricot"[..]), (b"abc", b"abd"), (b"", b"zzz")] {
            assert!(suffix_truncate(prev, cur).as_slice() > prev);
        }
    }

    #[test]
    fn suffix_truncate_falls_back_to_full_key_when_prev_is_a_prefix_of_cur() {
        assert_eq!(suffix_truncate(b"ab", b"ab"), b"ab".to_vec());
    }
}
