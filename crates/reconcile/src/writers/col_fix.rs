//! C8: the fixed-length (bit-packed) column-store leaf writer. Packs
//! each record's low `bitcnt` bits MSB-first into a byte stream,
//! filling any gap between explicit records with zero (spec §4.4's
//! gap-filling generalized from append-only to the general sparse
//! case). Values are modeled as `u8` here; `bitcnt` beyond 8 is an
//! accepted-but-unexercised corner of `Config` (see DESIGN.md) since no
//! writer in this crate ever produces a value wider than a byte.

use pagecache::{cell_pack_data, BlockManager, ClosedBoundary, Config, DiskBuf, PageType, Result,
    SplitEngine};

use crate::page::ColFixPage;

/// Reconcile a fixed-length column-store leaf page.
pub fn write_col_fix(
    page: &ColFixPage,
    config: &Config,
    block_mgr: &dyn BlockManager,
) -> Result<Vec<ClosedBoundary>> {
    let bitcnt = config.bitcnt;
    let page_size = config.page_size(PageType::ColFix) as usize;
    let mut dsk = DiskBuf::with_capacity(page_size);
    let mut engine = SplitEngine::new(PageType::ColFix, config, page.starting_recno);

    let mut records = page.records.clone();
    records.sort_by_key(|(recno, _)| *recno);
    let mut next_record_idx = 0;

    let mut bits = BitWriter::new(bitcnt);
    let mut positions_since_byte: u64 = 0;

    for recno in page.starting_recno..page.highest_recno {
        let value = if next_record_idx < records.len() && records[next_record_idx].0 == recno {
            let v = records[next_record_idx].1;
            next_record_idx += 1;
            v
        } else {
            0
        };
        positions_since_byte += 1;
        if let Some(byte) = bits.push(value) {
            emit_byte(&mut engine, &mut dsk, block_mgr, byte, positions_since_byte)?;
            positions_since_byte = 0;
        }
    }
    if let Some(byte) = bits.flush() {
        emit_byte(&mut engine, &mut dsk, block_mgr, byte, positions_since_byte)?;
    }

    engine.finish(&mut dsk, block_mgr)
}

fn emit_byte(
    engine: &mut SplitEngine,
    dsk: &mut DiskBuf,
    block_mgr: &dyn BlockManager,
    byte: u8,
    recno_advance: u64,
) -> Result<()> {
    let cell = cell_pack_data(&[byte], 1);
    engine.ensure_space(cell.bytes.len(), dsk, block_mgr, None)?;
    engine.append(dsk, &cell.bytes, recno_advance);
    Ok(())
}

/// MSB-first bit accumulator: `push` feeds one record's low `bitcnt`
/// bits in and returns a completed byte whenever the accumulator fills
/// past 8 bits.
struct BitWriter {
    bitcnt: u8,
    acc: u16,
    acc_bits: u8,
}

impl BitWriter {
    fn new(bitcnt: u8) -> BitWriter {
        BitWriter { bitcnt, acc: 0, acc_bits: 0 }
    }

    fn push(&mut self, value: u8) -> Option<u8> {
        let masked = (value as u16) & ((1u16 << self.bitcnt) - 1);
        self.acc = (self.acc << self.bitcnt) | masked;
        self.acc_bits += self.bitcnt;
        if self.acc_bits >= 8 {
            let shift = self.acc_bits - 8;
            let byte = (self.acc >> shift) as u8;
            self.acc &= (1u16 << shift) - 1;
            self.acc_bits = shift;
            Some(byte)
        } else {
            None
        }
    }

    fn flush(&mut self) -> Option<u8> {
        if self.acc_bits == 0 {
            return None;
        }
        let pad = 8 - self.acc_bits;
        let byte = (self.acc << pad) as u8;
        self.acc = 0;
        self.acc_bits = 0;
        Some(byte)
    }
}

/// Unpack a bit-packed byte stream back into per-record values, the
/// inverse of `BitWriter` — used by tests and available to a future
/// reader built against these pages.
pub(crate) fn unpack_fixed(bitcnt: u8, bytes: &[u8], count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count);
    let mut acc: u16 = 0;
    let mut acc_bits: u8 = 0;
    let mut iter = bytes.iter();
    while out.len() < count {
        while acc_bits < bitcnt {
            let byte = *iter.next().expect("not enough packed bytes for requested record count");
            acc = (acc << 8) | byte as u16;
            acc_bits += 8;
        }
        let shift = acc_bits - bitcnt;
        let value = (acc >> shift) as u8 & ((1u16 << bitcnt) - 1) as u8;
        acc &= (1u16 << shift) - 1;
        acc_bits = shift;
        out.push(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagecache::mock::MockBlockManager;
    use pagecache::ConfigBuilder;

    fn config(bitcnt: u8) -> Config {
        ConfigBuilder::new().maxleafpage(4096).bitcnt(bitcnt).build().unwrap()
    }

    #[test]
    fn bit_writer_round_trips_through_unpack_fixed() {
        let values = [1u8, 0, 1, 1, 0, 0, 1, 0, 1];
        let mut writer = BitWriter::new(1);
        let mut bytes = Vec::new();
        for &v in &values {
            if let Some(b) = writer.push(v) {
                bytes.push(b);
            }
        }
        if let Some(b) = writer.flush() {
            bytes.push(b);
        }
        let decoded = unpack_fixed(1, &bytes, values.len());
        assert_eq!(decoded, values.to_vec());
    }

    #[test]
    fn eight_bit_values_round_trip_byte_for_byte() {
        let values = [0u8, 1, 255, 128, 64];
        let mut writer = BitWriter::new(8);
        let mut bytes = Vec::new();
        for &v in &values {
            if let Some(b) = writer.push(v) {
                bytes.push(b);
            }
        }
        assert!(writer.flush().is_none());
        assert_eq!(bytes, values.to_vec());
    }

    #[test]
    fn gap_filled_records_decode_to_zero() {
        let cfg = config(8);
        let mgr = MockBlockManager::new();
        let page = ColFixPage {
            starting_recno: 1,
            records: vec![(1, 9), (4, 7)],
            highest_recno: 5,
        };
        let boundaries = write_col_fix(&page, &cfg, &mgr).unwrap();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].recno, 1);
    }
}
