//! Block-extent addressing. Pure logic, no I/O.

use std::io::{self, Write};
use std::slice;

use crate::error::{Error, Result};

/// Wire value for `num_blocks` marking an extent with no real address.
pub const PSEUDO_EXTENT_MARKER: u64 = u64::MAX;

/// A run of fixed-size blocks on a partition.
///
/// The wire format reserves a sentinel block count for extents that carry no
/// address; those become [`Extent::Pseudo`] here so nothing can accidentally
/// do arithmetic on the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Real { start_block: u64, num_blocks: u64 },
    Pseudo,
}

impl Extent {
    pub fn is_pseudo(&self) -> bool {
        matches!(self, Extent::Pseudo)
    }

    /// Byte offset and length of this extent, independent of any partition.
    ///
    /// Fails on pseudo-extents, zero-length extents, and arithmetic overflow.
    pub fn byte_range(&self, block_size: u64) -> Result<(u64, u64)> {
        let (start_block, num_blocks) = match *self {
            Extent::Real {
                start_block,
                num_blocks,
            } => (start_block, num_blocks),
            Extent::Pseudo => {
                return Err(Error::InvalidExtent(
                    "pseudo-extent has no byte range".into(),
                ));
            }
        };
        if num_blocks == 0 {
            return Err(Error::InvalidExtent("extent with zero blocks".into()));
        }
        let offset = start_block
            .checked_mul(block_size)
            .ok_or_else(|| Error::InvalidExtent(format!("start block {start_block} overflows")))?;
        let len = num_blocks
            .checked_mul(block_size)
            .ok_or_else(|| Error::InvalidExtent(format!("block count {num_blocks} overflows")))?;
        offset
            .checked_add(len)
            .ok_or_else(|| Error::InvalidExtent(format!("extent end past {offset} overflows")))?;
        Ok((offset, len))
    }
}

/// Total writable capacity of `extents` on a partition of `partition_len`
/// bytes. The final extent may be clamped by the partition's tail block.
pub fn extents_capacity(extents: &[Extent], block_size: u64, partition_len: u64) -> Result<u64> {
    let mut total = 0u64;
    for extent in extents {
        let (offset, len) = extent.byte_range(block_size)?;
        if offset >= partition_len {
            return Err(Error::InvalidExtent(format!(
                "extent at byte {offset} starts past partition end {partition_len}"
            )));
        }
        total += len.min(partition_len - offset);
    }
    Ok(total)
}

/// Split one partition buffer into per-extent mutable windows, in the order
/// the extents are listed.
///
/// Extents must not overlap within one operation. An extent running past the
/// end of the buffer is clamped to it (tail block); an extent starting past
/// the end is an error.
pub fn carve_extents<'a>(
    partition: &'a mut [u8],
    block_size: u64,
    extents: &[Extent],
) -> Result<Vec<&'a mut [u8]>> {
    let partition_len = partition.len() as u64;

    // Resolve to byte ranges, keeping the listed position of each extent.
    let mut ranges: Vec<(usize, u64, u64)> = Vec::with_capacity(extents.len());
    for (index, extent) in extents.iter().enumerate() {
        let (offset, len) = extent.byte_range(block_size)?;
        if offset >= partition_len {
            return Err(Error::InvalidExtent(format!(
                "extent at byte {offset} starts past partition end {partition_len}"
            )));
        }
        ranges.push((index, offset, len.min(partition_len - offset)));
    }

    // Walk the buffer in address order, splitting off each window.
    ranges.sort_by_key(|&(_, offset, _)| offset);
    let mut carved: Vec<(usize, &'a mut [u8])> = Vec::with_capacity(ranges.len());
    let mut remaining = partition;
    let mut consumed = 0u64;
    for (index, offset, len) in ranges {
        if offset < consumed {
            return Err(Error::InvalidExtent(
                "operation has overlapping destination extents".into(),
            ));
        }
        let skip = (offset - consumed) as usize;
        let (_, rest) = remaining.split_at_mut(skip);
        let (window, rest) = rest.split_at_mut(len as usize);
        remaining = rest;
        consumed = offset + len;
        carved.push((index, window));
    }

    // Hand the windows back in listed order.
    carved.sort_by_key(|&(index, _)| index);
    Ok(carved.into_iter().map(|(_, window)| window).collect())
}

/// Merge windows that are adjacent in memory so large writes cross fewer
/// window boundaries.
pub fn coalesce_extents(windows: &mut Vec<&mut [u8]>) {
    let mut out: Vec<&mut [u8]> = Vec::with_capacity(windows.len());
    for window in windows.drain(..) {
        match out.last_mut() {
            Some(prev) if prev.as_ptr() as usize + prev.len() == window.as_ptr() as usize => {
                // SAFETY: both windows are disjoint sub-slices of the same
                // partition buffer and `window` starts exactly where `prev`
                // ends, so the joined range is one valid exclusive borrow.
                *prev = unsafe {
                    slice::from_raw_parts_mut(prev.as_mut_ptr(), prev.len() + window.len())
                };
            }
            _ => out.push(window),
        }
    }
    *windows = out;
}

/// Writes a byte stream across multiple destination windows in listed order.
pub struct ExtentsWriter<'w, 'a> {
    windows: &'w mut [&'a mut [u8]],
    idx: usize,
    off: usize,
    total_written: usize,
}

impl<'w, 'a> ExtentsWriter<'w, 'a> {
    pub fn new(windows: &'w mut [&'a mut [u8]]) -> Self {
        Self {
            windows,
            idx: 0,
            off: 0,
            total_written: 0,
        }
    }

    /// Total bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.total_written
    }

    fn advance_to_available_window(&mut self) {
        while self.idx < self.windows.len() && self.off >= self.windows[self.idx].len() {
            self.idx += 1;
            self.off = 0;
        }
    }
}

impl Write for ExtentsWriter<'_, '_> {
    fn write(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        self.advance_to_available_window();
        while !buf.is_empty() && self.idx < self.windows.len() {
            let window = &mut self.windows[self.idx];
            let to_copy = (window.len() - self.off).min(buf.len());
            window[self.off..self.off + to_copy].copy_from_slice(&buf[..to_copy]);
            self.off += to_copy;
            written += to_copy;
            buf = &buf[to_copy..];
            self.advance_to_available_window();
        }
        self.total_written += written;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BLOCK: u64 = 4096;

    fn real(start_block: u64, num_blocks: u64) -> Extent {
        Extent::Real {
            start_block,
            num_blocks,
        }
    }

    #[test]
    fn resolves_byte_range() {
        assert_eq!(real(3, 2).byte_range(BLOCK).unwrap(), (12288, 8192));
    }

    #[test]
    fn rejects_zero_blocks() {
        assert!(matches!(
            real(0, 0).byte_range(BLOCK),
            Err(Error::InvalidExtent(_))
        ));
    }

    #[test]
    fn rejects_pseudo_byte_range() {
        assert!(matches!(
            Extent::Pseudo.byte_range(BLOCK),
            Err(Error::InvalidExtent(_))
        ));
    }

    #[test]
    fn rejects_overflowing_extent() {
        assert!(matches!(
            real(u64::MAX / 2, 2).byte_range(BLOCK),
            Err(Error::InvalidExtent(_))
        ));
    }

    #[test]
    fn writer_splits_across_listed_extents() {
        // Destination extents [(0, 2), (5, 1)]: the first 8192 output bytes
        // land at [0, 8192) and the rest at [20480, 24576).
        let mut partition = vec![0u8; 24576];
        let extents = [real(0, 2), real(5, 1)];
        let mut windows = carve_extents(&mut partition, BLOCK, &extents).unwrap();
        let data: Vec<u8> = (0..12288u32).map(|i| (i % 251) as u8).collect();

        let mut writer = ExtentsWriter::new(windows.as_mut_slice());
        writer.write_all(&data).unwrap();
        assert_eq!(writer.bytes_written(), 12288);

        assert_eq!(&partition[..8192], &data[..8192]);
        assert_eq!(&partition[8192..20480], &vec![0u8; 12288][..]);
        assert_eq!(&partition[20480..], &data[8192..]);
    }

    #[test]
    fn carve_preserves_listed_order() {
        let mut partition = vec![0u8; 12288];
        // Listed out of address order on purpose.
        let extents = [real(2, 1), real(0, 1)];
        let mut windows = carve_extents(&mut partition, BLOCK, &extents).unwrap();
        let mut writer = ExtentsWriter::new(windows.as_mut_slice());
        let mut data = vec![1u8; 4096];
        data.extend_from_slice(&[2u8; 4096]);
        writer.write_all(&data).unwrap();
        assert_eq!(partition[0], 2);
        assert_eq!(partition[8192], 1);
    }

    #[test]
    fn carve_rejects_overlap() {
        let mut partition = vec![0u8; 12288];
        let extents = [real(0, 2), real(1, 1)];
        assert!(matches!(
            carve_extents(&mut partition, BLOCK, &extents),
            Err(Error::InvalidExtent(_))
        ));
    }

    #[test]
    fn carve_clamps_tail_block() {
        // Partition of 6000 bytes: the second block is a 1904-byte tail.
        let mut partition = vec![0u8; 6000];
        let windows = carve_extents(&mut partition, BLOCK, &[real(0, 2)]).unwrap();
        assert_eq!(windows[0].len(), 6000);
    }

    #[test]
    fn carve_rejects_extent_past_end() {
        let mut partition = vec![0u8; 4096];
        assert!(matches!(
            carve_extents(&mut partition, BLOCK, &[real(2, 1)]),
            Err(Error::InvalidExtent(_))
        ));
    }

    #[test]
    fn coalesce_merges_adjacent_windows() {
        let mut partition = vec![0u8; 12288];
        let extents = [real(0, 1), real(1, 1), real(2, 1)];
        let mut windows = carve_extents(&mut partition, BLOCK, &extents).unwrap();
        coalesce_extents(&mut windows);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 12288);
    }

    #[test]
    fn coalesce_keeps_gapped_windows_apart() {
        let mut partition = vec![0u8; 12288];
        let extents = [real(0, 1), real(2, 1)];
        let mut windows = carve_extents(&mut partition, BLOCK, &extents).unwrap();
        coalesce_extents(&mut windows);
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn capacity_sums_and_clamps() {
        let extents = [real(0, 2), real(5, 1)];
        assert_eq!(extents_capacity(&extents, BLOCK, 24576).unwrap(), 12288);
        // Final extent clamped by a short partition.
        assert_eq!(extents_capacity(&extents, BLOCK, 22000).unwrap(), 9712);
    }
}
