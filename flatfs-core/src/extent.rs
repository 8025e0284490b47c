//! The extent record and the block-run allocation policies built on top of
//! the block bitmap (§4.2: exact-fit tail-anchored, and longest-available).

use crate::bitmap::BitmapMut;
use crate::error::{FsError, FsResult};
use crate::layout::Superblock;

/// A contiguous run of data blocks owned by one inode.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Extent {
    pub start_block: u32,
    pub block_count: u32,
}

/// Allocates a run of exactly `len` consecutive free blocks.
///
/// Preference order: a run starting immediately after the highest
/// currently-used block (keeps files contiguous at the tail), then the
/// first matching run scanning from block 0.
pub fn allocate_exact(
    sb: &mut Superblock,
    bitmap: &mut BitmapMut,
    len: u32,
) -> FsResult<u32> {
    if len == 0 {
        return Ok(0);
    }
    let start = tail_anchored_run(bitmap, len).or_else(|| bitmap.scan_run(len as usize));
    let start = start.ok_or(FsError::NoSpace)?;
    for b in start..start + len {
        bitmap.set(b as usize);
    }
    sb.free_blocks_count -= len;
    Ok(start)
}

/// Finds (without allocating) the longest run of consecutive free blocks.
/// Fails only when the filesystem has zero free blocks.
pub fn allocate_longest(sb: &mut Superblock, bitmap: &mut BitmapMut) -> FsResult<(u32, u32)> {
    if sb.free_blocks_count == 0 {
        return Err(FsError::NoSpace);
    }
    let (start, len) = bitmap.longest_free_run().ok_or(FsError::NoSpace)?;
    for b in start..start + len {
        bitmap.set(b as usize);
    }
    sb.free_blocks_count -= len as u32;
    Ok((start as u32, len as u32))
}

/// Releases a previously allocated run, zeroing its bitmap bits and
/// restoring the free-block counter. Does not zero the blocks' contents;
/// callers that need zeroed-on-reuse semantics zero before freeing.
pub fn free_run(sb: &mut Superblock, bitmap: &mut BitmapMut, start: u32, len: u32) {
    for b in start..start + len {
        bitmap.clear(b as usize);
    }
    sb.free_blocks_count += len;
}

/// Attempts to place `len` free blocks immediately after the highest used
/// block in the filesystem (i.e. at the tail of the in-use region).
fn tail_anchored_run(bitmap: &BitmapMut, len: u32) -> Option<u32> {
    let after_highest = bitmap.highest_set().map(|h| h + 1).unwrap_or(0);
    if bitmap.is_run_free(after_highest, len as usize) {
        Some(after_highest as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fresh(bits: usize) -> (Superblock, Vec<u8>) {
        let sb = Superblock {
            magic: 0,
            total_size: 0,
            inode_bitmap_start: 0,
            block_bitmap_start: 0,
            inode_table_start: 0,
            data_start: 0,
            inode_bitmap_blocks: 0,
            block_bitmap_blocks: 0,
            inode_table_blocks: 0,
            inodes_count: 0,
            blocks_count: bits as u32,
            free_inodes_count: 0,
            free_blocks_count: bits as u32,
        };
        (sb, vec![0u8; bits.div_ceil(8)])
    }

    #[test]
    fn exact_fit_prefers_tail() {
        let (mut sb, mut bytes) = fresh(64);
        let mut bm = BitmapMut::new(&mut bytes, 64);
        // Use up the first 4 blocks so the "tail" is at index 4.
        let first = allocate_exact(&mut sb, &mut bm, 4).unwrap();
        assert_eq!(first, 0);
        let second = allocate_exact(&mut sb, &mut bm, 4).unwrap();
        assert_eq!(second, 4);
        assert_eq!(sb.free_blocks_count, 64 - 8);
    }

    #[test]
    fn exact_fit_falls_back_to_first_fit_hole() {
        let (mut sb, mut bytes) = fresh(16);
        let mut bm = BitmapMut::new(&mut bytes, 16);
        // Mark 0..4 and 8..16 used, leaving a hole at 4..8.
        for i in 0..4 {
            bm.set(i);
        }
        for i in 8..16 {
            bm.set(i);
        }
        sb.free_blocks_count = 4;
        let start = allocate_exact(&mut sb, &mut bm, 4).unwrap();
        assert_eq!(start, 4);
        assert_eq!(sb.free_blocks_count, 0);
    }

    #[test]
    fn exact_fit_no_such_run() {
        let (mut sb, mut bytes) = fresh(8);
        let mut bm = BitmapMut::new(&mut bytes, 8);
        bm.set(0);
        bm.set(2);
        sb.free_blocks_count = 6;
        assert_eq!(allocate_exact(&mut sb, &mut bm, 6), Err(FsError::NoSpace));
    }

    #[test]
    fn longest_available_picks_biggest_hole() {
        let (mut sb, mut bytes) = fresh(16);
        let mut bm = BitmapMut::new(&mut bytes, 16);
        bm.set(0);
        for i in 5..7 {
            bm.set(i);
        }
        sb.free_blocks_count = 13;
        let (start, len) = allocate_longest(&mut sb, &mut bm).unwrap();
        assert_eq!((start, len), (7, 9));
        assert_eq!(sb.free_blocks_count, 4);
    }

    #[test]
    fn longest_available_fails_when_full() {
        let (mut sb, mut bytes) = fresh(8);
        let mut bm = BitmapMut::new(&mut bytes, 8);
        for i in 0..8 {
            bm.set(i);
        }
        sb.free_blocks_count = 0;
        assert_eq!(allocate_longest(&mut sb, &mut bm), Err(FsError::NoSpace));
    }

    #[test]
    fn free_run_restores_counter_and_bits() {
        let (mut sb, mut bytes) = fresh(8);
        let mut bm = BitmapMut::new(&mut bytes, 8);
        let start = allocate_exact(&mut sb, &mut bm, 3).unwrap();
        free_run(&mut sb, &mut bm, start, 3);
        assert_eq!(sb.free_blocks_count, 8);
        for i in 0..3 {
            assert!(!bm.test(i));
        }
    }
}
