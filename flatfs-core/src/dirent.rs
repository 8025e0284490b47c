//! The directory engine (§4.4): directory entries are packed into a
//! directory inode's data blocks exactly like file bytes are, just
//! interpreted as an array of fixed-size records instead of raw bytes.

use crate::error::{FsError, FsResult};
use crate::fs::Flatfs;
use crate::inode::Inode;
use crate::layout::{BLOCK_SIZE, MAX_EXTENTS, NAME_MAX};
use std::mem::size_of;

/// One directory entry: a child inode number and its name, NUL-padded.
/// `ino == 0` marks a free (deleted or never-used) slot — `ROOT_INO` is 0,
/// but the root can never appear as a child entry, so 0 is unambiguous.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DirEntry {
    pub ino: u32,
    pub name: [u8; NAME_MAX],
}

const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / size_of::<DirEntry>();

impl DirEntry {
    fn empty() -> Self {
        Self {
            ino: 0,
            name: [0; NAME_MAX],
        }
    }

    fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    fn set_name(&mut self, name: &str) {
        self.name = [0; NAME_MAX];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }
}

fn encode_slot(block: &mut [u8], slot: usize, entry: &DirEntry) {
    let off = slot * size_of::<DirEntry>();
    block[off..off + 4].copy_from_slice(&entry.ino.to_ne_bytes());
    block[off + 4..off + size_of::<DirEntry>()].copy_from_slice(&entry.name);
}

fn decode_slot(block: &[u8], slot: usize) -> DirEntry {
    let off = slot * size_of::<DirEntry>();
    let mut ino_bytes = [0u8; 4];
    ino_bytes.copy_from_slice(&block[off..off + 4]);
    let mut name = [0u8; NAME_MAX];
    name.copy_from_slice(&block[off + 4..off + size_of::<DirEntry>()]);
    DirEntry {
        ino: u32::from_ne_bytes(ino_bytes),
        name,
    }
}

fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name.len() > NAME_MAX || name.contains('/') {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

/// Walks every slot of every block in `inode`'s extents, calling `visit`
/// with each block-relative slot until it returns `Some`.
fn for_each_slot<T>(
    fs: &Flatfs,
    inode: &Inode,
    mut visit: impl FnMut(u32, usize, DirEntry) -> Option<T>,
) -> Option<T> {
    for extent in fs.read_extents(inode) {
        for b in extent.start_block..extent.start_block + extent.block_count {
            let block = fs.data_block(b);
            for slot in 0..ENTRIES_PER_BLOCK {
                let entry = decode_slot(block, slot);
                if let Some(r) = visit(b, slot, entry) {
                    return Some(r);
                }
            }
        }
    }
    None
}

/// Lists the live entries of a directory, in on-disk order.
pub fn iterate(fs: &Flatfs, inode: &Inode) -> Vec<(String, u32)> {
    let mut out = Vec::with_capacity(inode.entry_count as usize);
    for_each_slot(fs, inode, |_, _, entry| -> Option<()> {
        if entry.ino != 0 {
            out.push((entry.name_str().to_string(), entry.ino));
        }
        None
    });
    out
}

/// Looks up `name` among `inode`'s live entries.
pub fn find(fs: &Flatfs, inode: &Inode, name: &str) -> Option<u32> {
    for_each_slot(fs, inode, |_, _, entry| {
        (entry.ino != 0 && entry.name_str() == name).then_some(entry.ino)
    })
}

/// Inserts `(name, child_ino)` into directory `dir_ino`, reusing a deleted
/// slot if one exists, otherwise growing the directory by one block.
pub fn insert(fs: &mut Flatfs, dir_ino: u32, name: &str, child_ino: u32) -> FsResult<()> {
    validate_name(name)?;
    let inode = fs.get_inode(dir_ino);

    let free_slot = for_each_slot(fs, &inode, |b, slot, entry| (entry.ino == 0).then_some((b, slot)));

    let mut new_entry = DirEntry::empty();
    new_entry.ino = child_ino;
    new_entry.set_name(name);

    match free_slot {
        Some((b, slot)) => encode_slot(fs.data_block_mut(b), slot, &new_entry),
        None => {
            if inode.extent_count as usize >= MAX_EXTENTS {
                return Err(FsError::NoSpace);
            }
            let (start, _) = fs.alloc_block_run(1)?;
            fs.zero_blocks(start, 1);
            encode_slot(fs.data_block_mut(start), 0, &new_entry);
            let mut extents = fs.read_extents(&inode);
            extents.push(crate::extent::Extent {
                start_block: start,
                block_count: 1,
            });
            fs.write_extents(dir_ino, &extents);
        }
    }

    let mut inode = fs.get_inode(dir_ino);
    inode.entry_count += 1;
    inode.size += size_of::<DirEntry>() as u64;
    fs.set_inode(dir_ino, &inode);
    fs.set_mtime_now(dir_ino);
    Ok(())
}

/// Removes `name` from directory `dir_ino`. The freed slot is left in
/// place for `insert` to reuse; extents are never eagerly reclaimed when a
/// directory shrinks (§4.4 edge case).
pub fn delete(fs: &mut Flatfs, dir_ino: u32, name: &str) -> FsResult<()> {
    let inode = fs.get_inode(dir_ino);
    let found = for_each_slot(fs, &inode, |b, slot, entry| {
        (entry.ino != 0 && entry.name_str() == name).then_some((b, slot))
    });
    let (b, slot) = found.ok_or(FsError::NoSuchEntry)?;
    encode_slot(fs.data_block_mut(b), slot, &DirEntry::empty());

    let mut inode = fs.get_inode(dir_ino);
    inode.entry_count -= 1;
    inode.size -= size_of::<DirEntry>() as u64;
    fs.set_inode(dir_ino, &inode);
    fs.set_mtime_now(dir_ino);
    Ok(())
}
