//! The operation façade (§4.7): the entry points an external caller (the
//! FUSE shim, a test) invokes, plus the low-level typed views over the
//! mapped image that every other module builds on.

use crate::bitmap::{Bitmap, BitmapMut};
use crate::error::{FsError, FsResult};
use crate::extent::Extent;
use crate::inode::{Inode, S_IFDIR, S_IFREG};
use crate::layout::{Superblock, BLOCK_SIZE, MAGIC};
use crate::{dirent, file, path};
use std::mem::{align_of, size_of};

/// An owned, mutable byte region backing a filesystem image.
///
/// Implemented for `Vec<u8>` (used by tests) and, by the `utils` crate, for
/// a memory-mapped file. `core` never opens a file or a mapping itself —
/// that is the "Image mapping" collaborator's job (§2 item 1).
pub trait ImageStore {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Flushes pending writes to whatever this store is backed by. A no-op
    /// for in-memory stores; a real file sync for a mapped image.
    fn flush(&self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ImageStore for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

/// File or directory attributes, as reported by `getattr`.
#[derive(Clone, Copy, Debug)]
pub struct Attr {
    pub ino: u32,
    pub mode: u32,
    pub links: u32,
    pub size: u64,
    pub blocks_512: u64,
    pub mtime_sec: i64,
    pub mtime_nsec: u32,
    pub is_dir: bool,
}

/// Filesystem-wide statistics, as reported by `statfs`.
#[derive(Clone, Copy, Debug)]
pub struct StatfsInfo {
    pub block_size: u32,
    pub blocks_total: u32,
    pub blocks_free: u32,
    pub inodes_total: u32,
    pub inodes_free: u32,
    pub name_max: u32,
}

/// The mounted filesystem: a superblock-described layout over a single
/// owned, mutable image.
pub struct Flatfs {
    image: Box<dyn ImageStore>,
}

/// Reinterprets the head of `bytes` as `&T`. `bytes` must be at least
/// `size_of::<T>()` long and aligned for `T`; every call site in this crate
/// reads from a block-aligned offset, and `BLOCK_SIZE` (4096) is a multiple
/// of every `T` used here, so the alignment requirement always holds.
fn cast<T: Copy>(bytes: &[u8]) -> &T {
    debug_assert!(bytes.len() >= size_of::<T>());
    let ptr = bytes.as_ptr() as *const T;
    debug_assert_eq!(ptr.align_offset(align_of::<T>()), 0);
    unsafe { &*ptr }
}

fn cast_mut<T: Copy>(bytes: &mut [u8]) -> &mut T {
    debug_assert!(bytes.len() >= size_of::<T>());
    let ptr = bytes.as_mut_ptr() as *mut T;
    debug_assert_eq!(ptr.align_offset(align_of::<T>()), 0);
    unsafe { &mut *ptr }
}

impl Flatfs {
    /// Mounts an already-formatted image, validating its magic number.
    pub fn new(image: Box<dyn ImageStore>) -> FsResult<Self> {
        let fs = Self { image };
        let sb = fs.superblock();
        if sb.magic != MAGIC {
            return Err(FsError::InvalidImage("bad magic number"));
        }
        if sb.total_size != fs.image.bytes().len() as u64 {
            return Err(FsError::InvalidImage("superblock size mismatch"));
        }
        Ok(fs)
    }

    /// Convenience constructor for any concrete `ImageStore`, e.g. `Vec<u8>`
    /// in tests or `utils::mmap::MappedImage` in the binaries.
    pub fn from_store<S: ImageStore + 'static>(image: S) -> FsResult<Self> {
        Self::new(Box::new(image))
    }

    /// Flushes the backing store. A no-op for an in-memory `Vec<u8>`; syncs
    /// the mapped file for a production image.
    pub fn flush(&self) -> std::io::Result<()> {
        self.image.flush()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.image.bytes()
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.image.bytes_mut()
    }

    pub fn superblock(&self) -> Superblock {
        *cast::<Superblock>(self.bytes())
    }

    pub(crate) fn write_superblock(&mut self, sb: &Superblock) {
        *cast_mut::<Superblock>(self.bytes_mut()) = *sb;
    }

    /// Read-only view of the inode bitmap, for callers (the path walker)
    /// that only need to confirm a bit is set, not mutate it.
    pub(crate) fn inode_bitmap(&self) -> Bitmap<'_> {
        let sb = self.superblock();
        let off = Superblock::block_offset(sb.inode_bitmap_start);
        let len = sb.inode_bitmap_blocks as usize * BLOCK_SIZE;
        Bitmap::new(&self.bytes()[off..off + len], sb.inodes_count as usize)
    }

    pub(crate) fn inode_bitmap_mut(&mut self) -> BitmapMut<'_> {
        let sb = self.superblock();
        let off = Superblock::block_offset(sb.inode_bitmap_start);
        let len = sb.inode_bitmap_blocks as usize * BLOCK_SIZE;
        BitmapMut::new(&mut self.bytes_mut()[off..off + len], sb.inodes_count as usize)
    }

    pub(crate) fn block_bitmap_mut(&mut self) -> BitmapMut<'_> {
        let sb = self.superblock();
        let off = Superblock::block_offset(sb.block_bitmap_start);
        let len = sb.block_bitmap_blocks as usize * BLOCK_SIZE;
        BitmapMut::new(&mut self.bytes_mut()[off..off + len], sb.blocks_count as usize)
    }

    pub fn get_inode(&self, ino: u32) -> Inode {
        let sb = self.superblock();
        let off = Superblock::block_offset(sb.inode_table_start) + ino as usize * size_of::<Inode>();
        *cast::<Inode>(&self.bytes()[off..])
    }

    pub fn set_inode(&mut self, ino: u32, inode: &Inode) {
        let sb = self.superblock();
        let off = Superblock::block_offset(sb.inode_table_start) + ino as usize * size_of::<Inode>();
        *cast_mut::<Inode>(&mut self.bytes_mut()[off..]) = *inode;
    }

    /// Reads the `inode`'s extent table.
    pub(crate) fn read_extents(&self, inode: &Inode) -> Vec<Extent> {
        let off = Superblock::block_offset(inode.extent_table);
        let block = &self.bytes()[off..off + BLOCK_SIZE];
        (0..inode.extent_count as usize)
            .map(|i| *cast::<Extent>(&block[i * size_of::<Extent>()..]))
            .collect()
    }

    /// Overwrites `ino`'s extent table with `extents` and updates its
    /// `extent_count`.
    pub(crate) fn write_extents(&mut self, ino: u32, extents: &[Extent]) {
        let inode = self.get_inode(ino);
        let off = Superblock::block_offset(inode.extent_table);
        let block = &mut self.bytes_mut()[off..off + BLOCK_SIZE];
        for (i, e) in extents.iter().enumerate() {
            *cast_mut::<Extent>(&mut block[i * size_of::<Extent>()..]) = *e;
        }
        let mut inode = inode;
        inode.extent_count = extents.len() as u32;
        self.set_inode(ino, &inode);
    }

    pub(crate) fn data_block(&self, block: u32) -> &[u8] {
        let off = Superblock::block_offset(block);
        &self.bytes()[off..off + BLOCK_SIZE]
    }

    pub(crate) fn data_block_mut(&mut self, block: u32) -> &mut [u8] {
        let off = Superblock::block_offset(block);
        &mut self.bytes_mut()[off..off + BLOCK_SIZE]
    }

    pub(crate) fn zero_blocks(&mut self, start: u32, count: u32) {
        for b in start..start + count {
            self.data_block_mut(b).fill(0);
        }
    }

    /// Allocates the first free inode, zeroing its slot. Does not set its
    /// extent table block — callers finish initializing the returned inode.
    pub(crate) fn alloc_inode(&mut self) -> FsResult<u32> {
        let mut ibm = self.inode_bitmap_mut();
        let ino = ibm.scan_first_free().ok_or(FsError::NoSpace)? as u32;
        ibm.set(ino as usize);
        let mut sb = self.superblock();
        sb.free_inodes_count -= 1;
        self.write_superblock(&sb);
        self.set_inode(ino, &Inode::zeroed());
        Ok(ino)
    }

    pub(crate) fn free_inode(&mut self, ino: u32) {
        let mut ibm = self.inode_bitmap_mut();
        ibm.clear(ino as usize);
        let mut sb = self.superblock();
        sb.free_inodes_count += 1;
        self.write_superblock(&sb);
        self.set_inode(ino, &Inode::zeroed());
    }

    pub(crate) fn set_mtime_now(&mut self, ino: u32) {
        let (sec, nsec) = crate::current_timestamp();
        let mut inode = self.get_inode(ino);
        inode.mtime_sec = sec;
        inode.mtime_nsec = nsec;
        self.set_inode(ino, &inode);
    }

    fn attr_of(&self, ino: u32) -> Attr {
        let inode = self.get_inode(ino);
        Attr {
            ino,
            mode: inode.mode,
            links: inode.links,
            size: inode.size,
            blocks_512: inode.blocks_512(),
            mtime_sec: inode.mtime_sec,
            mtime_nsec: inode.mtime_nsec,
            is_dir: inode.is_dir(),
        }
    }

    // ---- operation façade (§4.7) ----

    pub fn statfs(&self) -> StatfsInfo {
        let sb = self.superblock();
        StatfsInfo {
            block_size: BLOCK_SIZE as u32,
            blocks_total: sb.blocks_count,
            blocks_free: sb.free_blocks_count,
            inodes_total: sb.inodes_count,
            inodes_free: sb.free_inodes_count,
            name_max: crate::layout::NAME_MAX as u32,
        }
    }

    pub fn getattr(&self, path_str: &str) -> FsResult<Attr> {
        let ino = path::resolve(self, path_str)?;
        Ok(self.attr_of(ino))
    }

    /// Enumerates the live entries of the directory at `path_str`, calling
    /// `filler` for each `(name, inode)` pair. `.` and `..` are not
    /// produced here; callers synthesize them (§4.4).
    pub fn readdir(
        &self,
        path_str: &str,
        mut filler: impl FnMut(&str, u32) -> bool,
    ) -> FsResult<()> {
        let ino = path::resolve(self, path_str)?;
        let inode = self.get_inode(ino);
        if !inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        for (name, child) in dirent::iterate(self, &inode) {
            if !filler(&name, child) {
                return Err(FsError::OutOfMemory);
            }
        }
        Ok(())
    }

    pub fn mkdir(&mut self, path_str: &str, mode: u32) -> FsResult<Attr> {
        let (parent, name) = path::split_parent(path_str)?;
        let parent_ino = path::resolve(self, &parent)?;
        let parent_inode = self.get_inode(parent_ino);
        if !parent_inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if dirent::find(self, &parent_inode, &name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let sb = self.superblock();
        if sb.free_inodes_count == 0 || sb.free_blocks_count < 1 {
            return Err(FsError::NoSpace);
        }

        let ino = self.alloc_inode()?;
        let table_block = match self.alloc_block_run(1) {
            Ok((start, _)) => start,
            Err(e) => {
                self.free_inode(ino);
                return Err(e);
            }
        };
        self.zero_blocks(table_block, 1);
        let (sec, nsec) = crate::current_timestamp();
        let inode = Inode {
            mode: S_IFDIR | (mode & 0o7777),
            links: 2,
            size: 0,
            mtime_sec: sec,
            mtime_nsec: nsec,
            ino,
            entry_count: 0,
            extent_count: 0,
            extent_table: table_block,
        };
        self.set_inode(ino, &inode);

        if let Err(e) = dirent::insert(self, parent_ino, &name, ino) {
            self.free_block_run(table_block, 1);
            self.free_inode(ino);
            return Err(e);
        }
        let mut parent_inode = self.get_inode(parent_ino);
        parent_inode.links += 1;
        self.set_inode(parent_ino, &parent_inode);
        self.set_mtime_now(parent_ino);

        Ok(self.attr_of(ino))
    }

    pub fn rmdir(&mut self, path_str: &str) -> FsResult<()> {
        let (parent, name) = path::split_parent(path_str)?;
        let parent_ino = path::resolve(self, &parent)?;
        let ino = path::resolve(self, path_str)?;
        let inode = self.get_inode(ino);
        if !inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if inode.entry_count != 0 {
            return Err(FsError::NotEmpty);
        }

        dirent::delete(self, parent_ino, &name)?;
        for ext in self.read_extents(&inode) {
            self.free_block_run(ext.start_block, ext.block_count);
        }
        self.free_block_run(inode.extent_table, 1);
        self.free_inode(ino);

        let mut parent_inode = self.get_inode(parent_ino);
        parent_inode.links -= 1;
        self.set_inode(parent_ino, &parent_inode);
        self.set_mtime_now(parent_ino);
        Ok(())
    }

    pub fn create(&mut self, path_str: &str, mode: u32) -> FsResult<Attr> {
        let (parent, name) = path::split_parent(path_str)?;
        let parent_ino = path::resolve(self, &parent)?;
        let parent_inode = self.get_inode(parent_ino);
        if !parent_inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if dirent::find(self, &parent_inode, &name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let sb = self.superblock();
        if sb.free_inodes_count == 0 || sb.free_blocks_count < 1 {
            return Err(FsError::NoSpace);
        }

        let ino = self.alloc_inode()?;
        let table_block = match self.alloc_block_run(1) {
            Ok((start, _)) => start,
            Err(e) => {
                self.free_inode(ino);
                return Err(e);
            }
        };
        self.zero_blocks(table_block, 1);
        let (sec, nsec) = crate::current_timestamp();
        let inode = Inode {
            mode: S_IFREG | (mode & 0o7777),
            links: 1,
            size: 0,
            mtime_sec: sec,
            mtime_nsec: nsec,
            ino,
            entry_count: 0,
            extent_count: 0,
            extent_table: table_block,
        };
        self.set_inode(ino, &inode);

        if let Err(e) = dirent::insert(self, parent_ino, &name, ino) {
            self.free_block_run(table_block, 1);
            self.free_inode(ino);
            return Err(e);
        }
        self.set_mtime_now(parent_ino);

        Ok(self.attr_of(ino))
    }

    pub fn unlink(&mut self, path_str: &str) -> FsResult<()> {
        let (parent, name) = path::split_parent(path_str)?;
        let parent_ino = path::resolve(self, &parent)?;
        let ino = path::resolve(self, path_str)?;
        let inode = self.get_inode(ino);
        if !inode.is_file() {
            return Err(FsError::IsADirectory);
        }

        dirent::delete(self, parent_ino, &name)?;
        file::truncate(self, ino, 0)?;
        let extent_table = self.get_inode(ino).extent_table;
        self.free_block_run(extent_table, 1);
        self.free_inode(ino);
        self.set_mtime_now(parent_ino);
        Ok(())
    }

    pub fn utimens(&mut self, path_str: &str, mtime_sec: i64, mtime_nsec: u32) -> FsResult<()> {
        let ino = path::resolve(self, path_str)?;
        let mut inode = self.get_inode(ino);
        inode.mtime_sec = mtime_sec;
        inode.mtime_nsec = mtime_nsec;
        self.set_inode(ino, &inode);
        Ok(())
    }

    pub fn truncate(&mut self, path_str: &str, new_size: u64) -> FsResult<()> {
        let ino = path::resolve(self, path_str)?;
        let inode = self.get_inode(ino);
        if !inode.is_file() {
            return Err(FsError::NotAFile);
        }
        file::truncate(self, ino, new_size)
    }

    pub fn read(&self, path_str: &str, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let ino = path::resolve(self, path_str)?;
        let inode = self.get_inode(ino);
        if !inode.is_file() {
            return Err(FsError::NotAFile);
        }
        Ok(file::read(self, &inode, buf, offset))
    }

    pub fn write(&mut self, path_str: &str, buf: &[u8], offset: u64) -> FsResult<usize> {
        let ino = path::resolve(self, path_str)?;
        let inode = self.get_inode(ino);
        if !inode.is_file() {
            return Err(FsError::NotAFile);
        }
        let written = file::write(self, ino, buf, offset)?;
        self.set_mtime_now(ino);
        Ok(written)
    }

    /// Allocates one run via §4.2 policy (1): exact fit preferred, falling
    /// back to first-fit. Used for single-block allocations (extent
    /// tables, new directory blocks) where "exact" and "longest" coincide.
    pub(crate) fn alloc_block_run(&mut self, len: u32) -> FsResult<(u32, u32)> {
        let mut sb = self.superblock();
        let mut bbm = self.block_bitmap_mut();
        let start = crate::extent::allocate_exact(&mut sb, &mut bbm, len)?;
        drop(bbm);
        self.write_superblock(&sb);
        Ok((start, len))
    }

    pub(crate) fn alloc_block_run_longest(&mut self) -> FsResult<(u32, u32)> {
        let mut sb = self.superblock();
        let mut bbm = self.block_bitmap_mut();
        let run = crate::extent::allocate_longest(&mut sb, &mut bbm)?;
        drop(bbm);
        self.write_superblock(&sb);
        Ok(run)
    }

    pub(crate) fn free_block_run(&mut self, start: u32, len: u32) {
        let mut sb = self.superblock();
        let mut bbm = self.block_bitmap_mut();
        crate::extent::free_run(&mut sb, &mut bbm, start, len);
        drop(bbm);
        self.write_superblock(&sb);
    }
}
