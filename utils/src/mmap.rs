//! Maps an image file into memory at block-aligned granularity.
//!
//! This is the "Image mapping" collaborator: it knows nothing about the
//! on-disk format, only about presenting a byte-addressable, block-sized
//! region backed by a regular file.

use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// A memory-mapped image file.
///
/// Dropping a `MappedImage` unmaps the region; any writes are flushed to the
/// backing file first.
pub struct MappedImage {
    mmap: MmapMut,
    // Kept alive for the lifetime of the mapping, even though it is not read from again.
    _file: File,
}

impl MappedImage {
    /// Opens `path` for reading and writing and maps its entire contents.
    ///
    /// Fails if the file's length is not a positive multiple of `block_size`.
    pub fn open(path: &Path, block_size: u64) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len == 0 || len % block_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("image size {len} is not a positive multiple of the block size {block_size}"),
            ));
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { mmap, _file: file })
    }

    /// Flushes pending writes to the backing file.
    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }
}

impl Deref for MappedImage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.mmap
    }
}

impl DerefMut for MappedImage {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }
}

impl flatfs_core::fs::ImageStore for MappedImage {
    fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }
}
