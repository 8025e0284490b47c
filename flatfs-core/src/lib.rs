//! On-disk layout and metadata engine for the flatfs image filesystem.
//!
//! This crate owns everything that can be described without reference to a
//! host kernel: the block layout, the allocator, the directory and file
//! engines, the formatter, and the operation façade ([`fs::Flatfs`]). It
//! never opens a file or a mapping itself — callers hand it anything that
//! implements [`fs::ImageStore`].

pub mod bitmap;
pub mod dirent;
pub mod error;
pub mod extent;
pub mod file;
pub mod format;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod path;

pub use error::{FsError, FsResult};
pub use fs::Flatfs;

/// Returns the current time as `(seconds since the Unix epoch, nanosecond
/// remainder)`, the pair every on-disk mtime field stores.
pub(crate) fn current_timestamp() -> (i64, u32) {
    use std::time::{SystemTime, UNIX_EPOCH};
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(_) => (0, 0),
    }
}
