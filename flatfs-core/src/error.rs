//! The error taxonomy surfaced by every `flatfs_core` operation.

use thiserror::Error;

/// An error produced while resolving a path or manipulating the filesystem image.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// A path exceeded `PATH_MAX`, or one of its components exceeded `NAME_MAX`.
    #[error("name too long")]
    NameTooLong,
    /// A path component does not exist.
    #[error("no such file or directory")]
    NoSuchEntry,
    /// A non-final path component (or the path itself) is not a directory.
    #[error("not a directory")]
    NotADirectory,
    /// The target of an operation that requires a directory is not one.
    #[error("is a directory")]
    IsADirectory,
    /// The target of an operation that requires a regular file is not one.
    #[error("not a regular file")]
    NotAFile,
    /// `rmdir` was called on a directory that still has live entries.
    #[error("directory not empty")]
    NotEmpty,
    /// The inode bitmap, block bitmap, or an inode's extent table is exhausted.
    #[error("no space left on device")]
    NoSpace,
    /// The directory enumeration filler refused an entry.
    #[error("out of memory")]
    OutOfMemory,
    /// The path passed to a create-like call already exists.
    #[error("file exists")]
    AlreadyExists,
    /// The mapped image does not carry a valid superblock.
    #[error("invalid filesystem image: {0}")]
    InvalidImage(&'static str),
}

impl FsError {
    /// Maps this error to the `errno` value a FUSE reply should carry.
    pub fn errno(self) -> i32 {
        match self {
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::NoSuchEntry => libc::ENOENT,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::NotAFile => libc::EINVAL,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::NoSpace => libc::ENOSPC,
            FsError::OutOfMemory => libc::ENOMEM,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::InvalidImage(_) => libc::EINVAL,
        }
    }
}

/// Convenience alias used throughout `flatfs_core`.
pub type FsResult<T> = Result<T, FsError>;
