//! Path resolution (§4.5): walks an absolute path one component at a time,
//! starting from the root inode.

use crate::dirent;
use crate::error::{FsError, FsResult};
use crate::fs::Flatfs;
use crate::layout::{NAME_MAX, PATH_MAX, ROOT_INO};

/// Resolves an absolute path to an inode number. The empty path and `"/"`
/// both resolve to the root.
pub fn resolve(fs: &Flatfs, path: &str) -> FsResult<u32> {
    if path.is_empty() || path == "/" {
        return Ok(ROOT_INO);
    }
    if !path.starts_with('/') {
        return Err(FsError::NotADirectory);
    }
    if path.len() >= PATH_MAX {
        return Err(FsError::NameTooLong);
    }

    let mut current = ROOT_INO;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        if component.len() > NAME_MAX {
            return Err(FsError::NoSuchEntry);
        }
        let inode = fs.get_inode(current);
        if !inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let child = dirent::find(fs, &inode, component).ok_or(FsError::NoSuchEntry)?;
        if !fs.inode_bitmap().test(child as usize) {
            return Err(FsError::NotADirectory);
        }
        current = child;
    }
    Ok(current)
}

/// Splits `path` into its parent directory path and final component, for
/// operations (`mkdir`, `create`, `unlink`, `rmdir`) that need to act on the
/// containing directory.
pub fn split_parent(path: &str) -> FsResult<(String, String)> {
    if !path.starts_with('/') || path == "/" {
        return Err(FsError::NotADirectory);
    }
    if path.len() >= PATH_MAX {
        return Err(FsError::NameTooLong);
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        // every character was '/': an alias for the root, which has no parent.
        return Err(FsError::NotADirectory);
    }
    let slash = trimmed.rfind('/').expect("path starts with '/'");
    let name = &trimmed[slash + 1..];
    if name.is_empty() || name.len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    let parent = if slash == 0 { "/" } else { &trimmed[..slash] };
    Ok((parent.to_string(), name.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format;
    use crate::layout::BLOCK_SIZE;

    fn mounted() -> Flatfs {
        let mut image = vec![0u8; 64 * BLOCK_SIZE];
        format::format(&mut image, 64, true).unwrap();
        Flatfs::from_store(image).unwrap()
    }

    #[test]
    fn empty_and_root_resolve_to_root() {
        let fs = mounted();
        assert_eq!(resolve(&fs, "").unwrap(), ROOT_INO);
        assert_eq!(resolve(&fs, "/").unwrap(), ROOT_INO);
    }

    #[test]
    fn relative_path_is_rejected() {
        let fs = mounted();
        assert_eq!(resolve(&fs, "foo"), Err(FsError::NotADirectory));
    }

    #[test]
    fn missing_component_is_no_such_entry() {
        let fs = mounted();
        assert_eq!(resolve(&fs, "/nope"), Err(FsError::NoSuchEntry));
        assert_eq!(resolve(&fs, "/nope/deeper"), Err(FsError::NoSuchEntry));
    }

    #[test]
    fn oversized_component_is_no_such_entry() {
        let fs = mounted();
        let path = format!("/{}", "x".repeat(NAME_MAX + 1));
        assert_eq!(resolve(&fs, &path), Err(FsError::NoSuchEntry));
    }

    #[test]
    fn split_parent_handles_top_level_and_nested() {
        assert_eq!(
            split_parent("/a.txt").unwrap(),
            ("/".to_string(), "a.txt".to_string())
        );
        assert_eq!(
            split_parent("/dir/a.txt").unwrap(),
            ("/dir".to_string(), "a.txt".to_string())
        );
    }

    #[test]
    fn split_parent_rejects_root() {
        assert_eq!(split_parent("/"), Err(FsError::NotADirectory));
    }

    #[test]
    fn split_parent_rejects_all_slash_paths_without_panicking() {
        assert_eq!(split_parent("//"), Err(FsError::NotADirectory));
        assert_eq!(split_parent("///"), Err(FsError::NotADirectory));
    }

    #[test]
    fn all_slash_paths_resolve_to_root() {
        let fs = mounted();
        assert_eq!(resolve(&fs, "//").unwrap(), ROOT_INO);
        assert_eq!(resolve(&fs, "///").unwrap(), ROOT_INO);
    }

    #[test]
    fn dangling_entry_left_behind_by_a_freed_inode_is_not_a_directory() {
        let mut fs = mounted();
        let ino = fs.alloc_inode().unwrap();
        dirent::insert(&mut fs, ROOT_INO, "ghost", ino).unwrap();
        // Simulates a consistency failure: the inode was freed (its bitmap
        // bit cleared) but the dentry pointing to it was never cleaned up.
        fs.free_inode(ino);
        assert_eq!(resolve(&fs, "/ghost"), Err(FsError::NotADirectory));
    }
}
