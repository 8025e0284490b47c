//! End-to-end scenarios driving the operation façade the way a real caller
//! would: format an image, persist it to a real file, reopen it, and run a
//! sequence of operations that touch every region of the on-disk layout.

use std::io::{Read, Write};

use flatfs_core::error::FsError;
use flatfs_core::fs::Flatfs;
use flatfs_core::{format, layout};

const BLOCKS: u64 = 256;
const IMAGE_SIZE: u64 = BLOCKS * layout::BLOCK_SIZE as u64;

/// Formats a fresh image and round-trips it through a real temp file, the
/// way `mkfs` writes one out and the driver later opens it.
fn formatted_image() -> Vec<u8> {
    let mut image = vec![0u8; IMAGE_SIZE as usize];
    format::format(&mut image, 64, true).unwrap();

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&image).unwrap();
    tmp.flush().unwrap();

    let mut reopened = Vec::new();
    std::fs::File::open(tmp.path())
        .unwrap()
        .read_to_end(&mut reopened)
        .unwrap();
    reopened
}

fn mounted() -> Flatfs {
    Flatfs::from_store(formatted_image()).unwrap()
}

#[test]
fn root_is_present_and_empty_on_a_freshly_formatted_image() {
    let fs = mounted();
    let attr = fs.getattr("/").unwrap();
    assert!(attr.is_dir);
    assert_eq!(attr.links, 2);

    let mut names = Vec::new();
    fs.readdir("/", |name, _ino| {
        names.push(name.to_string());
        true
    })
    .unwrap();
    assert!(names.is_empty());
}

#[test]
fn builds_a_small_tree_and_tears_it_down() {
    let mut fs = mounted();

    fs.mkdir("/etc", 0o755).unwrap();
    fs.mkdir("/etc/conf.d", 0o755).unwrap();
    fs.create("/etc/hostname", 0o644).unwrap();

    let n = fs.write("/etc/hostname", b"flatfs-host\n", 0).unwrap();
    assert_eq!(n, 12);

    let mut buf = [0u8; 64];
    let read = fs.read("/etc/hostname", &mut buf, 0).unwrap();
    assert_eq!(&buf[..read], b"flatfs-host\n");

    // root now has one subdirectory as its only child subdirectory: links == 3
    let root_attr = fs.getattr("/").unwrap();
    assert_eq!(root_attr.links, 3);

    let etc_attr = fs.getattr("/etc").unwrap();
    assert_eq!(etc_attr.links, 3); // self, "..", and conf.d

    let mut etc_entries = Vec::new();
    fs.readdir("/etc", |name, _ino| {
        etc_entries.push(name.to_string());
        true
    })
    .unwrap();
    etc_entries.sort();
    assert_eq!(etc_entries, vec!["conf.d".to_string(), "hostname".to_string()]);

    // tear down in dependency order
    fs.unlink("/etc/hostname").unwrap();
    fs.rmdir("/etc/conf.d").unwrap();
    fs.rmdir("/etc").unwrap();

    let mut root_entries = Vec::new();
    fs.readdir("/", |name, _ino| {
        root_entries.push(name.to_string());
        true
    })
    .unwrap();
    assert!(root_entries.is_empty());
    assert_eq!(fs.getattr("/").unwrap().links, 2);
}

#[test]
fn truncate_grow_then_shrink_round_trip_never_leaks_stale_bytes() {
    let mut fs = mounted();
    fs.create("/scratch", 0o644).unwrap();

    // Grow well past one block, filling it with a known pattern.
    let pattern = vec![0xABu8; layout::BLOCK_SIZE * 3];
    fs.write("/scratch", &pattern, 0).unwrap();
    assert_eq!(fs.getattr("/scratch").unwrap().size, pattern.len() as u64);

    // Shrink to a single byte into the second block, then grow back out.
    fs.truncate("/scratch", layout::BLOCK_SIZE as u64 + 1).unwrap();
    fs.truncate("/scratch", pattern.len() as u64).unwrap();

    let mut readback = vec![0u8; pattern.len()];
    let n = fs.read("/scratch", &mut readback, 0).unwrap();
    assert_eq!(n, pattern.len());
    assert_eq!(&readback[..=layout::BLOCK_SIZE], &[0xABu8; layout::BLOCK_SIZE + 1][..]);
    assert!(readback[layout::BLOCK_SIZE + 1..].iter().all(|&b| b == 0));
}

#[test]
fn rmdir_reclaims_blocks_from_a_directory_that_grew_past_one_block() {
    let mut fs = mounted();
    let before = fs.statfs().blocks_free;
    fs.mkdir("/big", 0o755).unwrap();

    // A directory's first data block holds a fixed number of entries;
    // enough children force it to grow to a second block.
    for i in 0..40 {
        fs.create(&format!("/big/file{i}"), 0o644).unwrap();
    }
    assert!(fs.statfs().blocks_free < before);

    for i in 0..40 {
        fs.unlink(&format!("/big/file{i}")).unwrap();
    }
    fs.rmdir("/big").unwrap();

    assert_eq!(fs.statfs().blocks_free, before);
}

#[test]
fn rejects_duplicate_names_and_nonexistent_paths() {
    let mut fs = mounted();
    fs.mkdir("/dup", 0o755).unwrap();
    assert_eq!(fs.mkdir("/dup", 0o755).unwrap_err(), FsError::AlreadyExists);
    assert_eq!(fs.getattr("/missing").unwrap_err(), FsError::NoSuchEntry);
    assert_eq!(fs.create("/missing/child", 0o644).unwrap_err(), FsError::NoSuchEntry);
}

#[test]
fn rejects_rmdir_on_a_nonempty_directory_and_on_a_file() {
    let mut fs = mounted();
    fs.mkdir("/d", 0o755).unwrap();
    fs.create("/d/f", 0o644).unwrap();
    assert_eq!(fs.rmdir("/d").unwrap_err(), FsError::NotEmpty);
    assert_eq!(fs.rmdir("/d/f").unwrap_err(), FsError::NotADirectory);

    fs.create("/plain", 0o644).unwrap();
    assert_eq!(fs.unlink("/d").unwrap_err(), FsError::IsADirectory);

    fs.unlink("/d/f").unwrap();
    fs.rmdir("/d").unwrap();
}

#[test]
fn running_out_of_inodes_fails_cleanly_without_corrupting_free_counts() {
    let mut image = vec![0u8; IMAGE_SIZE as usize];
    // Small inode count so it is easy to exhaust.
    format::format(&mut image, 2, true).unwrap();
    let mut fs = Flatfs::from_store(image).unwrap();

    // Root already claims inode 0; one inode remains.
    fs.create("/only", 0o644).unwrap();
    assert_eq!(fs.create("/overflow", 0o644).unwrap_err(), FsError::NoSpace);
    assert_eq!(fs.statfs().inodes_free, 0);

    fs.unlink("/only").unwrap();
    assert_eq!(fs.statfs().inodes_free, 1);
}
