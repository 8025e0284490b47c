//! Translates the `fuser` inode-based kernel protocol onto the path-based
//! operation façade in `flatfs_core::fs`.
//!
//! `fuser` hands us parent inode + name; the façade wants absolute paths.
//! We bridge the two with a small `ino -> (parent ino, name)` table, filled
//! in as inodes are discovered (`lookup`, `mkdir`, `create`, `readdir`) and
//! walked back to the root to reconstruct a path on demand.

use flatfs_core::fs::{Attr, Flatfs, StatfsInfo};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TTL: Duration = Duration::from_secs(1);
const ROOT_FUSE_INO: u64 = 1;

fn to_fuse_ino(core_ino: u32) -> u64 {
    core_ino as u64 + 1
}

fn to_epoch(t: SystemTime) -> (i64, u32) {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => (-(e.duration().as_secs() as i64), 0),
    }
}

fn system_time(sec: i64, nsec: u32) -> SystemTime {
    if sec >= 0 {
        UNIX_EPOCH + Duration::new(sec as u64, nsec)
    } else {
        UNIX_EPOCH - Duration::new((-sec) as u64, 0)
    }
}

fn file_attr(attr: &Attr) -> FileAttr {
    let kind = if attr.is_dir {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    let mtime = system_time(attr.mtime_sec, attr.mtime_nsec);
    FileAttr {
        ino: to_fuse_ino(attr.ino),
        size: attr.size,
        blocks: attr.blocks_512,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        perm: (attr.mode & 0o7777) as u16,
        nlink: attr.links,
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
        rdev: 0,
        blksize: flatfs_core::layout::BLOCK_SIZE as u32,
        flags: 0,
    }
}

pub struct FlatfsFuse {
    fs: Mutex<Flatfs>,
    parents: Mutex<HashMap<u64, (u64, String)>>,
}

impl FlatfsFuse {
    pub fn new(fs: Flatfs) -> Self {
        Self {
            fs: Mutex::new(fs),
            parents: Mutex::new(HashMap::new()),
        }
    }

    fn path_of(&self, ino: u64) -> String {
        if ino == ROOT_FUSE_INO {
            return "/".to_string();
        }
        let parents = self.parents.lock().unwrap();
        let mut components = Vec::new();
        let mut cur = ino;
        while cur != ROOT_FUSE_INO {
            let (parent, name) = parents
                .get(&cur)
                .cloned()
                .expect("ino referenced by the kernel without a known parent");
            components.push(name);
            cur = parent;
        }
        components.reverse();
        format!("/{}", components.join("/"))
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> String {
        let parent_path = self.path_of(parent);
        let name = name.to_string_lossy();
        if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        }
    }

    fn remember(&self, fuse_ino: u64, parent: u64, name: &OsStr) {
        self.parents
            .lock()
            .unwrap()
            .insert(fuse_ino, (parent, name.to_string_lossy().into_owned()));
    }

    fn parent_of(&self, ino: u64) -> u64 {
        self.parents
            .lock()
            .unwrap()
            .get(&ino)
            .map(|(p, _)| *p)
            .unwrap_or(ROOT_FUSE_INO)
    }
}

impl Filesystem for FlatfsFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        log::debug!("mounted");
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(e) = self.fs.lock().unwrap().flush() {
            log::warn!("flush on unmount failed: {e}");
        }
        log::debug!("unmounted");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = self.child_path(parent, name);
        let fs = self.fs.lock().unwrap();
        match fs.getattr(&path) {
            Ok(attr) => {
                drop(fs);
                self.remember(to_fuse_ino(attr.ino), parent, name);
                reply.entry(&TTL, &file_attr(&attr), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let path = self.path_of(ino);
        let fs = self.fs.lock().unwrap();
        match fs.getattr(&path) {
            Ok(attr) => reply.attr(&TTL, &file_attr(&attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = self.path_of(ino);
        let mut fs = self.fs.lock().unwrap();

        if let Some(new_size) = size {
            if let Err(e) = fs.truncate(&path, new_size) {
                reply.error(e.errno());
                return;
            }
        }

        if let Some(t) = mtime.or(atime) {
            let (sec, nsec) = match t {
                TimeOrNow::SpecificTime(time) => to_epoch(time),
                TimeOrNow::Now => utils::util::current_timestamp(),
            };
            if let Err(e) = fs.utimens(&path, sec, nsec) {
                reply.error(e.errno());
                return;
            }
        }

        match fs.getattr(&path) {
            Ok(attr) => reply.attr(&TTL, &file_attr(&attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let path = self.path_of(ino);
        let parent_fuse_ino = self.parent_of(ino);
        let fs = self.fs.lock().unwrap();

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_fuse_ino, FileType::Directory, "..".to_string()),
        ];
        let result = fs.readdir(&path, |name, child_ino| {
            let kind = if fs.get_inode(child_ino).is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            entries.push((to_fuse_ino(child_ino), kind, name.to_string()));
            true
        });
        drop(fs);
        if let Err(e) = result {
            reply.error(e.errno());
            return;
        }

        for (i, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let path = self.child_path(parent, name);
        let mut fs = self.fs.lock().unwrap();
        match fs.mkdir(&path, mode) {
            Ok(attr) => {
                drop(fs);
                self.remember(to_fuse_ino(attr.ino), parent, name);
                reply.entry(&TTL, &file_attr(&attr), 0);
            }
            Err(e) => {
                log::warn!("mkdir {path}: {e}");
                reply.error(e.errno());
            }
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = self.child_path(parent, name);
        let mut fs = self.fs.lock().unwrap();
        match fs.rmdir(&path) {
            Ok(()) => reply.ok(),
            Err(e) => {
                log::warn!("rmdir {path}: {e}");
                reply.error(e.errno());
            }
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = self.child_path(parent, name);
        let mut fs = self.fs.lock().unwrap();
        match fs.create(&path, mode) {
            Ok(attr) => {
                drop(fs);
                self.remember(to_fuse_ino(attr.ino), parent, name);
                reply.created(&TTL, &file_attr(&attr), 0, 0, 0);
            }
            Err(e) => {
                log::warn!("create {path}: {e}");
                reply.error(e.errno());
            }
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = self.child_path(parent, name);
        let mut fs = self.fs.lock().unwrap();
        match fs.unlink(&path) {
            Ok(()) => reply.ok(),
            Err(e) => {
                log::warn!("unlink {path}: {e}");
                reply.error(e.errno());
            }
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = self.path_of(ino);
        let fs = self.fs.lock().unwrap();
        let mut buf = vec![0u8; size as usize];
        match fs.read(&path, &mut buf, offset.max(0) as u64) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = self.path_of(ino);
        let mut fs = self.fs.lock().unwrap();
        match fs.write(&path, data, offset.max(0) as u64) {
            Ok(n) => reply.written(n as u32),
            Err(e) => {
                log::warn!("write {path}: {e}");
                reply.error(e.errno());
            }
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let fs = self.fs.lock().unwrap();
        let info: StatfsInfo = fs.statfs();
        reply.statfs(
            info.blocks_total as u64,
            info.blocks_free as u64,
            info.blocks_free as u64,
            info.inodes_total as u64,
            info.inodes_free as u64,
            info.block_size,
            info.name_max,
            info.block_size,
        );
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, _nlookup: u64) {
        self.parents.lock().unwrap().remove(&ino);
    }
}
