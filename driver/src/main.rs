//! Mounts a flatfs image as a live FUSE filesystem.
//!
//! Usage: `flatfs -i <image> [-o opt,opt,...] [-d] [-h] <mountpoint>`

mod fuse_fs;

use std::path::PathBuf;
use std::process::exit;

use flatfs_core::fs::Flatfs;
use fuser::MountOption;
use fuse_fs::FlatfsFuse;
use utils::mmap::MappedImage;

const USAGE: &str = "\
Usage: flatfs-fuse -i <image> [-o opt,opt,...] [-d] [-h] <mountpoint>

  -i <image>   the flatfs image file to mount (required)
  -o opt,opt   comma-separated host mount options, passed through
  -d           enable debug-level logging
  -h           print this message and exit
";

struct Args {
    image: PathBuf,
    mountpoint: PathBuf,
    options: Vec<MountOption>,
    debug: bool,
}

fn parse_mount_option(opt: &str) -> MountOption {
    match opt {
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "dirsync" => MountOption::DirSync,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        "auto_unmount" => MountOption::AutoUnmount,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        other => MountOption::CUSTOM(other.to_string()),
    }
}

fn parse_args() -> Args {
    let bin = "flatfs-fuse";
    let mut image: Option<PathBuf> = None;
    let mut mountpoint: Option<PathBuf> = None;
    let mut options = Vec::new();
    let mut debug = false;

    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-h" => {
                print!("{USAGE}");
                exit(0);
            }
            "-d" | "-v" => debug = true,
            "-i" => {
                let value = argv.next().unwrap_or_else(|| utils::error(bin, "-i requires an argument"));
                image = Some(PathBuf::from(value));
            }
            "-o" => {
                let value = argv.next().unwrap_or_else(|| utils::error(bin, "-o requires an argument"));
                options.extend(value.split(',').filter(|s| !s.is_empty()).map(parse_mount_option));
            }
            other if mountpoint.is_none() => mountpoint = Some(PathBuf::from(other)),
            other => utils::error(bin, format!("unexpected argument '{other}'")),
        }
    }

    let image = image.unwrap_or_else(|| utils::error(bin, "-i <image> is required"));
    let mountpoint = mountpoint.unwrap_or_else(|| utils::error(bin, "missing <mountpoint> argument"));

    Args {
        image,
        mountpoint,
        options,
        debug,
    }
}

fn main() {
    let bin = "flatfs-fuse";
    let args = parse_args();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let image = MappedImage::open(&args.image, flatfs_core::layout::BLOCK_SIZE as u64)
        .unwrap_or_else(|e| utils::error(bin, format!("{}: {e}", args.image.display())));
    let fs = Flatfs::from_store(image).unwrap_or_else(|e| utils::error(bin, format!("{}: {e}", args.image.display())));

    let mut options = args.options;
    options.push(MountOption::FSName("flatfs".to_string()));

    log::info!("mounting {} at {}", args.image.display(), args.mountpoint.display());
    if let Err(e) = fuser::mount2(FlatfsFuse::new(fs), &args.mountpoint, &options) {
        utils::error(bin, e);
    }
}
