//! Formats an image file as an empty flatfs filesystem.
//!
//! Usage: `mkfs -i N [-f] [-z] [-h] <image>`

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::exit;

use flatfs_core::layout::{BLOCK_SIZE, MAGIC};
use utils::mmap::MappedImage;

const USAGE: &str = "\
Usage: mkfs -i N [-f] [-z] [-h] <image>

  -i N   format for N inodes (required)
  -f     overwrite an image that already looks like a flatfs filesystem
  -z     zero the whole image up front, not just the metadata regions
  -h     print this message and exit
";

struct Args {
    inode_count: u32,
    force: bool,
    zero: bool,
    image: PathBuf,
}

fn parse_args() -> Args {
    let bin = "mkfs";
    let mut inode_count: Option<u32> = None;
    let mut force = false;
    let mut zero = false;
    let mut image: Option<PathBuf> = None;

    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-h" => {
                print!("{USAGE}");
                exit(0);
            }
            "-f" => force = true,
            "-z" => zero = true,
            "-i" => {
                let value = argv.next().unwrap_or_else(|| utils::error(bin, "-i requires an argument"));
                inode_count = Some(
                    value
                        .parse()
                        .unwrap_or_else(|_| utils::error(bin, format!("invalid inode count '{value}'"))),
                );
            }
            other if image.is_none() => image = Some(PathBuf::from(other)),
            other => utils::error(bin, format!("unexpected argument '{other}'")),
        }
    }

    let inode_count = match inode_count {
        Some(0) | None => utils::error(bin, "-i N is required and N must be nonzero"),
        Some(n) => n,
    };
    let image = image.unwrap_or_else(|| utils::error(bin, "missing <image> argument"));

    Args {
        inode_count,
        force,
        zero,
        image,
    }
}

fn already_formatted(image: &MappedImage) -> bool {
    image.len() >= 8 && u64::from_ne_bytes(image[0..8].try_into().unwrap()) == MAGIC
}

fn main() {
    let bin = "mkfs";
    let args = parse_args();

    let len = OpenOptions::new()
        .read(true)
        .open(&args.image)
        .and_then(|f| f.metadata())
        .unwrap_or_else(|e| utils::error(bin, format!("{}: {e}", args.image.display())))
        .len();
    if len == 0 || len % BLOCK_SIZE as u64 != 0 {
        utils::error(
            bin,
            format!(
                "{}: size {len} is not a positive multiple of the block size {BLOCK_SIZE}",
                args.image.display()
            ),
        );
    }

    let mut image = MappedImage::open(&args.image, BLOCK_SIZE as u64)
        .unwrap_or_else(|e| utils::error(bin, format!("{}: {e}", args.image.display())));

    if !args.force && already_formatted(&image) {
        utils::error(
            bin,
            format!("{}: already contains a flatfs filesystem (use -f to overwrite)", args.image.display()),
        );
    }

    if let Err(e) = flatfs_core::format::format(&mut image, args.inode_count, args.zero) {
        utils::error(bin, e);
    }

    if let Err(e) = image.flush() {
        utils::error(bin, format!("flushing {}: {e}", args.image.display()));
    }
}
