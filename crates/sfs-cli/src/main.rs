#![forbid(unsafe_code)]

use anyhow::{bail, Context, Result};
use sfs_block::{BlockDevice, FileDisk};
use sfs_core::{inspect_device, FileSystem, VolumeReport};
use sfs_types::{InodeNumber, BLOCK_SIZE};
use std::env;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "format" => {
            let Some(image) = args.next() else {
                bail!("format requires <image-path> <block-count>");
            };
            let Some(blocks) = args.next() else {
                bail!("format requires <image-path> <block-count>");
            };
            let block_count: u32 = blocks
                .parse()
                .with_context(|| format!("invalid block count: {blocks}"))?;
            format_cmd(Path::new(&image), block_count)
        }
        "inspect" => {
            let Some(image) = args.next() else {
                bail!("inspect requires a path argument");
            };
            let json = args.any(|arg| arg == "--json");
            inspect_cmd(Path::new(&image), json)
        }
        "create" => {
            let Some(image) = args.next() else {
                bail!("create requires <image-path>");
            };
            create_cmd(Path::new(&image))
        }
        "remove" => {
            let (image, inode) = inode_args(&mut args, "remove")?;
            remove_cmd(Path::new(&image), inode)
        }
        "stat" => {
            let (image, inode) = inode_args(&mut args, "stat")?;
            stat_cmd(Path::new(&image), inode)
        }
        "cat" => {
            let (image, inode) = inode_args(&mut args, "cat")?;
            cat_cmd(Path::new(&image), inode)
        }
        "copyin" => {
            let Some(source) = args.next() else {
                bail!("copyin requires <source-file> <image-path> <inode>");
            };
            let (image, inode) = inode_args(&mut args, "copyin")?;
            copyin_cmd(Path::new(&source), Path::new(&image), inode)
        }
        "copyout" => {
            let (image, inode) = inode_args(&mut args, "copyout")?;
            let Some(dest) = args.next() else {
                bail!("copyout requires <image-path> <inode> <dest-file>");
            };
            copyout_cmd(Path::new(&image), inode, Path::new(&dest))
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("sfs\n");
    println!("USAGE:");
    println!("  sfs format <image-path> <block-count>");
    println!("  sfs inspect <image-path> [--json]");
    println!("  sfs create <image-path>");
    println!("  sfs remove <image-path> <inode>");
    println!("  sfs stat <image-path> <inode>");
    println!("  sfs cat <image-path> <inode>");
    println!("  sfs copyin <source-file> <image-path> <inode>");
    println!("  sfs copyout <image-path> <inode> <dest-file>");
}

fn inode_args(
    args: &mut impl Iterator<Item = String>,
    command: &str,
) -> Result<(String, InodeNumber)> {
    let Some(image) = args.next() else {
        bail!("{command} requires <image-path> <inode>");
    };
    let Some(inode) = args.next() else {
        bail!("{command} requires <image-path> <inode>");
    };
    let number: u32 = inode
        .parse()
        .with_context(|| format!("invalid inode number: {inode}"))?;
    Ok((image, InodeNumber(number)))
}

fn open_volume(path: &Path) -> Result<FileDisk> {
    FileDisk::open(path)
        .with_context(|| format!("failed to open volume image: {}", path.display()))
}

fn format_cmd(path: &Path, block_count: u32) -> Result<()> {
    let disk = FileDisk::create(path, block_count)
        .with_context(|| format!("failed to create volume image: {}", path.display()))?;
    FileSystem::format(&disk).context("format failed")?;
    let superblock = inspect_device(&disk).context("readback failed")?.superblock;
    println!(
        "formatted {} blocks ({} inode-table blocks, {} inode slots)",
        superblock.block_count,
        superblock.inode_table_blocks,
        superblock.inode_capacity()
    );
    Ok(())
}

fn inspect_cmd(path: &Path, json: bool) -> Result<()> {
    let disk = open_volume(path)?;
    let report = inspect_device(&disk)
        .with_context(|| format!("failed to read volume metadata from {}", path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize output")?
        );
    } else {
        print_report(&report);
        println!("device reads: {}", disk.reads());
        println!("device writes: {}", disk.writes());
    }
    Ok(())
}

fn print_report(report: &VolumeReport) {
    let superblock = &report.superblock;
    println!("superblock:");
    println!("    magic number is valid");
    println!("    {} blocks", superblock.block_count);
    println!("    {} inode blocks", superblock.inode_table_blocks);
    println!("    {} inodes", superblock.inode_capacity());
    for entry in &report.inodes {
        println!("inode {}:", entry.inode);
        println!("    size: {} bytes", entry.size);
        let direct: Vec<String> = entry
            .direct
            .iter()
            .filter(|pointer| **pointer != 0)
            .map(u32::to_string)
            .collect();
        println!("    direct blocks: {}", direct.join(" "));
        if entry.indirect != 0 {
            println!("    indirect block: {}", entry.indirect);
            let pointers: Vec<String> = entry
                .indirect_pointers
                .iter()
                .map(u32::to_string)
                .collect();
            println!("    indirect data blocks: {}", pointers.join(" "));
        }
    }
}

fn create_cmd(path: &Path) -> Result<()> {
    let disk = open_volume(path)?;
    let mut fs = FileSystem::new(&disk);
    fs.mount().context("mount failed")?;
    let inode = fs.create().context("create failed")?;
    println!("created inode {}", inode.0);
    Ok(())
}

fn remove_cmd(path: &Path, inode: InodeNumber) -> Result<()> {
    let disk = open_volume(path)?;
    let mut fs = FileSystem::new(&disk);
    fs.mount().context("mount failed")?;
    fs.remove(inode)
        .with_context(|| format!("failed to remove inode {}", inode.0))?;
    println!("removed inode {}", inode.0);
    Ok(())
}

fn stat_cmd(path: &Path, inode: InodeNumber) -> Result<()> {
    let disk = open_volume(path)?;
    let mut fs = FileSystem::new(&disk);
    fs.mount().context("mount failed")?;
    let size = fs
        .stat(inode)
        .with_context(|| format!("failed to stat inode {}", inode.0))?;
    println!("inode {} has size {size} bytes", inode.0);
    Ok(())
}

fn cat_cmd(path: &Path, inode: InodeNumber) -> Result<()> {
    let disk = open_volume(path)?;
    let mut fs = FileSystem::new(&disk);
    fs.mount().context("mount failed")?;
    let stdout = std::io::stdout();
    drain_inode(&fs, inode, &mut stdout.lock())?;
    Ok(())
}

fn copyin_cmd(source: &Path, image: &Path, inode: InodeNumber) -> Result<()> {
    let mut file = File::open(source)
        .with_context(|| format!("failed to open {}", source.display()))?;
    let disk = open_volume(image)?;
    let mut fs = FileSystem::new(&disk);
    fs.mount().context("mount failed")?;

    // One block at a time, like the filesystem itself moves data.
    let mut chunk = vec![0_u8; BLOCK_SIZE];
    let mut offset: u32 = 0;
    loop {
        let got = file
            .read(&mut chunk)
            .with_context(|| format!("failed to read {}", source.display()))?;
        if got == 0 {
            break;
        }
        let written = fs
            .write(inode, &chunk[..got], offset)
            .with_context(|| format!("failed to write inode {} at offset {offset}", inode.0))?;
        offset += written as u32;
    }
    fs.unmount();
    disk.sync().context("sync failed")?;
    println!("copied {offset} bytes into inode {}", inode.0);
    Ok(())
}

fn copyout_cmd(image: &Path, inode: InodeNumber, dest: &Path) -> Result<()> {
    let disk = open_volume(image)?;
    let mut fs = FileSystem::new(&disk);
    fs.mount().context("mount failed")?;
    let mut file = File::create(dest)
        .with_context(|| format!("failed to create {}", dest.display()))?;
    let copied = drain_inode(&fs, inode, &mut file)?;
    println!("copied {copied} bytes out of inode {}", inode.0);
    Ok(())
}

/// Stream an inode's contents, one block per read, into `out`.
fn drain_inode(
    fs: &FileSystem<'_, FileDisk>,
    inode: InodeNumber,
    out: &mut impl Write,
) -> Result<u64> {
    let mut chunk = vec![0_u8; BLOCK_SIZE];
    let mut offset: u32 = 0;
    loop {
        let got = fs
            .read(inode, &mut chunk, offset)
            .with_context(|| format!("failed to read inode {} at offset {offset}", inode.0))?;
        if got == 0 {
            break;
        }
        out.write_all(&chunk[..got])
            .context("failed to write output")?;
        offset += got as u32;
    }
    Ok(u64::from(offset))
}
