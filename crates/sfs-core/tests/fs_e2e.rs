#![forbid(unsafe_code)]
//! End-to-end coverage of format, mount, and the per-inode operations over
//! an in-memory device, plus one file-backed round trip.

use sfs_block::{BlockDevice, FileDisk, MemDisk};
use sfs_core::{inspect_device, FileSystem};
use sfs_error::SfsError;
use sfs_types::{BlockNumber, InodeNumber, BLOCK_SIZE, MAGIC};

fn formatted(block_count: u32) -> MemDisk {
    let disk = MemDisk::new(block_count);
    FileSystem::format(&disk).unwrap();
    disk
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add((i % 251) as u8)).collect()
}

#[test]
fn format_and_mount_hundred_block_volume() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();

    let superblock = fs.superblock().unwrap();
    assert_eq!(superblock.magic, MAGIC);
    assert_eq!(superblock.block_count, 100);
    assert_eq!(superblock.inode_table_blocks, 10);
    assert_eq!(superblock.inode_capacity(), 1280);
    assert_eq!(superblock.inodes_in_use, 0);

    // Block 0 and the ten table blocks are reserved; the rest are free.
    let tracker = fs.free_space().unwrap();
    for block in 0..=10 {
        assert!(!tracker.is_block_free(BlockNumber(block)), "block {block}");
    }
    assert_eq!(tracker.free_block_count(), 89);
    assert_eq!(tracker.free_inode_count(), 1280);
}

#[test]
fn hello_world_scenario() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();

    let inode = fs.create().unwrap();
    assert_eq!(inode, InodeNumber(0));

    let written = fs.write(inode, b"hello world", 0).unwrap();
    assert_eq!(written, 11);
    assert_eq!(fs.stat(inode).unwrap(), 11);

    let mut buf = vec![0_u8; 11];
    let read = fs.read(inode, &mut buf, 0).unwrap();
    assert_eq!(read, 11);
    assert_eq!(&buf, b"hello world");
}

#[test]
fn mount_unformatted_device_fails_with_invalid_magic() {
    let disk = MemDisk::new(20);
    let mut fs = FileSystem::new(&disk);
    let err = fs.mount().unwrap_err();
    assert!(matches!(
        err,
        SfsError::InvalidMagic {
            expected: MAGIC,
            actual: 0
        }
    ));

    // The failed mount left nothing behind.
    assert!(!fs.is_mounted());
    assert!(!disk.is_mounted());
    assert!(matches!(fs.create(), Err(SfsError::NotMounted)));
    assert!(matches!(
        fs.stat(InodeNumber(0)),
        Err(SfsError::NotMounted)
    ));
}

#[test]
fn mount_corrupted_magic_fails() {
    let disk = formatted(20);
    let mut block0 = disk.read_block(BlockNumber(0)).unwrap();
    block0[0] ^= 0xFF;
    disk.write_block(BlockNumber(0), &block0).unwrap();

    let mut fs = FileSystem::new(&disk);
    assert!(matches!(fs.mount(), Err(SfsError::InvalidMagic { .. })));
    assert!(!fs.is_mounted());
}

#[test]
fn double_mount_is_rejected() {
    let disk = formatted(20);
    let mut first = FileSystem::new(&disk);
    first.mount().unwrap();

    let mut second = FileSystem::new(&disk);
    assert!(matches!(second.mount(), Err(SfsError::AlreadyMounted)));

    first.unmount();
    second.mount().unwrap();
}

#[test]
fn format_mounted_device_is_rejected() {
    let disk = formatted(20);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    assert!(matches!(
        FileSystem::format(&disk),
        Err(SfsError::AlreadyMounted)
    ));
}

#[test]
fn unmount_is_idempotent_and_clears_the_device() {
    let disk = formatted(20);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    assert!(disk.is_mounted());

    fs.unmount();
    assert!(!fs.is_mounted());
    assert!(!disk.is_mounted());
    fs.unmount(); // no-op

    fs.mount().unwrap();
    assert!(disk.is_mounted());
}

#[test]
fn dropping_a_mounted_filesystem_releases_the_device() {
    let disk = formatted(20);
    {
        let mut fs = FileSystem::new(&disk);
        fs.mount().unwrap();
        assert!(disk.is_mounted());
    }
    assert!(!disk.is_mounted());
}

#[test]
fn sequential_creates_count_upward() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();

    for expected in 0..5 {
        let inode = fs.create().unwrap();
        assert_eq!(inode, InodeNumber(expected));
        assert_eq!(fs.stat(inode).unwrap(), 0);
    }
    assert_eq!(fs.superblock().unwrap().inodes_in_use, 5);
}

#[test]
fn write_read_within_one_block() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();

    let data = pattern(1000, 3);
    assert_eq!(fs.write(inode, &data, 100).unwrap(), 1000);
    assert_eq!(fs.stat(inode).unwrap(), 1100);

    let mut buf = vec![0_u8; 1000];
    assert_eq!(fs.read(inode, &mut buf, 100).unwrap(), 1000);
    assert_eq!(buf, data);
}

#[test]
fn write_read_exactly_spanning_a_block_boundary() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();

    // 100 bytes centred on the first block boundary.
    let data = pattern(100, 7);
    let offset = (BLOCK_SIZE - 50) as u32;
    assert_eq!(fs.write(inode, &data, offset).unwrap(), 100);
    assert_eq!(fs.stat(inode).unwrap(), BLOCK_SIZE as u32 + 50);

    let mut buf = vec![0_u8; 100];
    assert_eq!(fs.read(inode, &mut buf, offset).unwrap(), 100);
    assert_eq!(buf, data);
}

#[test]
fn write_read_one_exact_block() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();

    let data = pattern(BLOCK_SIZE, 11);
    assert_eq!(fs.write(inode, &data, 0).unwrap(), BLOCK_SIZE);
    assert_eq!(fs.stat(inode).unwrap(), BLOCK_SIZE as u32);

    let mut buf = vec![0_u8; BLOCK_SIZE];
    assert_eq!(fs.read(inode, &mut buf, 0).unwrap(), BLOCK_SIZE);
    assert_eq!(buf, data);
}

#[test]
fn write_read_crossing_into_indirect_range() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();

    // Six blocks and a tail: five direct blocks plus two indirect slots.
    let data = pattern(6 * BLOCK_SIZE + 10, 13);
    assert_eq!(fs.write(inode, &data, 0).unwrap(), data.len());
    assert_eq!(fs.stat(inode).unwrap(), data.len() as u32);

    let mut buf = vec![0_u8; data.len()];
    assert_eq!(fs.read(inode, &mut buf, 0).unwrap(), data.len());
    assert_eq!(buf, data);

    let report = inspect_device(&disk).unwrap();
    assert_eq!(report.inodes.len(), 1);
    let entry = &report.inodes[0];
    assert!(entry.direct.iter().all(|pointer| *pointer != 0));
    assert_ne!(entry.indirect, 0);
    assert_eq!(entry.indirect_pointers.len(), 2);
}

#[test]
fn sparse_write_beyond_direct_range_short_reads_the_hole() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();

    let offset = (5 * BLOCK_SIZE) as u32;
    assert_eq!(fs.write(inode, b"tail", offset).unwrap(), 4);
    assert_eq!(fs.stat(inode).unwrap(), offset + 4);

    // The direct range is a hole: reading from the start stops short
    // immediately, returning only bytes backed by allocated blocks.
    let mut buf = vec![0_u8; (offset + 4) as usize];
    assert_eq!(fs.read(inode, &mut buf, 0).unwrap(), 0);

    // Reading the tail itself works.
    let mut tail = [0_u8; 4];
    assert_eq!(fs.read(inode, &mut tail, offset).unwrap(), 4);
    assert_eq!(&tail, b"tail");
}

#[test]
fn read_clamps_to_file_size_and_past_end_reads_zero_bytes() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();
    fs.write(inode, b"abcdef", 0).unwrap();

    let mut buf = vec![0_u8; 100];
    assert_eq!(fs.read(inode, &mut buf, 0).unwrap(), 6);
    assert_eq!(&buf[..6], b"abcdef");

    assert_eq!(fs.read(inode, &mut buf, 6).unwrap(), 0);
    assert_eq!(fs.read(inode, &mut buf, 1000).unwrap(), 0);
    assert_eq!(fs.read(inode, &mut buf, 4).unwrap(), 2);
    assert_eq!(&buf[..2], b"ef");
}

#[test]
fn overwrite_preserves_surrounding_bytes() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();

    fs.write(inode, b"hello world", 0).unwrap();
    fs.write(inode, b"WORLD", 6).unwrap();
    assert_eq!(fs.stat(inode).unwrap(), 11);

    let mut buf = vec![0_u8; 11];
    fs.read(inode, &mut buf, 0).unwrap();
    assert_eq!(&buf, b"hello WORLD");
}

#[test]
fn write_past_maximum_file_size_is_rejected() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();

    let max = ((5 + 1024) * BLOCK_SIZE) as u32;
    let err = fs.write(inode, b"x", max).unwrap_err();
    assert!(matches!(err, SfsError::FileTooLarge { .. }));

    // Right at the edge still fits.
    assert_eq!(fs.write(inode, b"x", max - 1).unwrap(), 1);
    assert_eq!(fs.stat(inode).unwrap(), max);
}

#[test]
fn remove_frees_inode_and_blocks_for_reuse() {
    let disk = formatted(10); // 1 table block, data blocks 2..=9
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();

    let first = fs.create().unwrap();
    let second = fs.create().unwrap();
    assert_eq!((first, second), (InodeNumber(0), InodeNumber(1)));

    // Two data blocks for the first file: lowest-free order gives 2, 3.
    fs.write(first, &pattern(2 * BLOCK_SIZE, 5), 0).unwrap();
    {
        let report = inspect_device(&disk).unwrap();
        assert_eq!(report.inodes[0].direct[..2], [2, 3]);
    }

    fs.remove(first).unwrap();
    assert!(matches!(fs.stat(first), Err(SfsError::NotFound(0))));
    assert!(fs.free_space().unwrap().is_block_free(BlockNumber(2)));
    assert!(fs.free_space().unwrap().is_block_free(BlockNumber(3)));
    assert_eq!(fs.superblock().unwrap().inodes_in_use, 1);

    // The freed inode number is the lowest, so create returns it again;
    // the next write lands on the freed blocks.
    let reused = fs.create().unwrap();
    assert_eq!(reused, first);
    fs.write(reused, b"again", 0).unwrap();
    let report = inspect_device(&disk).unwrap();
    let entry = report
        .inodes
        .iter()
        .find(|entry| entry.inode == 0)
        .unwrap();
    assert_eq!(entry.direct[0], 2);
}

#[test]
fn remove_releases_indirect_chain() {
    let disk = formatted(100);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();

    fs.write(inode, &pattern(7 * BLOCK_SIZE, 1), 0).unwrap();
    let free_before_remove = fs.free_space().unwrap().free_block_count();

    fs.remove(inode).unwrap();
    // Seven data blocks plus the indirect block came back.
    assert_eq!(
        fs.free_space().unwrap().free_block_count(),
        free_before_remove + 8
    );
}

#[test]
fn inode_exhaustion_and_recovery() {
    // Two blocks: superblock + one table block, 128 inode slots, no data.
    let disk = formatted(2);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();

    for expected in 0..128 {
        assert_eq!(fs.create().unwrap(), InodeNumber(expected));
    }
    assert!(matches!(
        fs.create(),
        Err(SfsError::ResourceExhausted { resource: "inodes" })
    ));

    fs.remove(InodeNumber(77)).unwrap();
    assert_eq!(fs.create().unwrap(), InodeNumber(77));
    assert!(matches!(
        fs.create(),
        Err(SfsError::ResourceExhausted { .. })
    ));
}

#[test]
fn block_exhaustion_rolls_back_partial_allocations() {
    // Five blocks: superblock + table block + three data blocks.
    let disk = formatted(5);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let inode = fs.create().unwrap();
    assert_eq!(fs.free_space().unwrap().free_block_count(), 3);

    // Four blocks cannot fit in three.
    let err = fs.write(inode, &pattern(4 * BLOCK_SIZE, 9), 0).unwrap_err();
    assert!(matches!(
        err,
        SfsError::ResourceExhausted { resource: "blocks" }
    ));

    // Nothing became visible and every provisional block came back.
    assert_eq!(fs.stat(inode).unwrap(), 0);
    assert_eq!(fs.free_space().unwrap().free_block_count(), 3);

    // The rolled-back blocks satisfy a fitting write.
    let data = pattern(3 * BLOCK_SIZE, 9);
    assert_eq!(fs.write(inode, &data, 0).unwrap(), data.len());
    let mut buf = vec![0_u8; data.len()];
    assert_eq!(fs.read(inode, &mut buf, 0).unwrap(), data.len());
    assert_eq!(buf, data);
}

#[test]
fn operations_on_bad_inode_numbers() {
    let disk = formatted(10);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let free_blocks = fs.free_space().unwrap().free_block_count();
    let free_inodes = fs.free_space().unwrap().free_inode_count();

    // In range but never created.
    let missing = InodeNumber(3);
    assert!(matches!(fs.stat(missing), Err(SfsError::NotFound(3))));
    assert!(matches!(fs.remove(missing), Err(SfsError::NotFound(3))));
    let mut buf = [0_u8; 8];
    assert!(matches!(
        fs.read(missing, &mut buf, 0),
        Err(SfsError::NotFound(3))
    ));
    assert!(matches!(
        fs.write(missing, b"x", 0),
        Err(SfsError::NotFound(3))
    ));

    // Beyond capacity.
    let beyond = InodeNumber(128);
    assert!(matches!(
        fs.stat(beyond),
        Err(SfsError::OutOfRange {
            inode: 128,
            capacity: 128
        })
    ));
    assert!(matches!(
        fs.write(beyond, b"x", 0),
        Err(SfsError::OutOfRange { .. })
    ));

    // None of the failures touched the tracker.
    assert_eq!(fs.free_space().unwrap().free_block_count(), free_blocks);
    assert_eq!(fs.free_space().unwrap().free_inode_count(), free_inodes);
}

#[test]
fn remount_reconstructs_state_from_disk() {
    let disk = formatted(10);
    let data = pattern(2 * BLOCK_SIZE + 17, 21);
    {
        let mut fs = FileSystem::new(&disk);
        fs.mount().unwrap();
        let inode = fs.create().unwrap();
        fs.write(inode, &data, 0).unwrap();
        fs.unmount();
    }

    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    assert_eq!(fs.superblock().unwrap().inodes_in_use, 1);
    assert_eq!(fs.stat(InodeNumber(0)).unwrap(), data.len() as u32);

    // The reconstruction claimed the file's three blocks again.
    let tracker = fs.free_space().unwrap();
    assert!(!tracker.is_block_free(BlockNumber(2)));
    assert!(!tracker.is_block_free(BlockNumber(3)));
    assert!(!tracker.is_block_free(BlockNumber(4)));
    assert_eq!(tracker.free_block_count(), 10 - 2 - 3);

    let mut buf = vec![0_u8; data.len()];
    assert_eq!(fs.read(InodeNumber(0), &mut buf, 0).unwrap(), data.len());
    assert_eq!(buf, data);
}

#[test]
fn file_backed_volume_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volume.img");
    let data = pattern(BLOCK_SIZE + 100, 31);

    {
        let disk = FileDisk::create(&path, 25).unwrap();
        FileSystem::format(&disk).unwrap();
        let mut fs = FileSystem::new(&disk);
        fs.mount().unwrap();
        let inode = fs.create().unwrap();
        fs.write(inode, &data, 0).unwrap();
        fs.unmount();
        disk.sync().unwrap();
    }

    let disk = FileDisk::open(&path).unwrap();
    assert_eq!(disk.block_count(), 25);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    assert_eq!(fs.superblock().unwrap().inode_table_blocks, 3);
    let mut buf = vec![0_u8; data.len()];
    assert_eq!(fs.read(InodeNumber(0), &mut buf, 0).unwrap(), data.len());
    assert_eq!(buf, data);
}

#[test]
fn inspect_reports_superblock_and_valid_inodes_only() {
    let disk = formatted(30);
    let mut fs = FileSystem::new(&disk);
    fs.mount().unwrap();
    let keep = fs.create().unwrap();
    let drop_me = fs.create().unwrap();
    fs.write(keep, b"data", 0).unwrap();
    fs.remove(drop_me).unwrap();
    fs.unmount();

    let report = inspect_device(&disk).unwrap();
    assert_eq!(report.superblock.block_count, 30);
    assert_eq!(report.superblock.inode_table_blocks, 3);
    assert_eq!(report.inodes.len(), 1);
    assert_eq!(report.inodes[0].inode, keep.0);
    assert_eq!(report.inodes[0].size, 4);
}
