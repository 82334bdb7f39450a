//! Structured volume inspection.
//!
//! The core never prints: it returns a serializable report and lets the
//! consumer render it as text or JSON. Inspection reads the raw device and
//! does not require (or take) a mount.

use serde::Serialize;
use sfs_block::BlockDevice;
use sfs_error::Result;
use sfs_ondisk::{decode_pointer_block, Inode, Superblock};
use sfs_types::{BlockNumber, INODES_PER_BLOCK};

use crate::from_parse;

/// Snapshot of one valid inode.
#[derive(Debug, Clone, Serialize)]
pub struct InodeReport {
    pub inode: u32,
    pub size: u32,
    /// All five direct slots, zero meaning unallocated.
    pub direct: Vec<u32>,
    /// Indirect block number, zero meaning unallocated.
    pub indirect: u32,
    /// Nonzero pointers inside the indirect block, in slot order.
    pub indirect_pointers: Vec<u32>,
}

/// Snapshot of a whole volume: superblock plus every valid inode.
///
/// Invalid slots are skipped.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeReport {
    pub superblock: Superblock,
    pub inodes: Vec<InodeReport>,
}

/// Scan a device and report its superblock and valid inodes.
pub fn inspect_device<D: BlockDevice + ?Sized>(device: &D) -> Result<VolumeReport> {
    let raw = device.read_block(BlockNumber(0))?;
    let superblock = Superblock::decode(&raw).map_err(from_parse)?;
    superblock.validate().map_err(from_parse)?;

    let mut inodes = Vec::new();
    for table_index in 0..superblock.inode_table_blocks {
        let raw = device.read_block(BlockNumber(1 + table_index))?;
        for slot in 0..INODES_PER_BLOCK {
            let record = Inode::decode_slot(&raw, slot).map_err(from_parse)?;
            if !record.valid {
                continue;
            }
            let number = table_index * INODES_PER_BLOCK as u32 + slot as u32;
            inodes.push(report_inode(device, number, &record)?);
        }
    }

    Ok(VolumeReport { superblock, inodes })
}

fn report_inode<D: BlockDevice + ?Sized>(
    device: &D,
    number: u32,
    record: &Inode,
) -> Result<InodeReport> {
    let indirect_pointers = if record.indirect != 0 {
        let raw = device.read_block(BlockNumber(record.indirect))?;
        decode_pointer_block(&raw)
            .map_err(from_parse)?
            .into_iter()
            .filter(|pointer| *pointer != 0)
            .collect()
    } else {
        Vec::new()
    };

    Ok(InodeReport {
        inode: number,
        size: record.size,
        direct: record.direct.to_vec(),
        indirect: record.indirect,
        indirect_pointers,
    })
}
