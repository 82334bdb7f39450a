//! Inode table addressing: translation between an inode number and its
//! physical (block, slot) location, plus load/store of single records.
//!
//! The device is only block-addressable, so single-record updates are
//! whole-block read-modify-write cycles.

use sfs_block::BlockDevice;
use sfs_error::{Result, SfsError};
use sfs_ondisk::{Inode, Superblock};
use sfs_types::{BlockNumber, InodeNumber, INODES_PER_BLOCK};

use crate::from_parse;

#[derive(Debug, Clone, Copy)]
pub struct InodeTable {
    inode_table_blocks: u32,
}

impl InodeTable {
    #[must_use]
    pub fn new(superblock: &Superblock) -> Self {
        Self {
            inode_table_blocks: superblock.inode_table_blocks,
        }
    }

    /// Total inode slots addressable through this table.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.inode_table_blocks * INODES_PER_BLOCK as u32
    }

    /// Physical block and slot offset of `inode`. The `+1` skips the
    /// superblock.
    pub fn locate(&self, inode: InodeNumber) -> Result<(BlockNumber, usize)> {
        if inode.0 >= self.capacity() {
            return Err(SfsError::OutOfRange {
                inode: inode.0,
                capacity: self.capacity(),
            });
        }
        let block = BlockNumber(1 + inode.0 / INODES_PER_BLOCK as u32);
        let slot = (inode.0 % INODES_PER_BLOCK as u32) as usize;
        Ok((block, slot))
    }

    /// Load one inode record.
    pub fn load<D: BlockDevice + ?Sized>(
        &self,
        device: &D,
        inode: InodeNumber,
    ) -> Result<Inode> {
        let (block, slot) = self.locate(inode)?;
        let raw = device.read_block(block)?;
        Inode::decode_slot(&raw, slot).map_err(from_parse)
    }

    /// Store one inode record, rewriting its whole owning block.
    pub fn store<D: BlockDevice + ?Sized>(
        &self,
        device: &D,
        inode: InodeNumber,
        record: &Inode,
    ) -> Result<()> {
        let (block, slot) = self.locate(inode)?;
        let mut raw = device.read_block(block)?;
        record.encode_slot(&mut raw, slot).map_err(from_parse)?;
        device.write_block(block, &raw)
    }
}
