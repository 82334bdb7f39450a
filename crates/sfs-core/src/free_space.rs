//! Free-space bookkeeping: bitmaps for data blocks and inode slots.
//!
//! The tracker is process-local and never persisted. It is rebuilt in full
//! on every mount by scanning the inode table and every referenced data and
//! indirect block — an intentional O(blocks + inodes) cost.

use sfs_block::BlockDevice;
use sfs_error::{Result, SfsError};
use sfs_ondisk::{decode_pointer_block, Inode, Superblock};
use sfs_types::{BlockNumber, InodeNumber, INODES_PER_BLOCK};
use tracing::debug;

use crate::from_parse;

/// Flat bit-vector; a set bit means "in use".
#[derive(Debug, Clone)]
pub struct Bitmap {
    bits: Vec<u8>,
    len: u32,
}

impl Bitmap {
    /// Bitmap of `len` entries, all clear (free).
    #[must_use]
    pub fn new(len: u32) -> Self {
        Self {
            bits: vec![0_u8; (len as usize).div_ceil(8)],
            len,
        }
    }

    #[must_use]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether entry `idx` is in use. Out-of-range reads as in use.
    #[must_use]
    pub fn get(&self, idx: u32) -> bool {
        if idx >= self.len {
            return true;
        }
        let byte = (idx / 8) as usize;
        let bit = idx % 8;
        (self.bits[byte] >> bit) & 1 == 1
    }

    /// Mark entry `idx` in use.
    pub fn set(&mut self, idx: u32) {
        if idx < self.len {
            let byte = (idx / 8) as usize;
            self.bits[byte] |= 1 << (idx % 8);
        }
    }

    /// Mark entry `idx` free.
    pub fn clear(&mut self, idx: u32) {
        if idx < self.len {
            let byte = (idx / 8) as usize;
            self.bits[byte] &= !(1 << (idx % 8));
        }
    }

    /// Number of free entries.
    #[must_use]
    pub fn count_clear(&self) -> u32 {
        (0..self.len).filter(|idx| !self.get(*idx)).count() as u32
    }

    /// Lowest-numbered free entry, scanning in ascending index order.
    ///
    /// The ascending tie-break is part of the allocation contract: callers
    /// observe it through the order in which blocks and inodes are handed
    /// out and reused.
    #[must_use]
    pub fn find_first_clear(&self) -> Option<u32> {
        (0..self.len).find(|idx| !self.get(*idx))
    }
}

/// In-memory availability state for every data block and inode slot.
#[derive(Debug, Clone)]
pub struct FreeSpaceTracker {
    blocks: Bitmap,
    inodes: Bitmap,
}

impl FreeSpaceTracker {
    /// Reconstruct availability by scanning the full inode table.
    ///
    /// Block 0 and the inode-table blocks are permanently in use. Every
    /// valid inode claims its slot, its nonzero direct blocks, and — when
    /// present — its indirect block plus every nonzero pointer inside it.
    ///
    /// Returns the tracker and the number of valid inodes encountered. On
    /// any failure no partial tracker is returned.
    pub fn rebuild<D: BlockDevice + ?Sized>(
        device: &D,
        superblock: &Superblock,
    ) -> Result<(Self, u32)> {
        let mut blocks = Bitmap::new(superblock.block_count);
        let mut inodes = Bitmap::new(superblock.inode_capacity());

        blocks.set(0);
        for table_block in 1..=superblock.inode_table_blocks {
            blocks.set(table_block);
        }

        let mut valid_inodes = 0_u32;
        for table_index in 0..superblock.inode_table_blocks {
            let raw = device.read_block(BlockNumber(1 + table_index))?;
            for slot in 0..INODES_PER_BLOCK {
                let record = Inode::decode_slot(&raw, slot).map_err(from_parse)?;
                let number = table_index * INODES_PER_BLOCK as u32 + slot as u32;
                if !record.valid {
                    inodes.clear(number);
                    continue;
                }

                inodes.set(number);
                valid_inodes += 1;

                for pointer in record.direct {
                    if pointer != 0 {
                        claim_block(&mut blocks, pointer, superblock)?;
                    }
                }
                if record.indirect != 0 {
                    claim_block(&mut blocks, record.indirect, superblock)?;
                    let indirect_raw =
                        device.read_block(BlockNumber(record.indirect))?;
                    let pointers =
                        decode_pointer_block(&indirect_raw).map_err(from_parse)?;
                    for pointer in pointers {
                        if pointer != 0 {
                            claim_block(&mut blocks, pointer, superblock)?;
                        }
                    }
                }
            }
        }

        let tracker = Self { blocks, inodes };
        debug!(
            valid_inodes,
            free_blocks = tracker.free_block_count(),
            free_inodes = tracker.free_inode_count(),
            "reconstructed free-space state"
        );
        Ok((tracker, valid_inodes))
    }

    /// Lowest-numbered free data block.
    pub fn find_first_free_block(&self) -> Result<BlockNumber> {
        self.blocks
            .find_first_clear()
            .map(BlockNumber)
            .ok_or(SfsError::ResourceExhausted { resource: "blocks" })
    }

    /// Lowest-numbered free inode slot.
    pub fn find_first_free_inode(&self) -> Result<InodeNumber> {
        self.inodes
            .find_first_clear()
            .map(InodeNumber)
            .ok_or(SfsError::ResourceExhausted { resource: "inodes" })
    }

    pub fn mark_block_used(&mut self, block: BlockNumber) {
        self.blocks.set(block.0);
    }

    pub fn mark_block_free(&mut self, block: BlockNumber) {
        self.blocks.clear(block.0);
    }

    pub fn mark_inode_used(&mut self, inode: InodeNumber) {
        self.inodes.set(inode.0);
    }

    pub fn mark_inode_free(&mut self, inode: InodeNumber) {
        self.inodes.clear(inode.0);
    }

    #[must_use]
    pub fn is_block_free(&self, block: BlockNumber) -> bool {
        !self.blocks.get(block.0)
    }

    #[must_use]
    pub fn is_inode_free(&self, inode: InodeNumber) -> bool {
        !self.inodes.get(inode.0)
    }

    #[must_use]
    pub fn free_block_count(&self) -> u32 {
        self.blocks.count_clear()
    }

    #[must_use]
    pub fn free_inode_count(&self) -> u32 {
        self.inodes.count_clear()
    }
}

/// Mark a referenced block in use, rejecting references past the device.
fn claim_block(
    blocks: &mut Bitmap,
    pointer: u32,
    superblock: &Superblock,
) -> Result<()> {
    if pointer >= superblock.block_count {
        return Err(SfsError::Device {
            block: u64::from(pointer),
            detail: format!(
                "inode references a block past the device (block_count={})",
                superblock.block_count
            ),
        });
    }
    blocks.set(pointer);
    Ok(())
}
