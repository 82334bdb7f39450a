use serde::{Deserialize, Serialize};
use sfs_types::{
    inode_table_blocks_for, read_le_u32, write_le_u32, ParseError, BLOCK_SIZE,
    INODES_PER_BLOCK, MAGIC,
};

/// Volume-wide metadata stored in block 0.
///
/// Layout: four little-endian u32 fields at offsets 0, 4, 8, 12 — `magic`,
/// `block_count`, `inode_table_blocks`, `inodes_in_use`. The remaining bytes
/// of the block are reserved and written as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    /// Signature identifying a formatted volume.
    pub magic: u32,
    /// Total blocks on the device, superblock and inode table included.
    pub block_count: u32,
    /// Blocks reserved for inode records, always `ceil(block_count / 10)`.
    pub inode_table_blocks: u32,
    /// Count of currently-valid inodes. Informational: the mount-time
    /// reconstruction scan is the source of truth.
    pub inodes_in_use: u32,
}

impl Superblock {
    /// Superblock for a freshly formatted volume of `block_count` blocks.
    #[must_use]
    pub fn for_volume(block_count: u32) -> Self {
        Self {
            magic: MAGIC,
            block_count,
            inode_table_blocks: inode_table_blocks_for(block_count),
            inodes_in_use: 0,
        }
    }

    /// Decode from a block-0 buffer. Fails on a signature mismatch; field
    /// plausibility is checked separately by [`Superblock::validate`].
    pub fn decode(block: &[u8]) -> Result<Self, ParseError> {
        let magic = read_le_u32(block, 0)?;
        if magic != MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: MAGIC,
                actual: magic,
            });
        }

        Ok(Self {
            magic,
            block_count: read_le_u32(block, 4)?,
            inode_table_blocks: read_le_u32(block, 8)?,
            inodes_in_use: read_le_u32(block, 12)?,
        })
    }

    /// Check geometry invariants: the reserved inode-table share must match
    /// the 10%-rounded-up rule and must leave room for at least the
    /// superblock itself.
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.block_count == 0 {
            return Err(ParseError::InvalidField {
                field: "block_count",
                reason: "must be nonzero",
            });
        }
        if self.inode_table_blocks != inode_table_blocks_for(self.block_count) {
            return Err(ParseError::InvalidField {
                field: "inode_table_blocks",
                reason: "does not equal ceil(block_count / 10)",
            });
        }
        let reserved = 1 + u64::from(self.inode_table_blocks);
        if reserved > u64::from(self.block_count) {
            return Err(ParseError::InvalidField {
                field: "inode_table_blocks",
                reason: "reserved region exceeds the device",
            });
        }
        Ok(())
    }

    /// Encode into a full block buffer; reserved bytes are zero.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut block = vec![0_u8; BLOCK_SIZE];
        // Offsets are in-bounds by construction; the helpers cannot fail here.
        let _ = write_le_u32(&mut block, 0, self.magic);
        let _ = write_le_u32(&mut block, 4, self.block_count);
        let _ = write_le_u32(&mut block, 8, self.inode_table_blocks);
        let _ = write_le_u32(&mut block, 12, self.inodes_in_use);
        block
    }

    /// Total inode slots on this volume.
    #[must_use]
    pub fn inode_capacity(&self) -> u32 {
        self.inode_table_blocks * INODES_PER_BLOCK as u32
    }
}
