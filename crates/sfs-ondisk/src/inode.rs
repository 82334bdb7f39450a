use serde::{Deserialize, Serialize};
use sfs_types::{
    read_le_u32, write_le_u32, ParseError, INODES_PER_BLOCK, INODE_SIZE,
    POINTERS_PER_INODE,
};

/// One packed 32-byte inode record.
///
/// Layout within the record: `valid` (nonzero = live), `size` in bytes,
/// five direct block numbers, one indirect block number. A block number of
/// zero means "unallocated" — block 0 holds the superblock and can never be
/// file data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    /// Whether the slot holds a live file.
    pub valid: bool,
    /// File length in bytes.
    pub size: u32,
    /// Physical block numbers of the first five data blocks.
    pub direct: [u32; POINTERS_PER_INODE],
    /// Physical block number of the indirect pointer block, or zero.
    pub indirect: u32,
}

impl Inode {
    /// A freed slot: invalid, zero-sized, all pointers unallocated.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            valid: false,
            size: 0,
            direct: [0; POINTERS_PER_INODE],
            indirect: 0,
        }
    }

    /// Decode the record in `slot` of an inode-table block.
    pub fn decode_slot(block: &[u8], slot: usize) -> Result<Self, ParseError> {
        if slot >= INODES_PER_BLOCK {
            return Err(ParseError::InvalidField {
                field: "slot",
                reason: "exceeds inodes per block",
            });
        }
        let base = slot * INODE_SIZE;

        let mut direct = [0_u32; POINTERS_PER_INODE];
        for (i, entry) in direct.iter_mut().enumerate() {
            *entry = read_le_u32(block, base + 8 + i * 4)?;
        }

        Ok(Self {
            valid: read_le_u32(block, base)? != 0,
            size: read_le_u32(block, base + 4)?,
            direct,
            indirect: read_le_u32(block, base + 28)?,
        })
    }

    /// Encode this record into `slot` of an inode-table block.
    pub fn encode_slot(&self, block: &mut [u8], slot: usize) -> Result<(), ParseError> {
        if slot >= INODES_PER_BLOCK {
            return Err(ParseError::InvalidField {
                field: "slot",
                reason: "exceeds inodes per block",
            });
        }
        let base = slot * INODE_SIZE;

        write_le_u32(block, base, u32::from(self.valid))?;
        write_le_u32(block, base + 4, self.size)?;
        for (i, entry) in self.direct.iter().enumerate() {
            write_le_u32(block, base + 8 + i * 4, *entry)?;
        }
        write_le_u32(block, base + 28, self.indirect)
    }
}

impl Default for Inode {
    fn default() -> Self {
        Self::zeroed()
    }
}
