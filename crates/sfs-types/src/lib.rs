#![forbid(unsafe_code)]
//! Shared constants, unit-carrying newtypes, and byte-level parse helpers.
//!
//! Every other crate in the workspace builds on these definitions. The
//! constants describe the fixed on-disk geometry; the newtypes keep block
//! numbers and inode numbers from being mixed up in signatures; the helpers
//! read and write little-endian fields out of block-sized byte buffers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Bytes per device block.
pub const BLOCK_SIZE: usize = 4096;

/// Superblock signature identifying a formatted volume.
pub const MAGIC: u32 = 0xF0F0_3410;

/// Inode records packed into one inode-table block.
pub const INODES_PER_BLOCK: usize = 128;

/// Direct block pointers stored inline in each inode.
pub const POINTERS_PER_INODE: usize = 5;

/// Block pointers stored in one indirect block.
pub const POINTERS_PER_BLOCK: usize = 1024;

/// Size of one packed inode record in bytes.
pub const INODE_SIZE: usize = 32;

/// Largest addressable file: direct span plus one indirect block's span.
pub const MAX_FILE_SIZE: u64 =
    ((POINTERS_PER_INODE + POINTERS_PER_BLOCK) * BLOCK_SIZE) as u64;

// The inode table layout only works if records tile a block exactly, and an
// indirect block must hold exactly POINTERS_PER_BLOCK 4-byte pointers.
const _: () = assert!(INODES_PER_BLOCK * INODE_SIZE == BLOCK_SIZE);
const _: () = assert!(POINTERS_PER_BLOCK * 4 == BLOCK_SIZE);

/// Inode-table blocks reserved for a volume of `block_count` blocks.
///
/// Always 10% of the volume, rounding up.
#[must_use]
pub fn inode_table_blocks_for(block_count: u32) -> u32 {
    block_count.div_ceil(10)
}

/// Physical block number on a device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockNumber(pub u32);

/// Inode number: index into the flat inode table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct InodeNumber(pub u32);

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors produced while decoding or encoding on-disk structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

/// Borrow `len` bytes at `offset`, or fail with a descriptive error.
#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Write a little-endian u32 into `data` at `offset`.
#[inline]
pub fn write_le_u32(data: &mut [u8], offset: usize, value: u32) -> Result<(), ParseError> {
    let Some(end) = offset.checked_add(4) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };
    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: 4,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }
    data[offset..end].copy_from_slice(&value.to_le_bytes());
    Ok(())
}
