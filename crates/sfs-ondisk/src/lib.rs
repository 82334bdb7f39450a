#![forbid(unsafe_code)]
//! On-disk format parsing and encoding.
//!
//! Pure layout crate — no I/O, no side effects. A device block is always an
//! untyped `[u8; BLOCK_SIZE]` buffer; this crate provides the typed views
//! over it: superblock, packed inode records, and indirect pointer arrays.
//! Each view has a decode and an encode direction so that no two typed
//! interpretations of the same memory are ever live at once.
//!
//! All fields are 4-byte unsigned little-endian.

mod inode;
mod pointers;
mod superblock;

pub use inode::Inode;
pub use pointers::{decode_pointer_block, encode_pointer_block};
pub use superblock::Superblock;
