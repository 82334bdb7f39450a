#![forbid(unsafe_code)]
//! Error types for SFS.
//!
//! `SfsError` is the single user-facing error type returned by the block
//! device, the file-system layer, and the CLI. Crate-internal errors
//! (`ParseError` from `sfs-types`) convert into `SfsError` at the crate
//! boundary that sees both sides (`sfs-core`), keeping this crate free of
//! cyclic dependencies.
//!
//! ## Propagation policy
//!
//! Every error is returned to the immediate caller. No component retries
//! internally and no component logs and continues: a failed operation must
//! not leave in-memory allocation state and the on-disk inode table
//! mutually inconsistent. Callers see either a completed operation or an
//! error with nothing visible changed.
//!
//! ## errno mapping
//!
//! Every variant maps to exactly one POSIX errno via [`SfsError::to_errno`].
//! The mapping is exhaustive (no wildcard arm) so adding a new variant is a
//! compile error until its errno is assigned.
//!
//! | Variant | errno |
//! |---------|-------|
//! | `Io` | raw os errno, else `EIO` |
//! | `Device` | `EIO` |
//! | `InvalidMagic` | `EINVAL` |
//! | `Parse` | `EINVAL` |
//! | `AlreadyMounted` | `EBUSY` |
//! | `NotMounted` | `ENODEV` |
//! | `OutOfRange` | `EINVAL` |
//! | `ResourceExhausted` | `ENOSPC` |
//! | `FileTooLarge` | `EFBIG` |
//! | `NotFound` | `ENOENT` |

use thiserror::Error;

/// Unified error type for all SFS operations.
#[derive(Debug, Error)]
pub enum SfsError {
    /// Operating system I/O error outside whole-block transfers (open,
    /// truncate, metadata, sync).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A whole-block read or write failed: short transfer, out-of-range
    /// block index, or a rejected reentrant operation. Always fatal to the
    /// current operation, never retried.
    #[error("device error at block {block}: {detail}")]
    Device { block: u64, detail: String },

    /// Superblock signature mismatch at mount.
    #[error("invalid superblock magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    /// On-disk structure failed to decode or validate.
    ///
    /// Carries the rendered `ParseError` from `sfs-types`; the conversion
    /// lives in `sfs-core` so this crate stays dependency-free.
    #[error("parse error: {0}")]
    Parse(String),

    /// The device already has an active mount (or a format was attempted
    /// while mounted).
    #[error("device is already mounted")]
    AlreadyMounted,

    /// Operation requires a mounted file system.
    #[error("no file system is mounted")]
    NotMounted,

    /// Inode number is at or beyond the table capacity.
    #[error("inode {inode} out of range (capacity {capacity})")]
    OutOfRange { inode: u32, capacity: u32 },

    /// No free inode slot or data block remains.
    #[error("no free {resource} left on device")]
    ResourceExhausted { resource: &'static str },

    /// Requested byte range exceeds the addressable span of an inode.
    #[error("byte range ends at {end}, exceeding the maximum file size {max}")]
    FileTooLarge { end: u64, max: u64 },

    /// Operation targets an invalid (free) inode.
    #[error("inode {0} not found")]
    NotFound(u32),
}

impl SfsError {
    /// Convert this error into a POSIX errno.
    ///
    /// The mapping is exhaustive — every variant has an explicit arm.
    ///
    /// Policy notes:
    /// - `NotMounted` → `ENODEV`: the session has no device behind it.
    /// - `OutOfRange` → `EINVAL`: a bad argument, not a missing file;
    ///   `NotFound` (`ENOENT`) is reserved for in-range but free inodes.
    /// - `Parse` / `InvalidMagic` → `EINVAL`: structurally invalid image.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::Device { .. } => libc::EIO,
            Self::InvalidMagic { .. } | Self::Parse(_) | Self::OutOfRange { .. } => {
                libc::EINVAL
            }
            Self::AlreadyMounted => libc::EBUSY,
            Self::NotMounted => libc::ENODEV,
            Self::ResourceExhausted { .. } => libc::ENOSPC,
            Self::FileTooLarge { .. } => libc::EFBIG,
            Self::NotFound(_) => libc::ENOENT,
        }
    }
}

/// Result alias using `SfsError`.
pub type Result<T> = std::result::Result<T, SfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_covers_all_variants() {
        let cases: Vec<(SfsError, libc::c_int)> = vec![
            (SfsError::Io(std::io::Error::other("test")), libc::EIO),
            (
                SfsError::Device {
                    block: 3,
                    detail: "short read".into(),
                },
                libc::EIO,
            ),
            (
                SfsError::InvalidMagic {
                    expected: 0xF0F0_3410,
                    actual: 0,
                },
                libc::EINVAL,
            ),
            (SfsError::Parse("bad field".into()), libc::EINVAL),
            (SfsError::AlreadyMounted, libc::EBUSY),
            (SfsError::NotMounted, libc::ENODEV),
            (
                SfsError::OutOfRange {
                    inode: 1280,
                    capacity: 1280,
                },
                libc::EINVAL,
            ),
            (
                SfsError::ResourceExhausted { resource: "blocks" },
                libc::ENOSPC,
            ),
            (
                SfsError::FileTooLarge {
                    end: 5_000_000,
                    max: 4_214_784,
                },
                libc::EFBIG,
            ),
            (SfsError::NotFound(9), libc::ENOENT),
        ];

        for (error, expected_errno) in &cases {
            assert_eq!(
                error.to_errno(),
                *expected_errno,
                "wrong errno for {error:?}",
            );
        }
    }

    #[test]
    fn io_error_preserves_raw_os_error() {
        let raw = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(SfsError::Io(raw).to_errno(), libc::EACCES);
    }

    #[test]
    fn display_formatting() {
        let err = SfsError::InvalidMagic {
            expected: 0xF0F0_3410,
            actual: 0xDEAD_BEEF,
        };
        assert_eq!(
            err.to_string(),
            "invalid superblock magic: expected 0xf0f03410, got 0xdeadbeef"
        );

        let dev = SfsError::Device {
            block: 12,
            detail: "read returned 100 of 4096 bytes".into(),
        };
        assert_eq!(
            dev.to_string(),
            "device error at block 12: read returned 100 of 4096 bytes"
        );

        let oor = SfsError::OutOfRange {
            inode: 1280,
            capacity: 1280,
        };
        assert_eq!(oor.to_string(), "inode 1280 out of range (capacity 1280)");

        let full = SfsError::ResourceExhausted { resource: "inodes" };
        assert_eq!(full.to_string(), "no free inodes left on device");
    }
}
