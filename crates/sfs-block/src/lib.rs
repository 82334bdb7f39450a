#![forbid(unsafe_code)]
//! Block device layer: whole-block I/O over a simulated disk.
//!
//! A device is a flat store addressed in `BLOCK_SIZE` units. Two
//! implementations are provided: [`FileDisk`], backed by a regular file
//! using positional reads and writes, and [`MemDisk`], backed by a byte
//! vector, for tests and throwaway volumes.
//!
//! Every device enforces a single-outstanding-operation discipline: a
//! read or write issued while a previous one on the same handle has not
//! returned is rejected with a device error. This is a correctness guard
//! against reentrant misuse, not a scheduling mechanism — the guard is a
//! scoped acquisition taken at entry and released on every exit path.

use parking_lot::Mutex;
use sfs_error::{Result, SfsError};
use sfs_types::{BlockNumber, BLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Whole-block I/O interface.
///
/// Methods take `&self`; implementations keep their statistics and mount
/// flag behind interior mutability so one handle can be shared by a borrow.
pub trait BlockDevice: Send + Sync {
    /// Total number of blocks on the device.
    fn block_count(&self) -> u32;

    /// Read one block. The returned buffer is exactly `BLOCK_SIZE` bytes.
    fn read_block(&self, block: BlockNumber) -> Result<Vec<u8>>;

    /// Write one block. `data.len()` MUST equal `BLOCK_SIZE`.
    fn write_block(&self, block: BlockNumber, data: &[u8]) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Whether a file system currently claims this device.
    fn is_mounted(&self) -> bool;

    /// Set or clear the mount claim.
    fn set_mounted(&self, mounted: bool);

    /// Blocks read since the device was opened.
    fn reads(&self) -> u64;

    /// Blocks written since the device was opened.
    fn writes(&self) -> u64;
}

/// Shared bookkeeping for both device implementations.
#[derive(Debug, Default)]
struct DeviceState {
    reads: AtomicU64,
    writes: AtomicU64,
    mounted: AtomicBool,
    busy: Mutex<()>,
}

impl DeviceState {
    /// Acquire the single-outstanding-operation guard, or reject the call.
    fn begin_io(&self, block: BlockNumber) -> Result<parking_lot::MutexGuard<'_, ()>> {
        self.busy.try_lock().ok_or_else(|| SfsError::Device {
            block: u64::from(block.0),
            detail: "operation rejected: a previous operation on this handle is still in flight"
                .to_owned(),
        })
    }
}

fn check_bounds(block: BlockNumber, block_count: u32) -> Result<()> {
    if block.0 >= block_count {
        return Err(SfsError::Device {
            block: u64::from(block.0),
            detail: format!("block out of range: block_count={block_count}"),
        });
    }
    Ok(())
}

fn check_write_len(block: BlockNumber, data: &[u8]) -> Result<()> {
    if data.len() != BLOCK_SIZE {
        return Err(SfsError::Device {
            block: u64::from(block.0),
            detail: format!(
                "write_block data size mismatch: got={} expected={BLOCK_SIZE}",
                data.len()
            ),
        });
    }
    Ok(())
}

/// File-backed block device using positional I/O.
///
/// Positional reads and writes do not share a seek cursor, so a single
/// `File` handle serves every operation.
#[derive(Debug)]
pub struct FileDisk {
    file: Arc<File>,
    block_count: u32,
    state: DeviceState,
}

impl FileDisk {
    /// Create (or truncate) a disk image sized to exactly
    /// `block_count * BLOCK_SIZE` bytes.
    pub fn create(path: impl AsRef<Path>, block_count: u32) -> Result<Self> {
        if block_count == 0 {
            return Err(SfsError::Device {
                block: 0,
                detail: "device must have at least one block".to_owned(),
            });
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(u64::from(block_count) * BLOCK_SIZE as u64)?;
        Ok(Self {
            file: Arc::new(file),
            block_count,
            state: DeviceState::default(),
        })
    }

    /// Open an existing disk image, deriving the block count from its
    /// length. Rejects images whose length is not block-aligned.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let len = file.metadata()?.len();
        if len == 0 || len % BLOCK_SIZE as u64 != 0 {
            return Err(SfsError::Parse(format!(
                "image length {len} is not a positive multiple of the {BLOCK_SIZE}-byte block size"
            )));
        }
        let block_count = u32::try_from(len / BLOCK_SIZE as u64).map_err(|_| {
            SfsError::Parse(format!("image of {len} bytes has too many blocks"))
        })?;
        Ok(Self {
            file: Arc::new(file),
            block_count,
            state: DeviceState::default(),
        })
    }
}

impl BlockDevice for FileDisk {
    fn block_count(&self) -> u32 {
        self.block_count
    }

    fn read_block(&self, block: BlockNumber) -> Result<Vec<u8>> {
        let _guard = self.state.begin_io(block)?;
        check_bounds(block, self.block_count)?;

        let offset = u64::from(block.0) * BLOCK_SIZE as u64;
        let mut buf = vec![0_u8; BLOCK_SIZE];
        self.file
            .read_exact_at(&mut buf, offset)
            .map_err(|err| SfsError::Device {
                block: u64::from(block.0),
                detail: format!("read failed: {err}"),
            })?;
        self.state.reads.fetch_add(1, Ordering::Relaxed);
        trace!(block = block.0, "read block");
        Ok(buf)
    }

    fn write_block(&self, block: BlockNumber, data: &[u8]) -> Result<()> {
        let _guard = self.state.begin_io(block)?;
        check_bounds(block, self.block_count)?;
        check_write_len(block, data)?;

        let offset = u64::from(block.0) * BLOCK_SIZE as u64;
        self.file
            .write_all_at(data, offset)
            .map_err(|err| SfsError::Device {
                block: u64::from(block.0),
                detail: format!("write failed: {err}"),
            })?;
        self.state.writes.fetch_add(1, Ordering::Relaxed);
        trace!(block = block.0, "wrote block");
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.state.mounted.load(Ordering::Acquire)
    }

    fn set_mounted(&self, mounted: bool) {
        self.state.mounted.store(mounted, Ordering::Release);
    }

    fn reads(&self) -> u64 {
        self.state.reads.load(Ordering::Relaxed)
    }

    fn writes(&self) -> u64 {
        self.state.writes.load(Ordering::Relaxed)
    }
}

/// In-memory block device for tests and throwaway volumes.
#[derive(Debug)]
pub struct MemDisk {
    bytes: Mutex<Vec<u8>>,
    block_count: u32,
    state: DeviceState,
}

impl MemDisk {
    /// Create a zero-filled in-memory device of `block_count` blocks.
    #[must_use]
    pub fn new(block_count: u32) -> Self {
        Self {
            bytes: Mutex::new(vec![0_u8; block_count as usize * BLOCK_SIZE]),
            block_count,
            state: DeviceState::default(),
        }
    }
}

impl BlockDevice for MemDisk {
    fn block_count(&self) -> u32 {
        self.block_count
    }

    fn read_block(&self, block: BlockNumber) -> Result<Vec<u8>> {
        let _guard = self.state.begin_io(block)?;
        check_bounds(block, self.block_count)?;

        let start = block.0 as usize * BLOCK_SIZE;
        let buf = self.bytes.lock()[start..start + BLOCK_SIZE].to_vec();
        self.state.reads.fetch_add(1, Ordering::Relaxed);
        Ok(buf)
    }

    fn write_block(&self, block: BlockNumber, data: &[u8]) -> Result<()> {
        let _guard = self.state.begin_io(block)?;
        check_bounds(block, self.block_count)?;
        check_write_len(block, data)?;

        let start = block.0 as usize * BLOCK_SIZE;
        self.bytes.lock()[start..start + BLOCK_SIZE].copy_from_slice(data);
        self.state.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.state.mounted.load(Ordering::Acquire)
    }

    fn set_mounted(&self, mounted: bool) {
        self.state.mounted.store(mounted, Ordering::Release);
    }

    fn reads(&self) -> u64 {
        self.state.reads.load(Ordering::Relaxed)
    }

    fn writes(&self) -> u64 {
        self.state.writes.load(Ordering::Relaxed)
    }
}
