#![forbid(unsafe_code)]
//! The file-system layer: format, mount, and per-inode operations over a
//! block device.
//!
//! A [`FileSystem`] borrows its device; the device must outlive the
//! session. The state machine is `Unmounted → Mounted → Unmounted`:
//! [`FileSystem::mount`] is the only transition out of `Unmounted`, every
//! other operation requires `Mounted` and fails with `NotMounted`
//! otherwise, and a failed mount leaves no partially-built state behind.
//!
//! Execution is single-threaded and synchronous — every operation runs to
//! completion before returning. One caller operates on one mounted
//! instance at a time; callers needing more impose external mutual
//! exclusion.

mod free_space;
mod inode_table;
mod report;

pub use free_space::{Bitmap, FreeSpaceTracker};
pub use inode_table::InodeTable;
pub use report::{inspect_device, InodeReport, VolumeReport};

use sfs_block::BlockDevice;
use sfs_error::{Result, SfsError};
use sfs_ondisk::{decode_pointer_block, encode_pointer_block, Inode, Superblock};
use sfs_types::{
    BlockNumber, InodeNumber, ParseError, BLOCK_SIZE, MAX_FILE_SIZE,
    POINTERS_PER_BLOCK, POINTERS_PER_INODE,
};
use tracing::{debug, trace};

/// Convert a layout-level decode failure into the user-facing error.
///
/// Magic mismatches keep their own variant; everything else carries the
/// rendered detail.
pub(crate) fn from_parse(err: ParseError) -> SfsError {
    match err {
        ParseError::InvalidMagic { expected, actual } => {
            SfsError::InvalidMagic { expected, actual }
        }
        other => SfsError::Parse(other.to_string()),
    }
}

/// State owned for the lifetime of one mount.
struct Session {
    superblock: Superblock,
    table: InodeTable,
    tracker: FreeSpaceTracker,
}

/// A file system bound to a borrowed block device.
pub struct FileSystem<'d, D: BlockDevice + ?Sized> {
    device: &'d D,
    session: Option<Session>,
}

impl<'d, D: BlockDevice + ?Sized> FileSystem<'d, D> {
    /// Bind to a device in the `Unmounted` state.
    pub fn new(device: &'d D) -> Self {
        Self {
            device,
            session: None,
        }
    }

    /// Write a fresh volume onto the device: a superblock in block 0 and a
    /// zeroed inode table behind it.
    ///
    /// Pure data blocks are not touched — their content is meaningless
    /// until referenced by a valid inode.
    pub fn format(device: &D) -> Result<()> {
        if device.is_mounted() {
            return Err(SfsError::AlreadyMounted);
        }

        let superblock = Superblock::for_volume(device.block_count());
        superblock.validate().map_err(from_parse)?;

        device.write_block(BlockNumber(0), &superblock.encode())?;
        let empty_table_block = vec![0_u8; BLOCK_SIZE];
        for table_block in 1..=superblock.inode_table_blocks {
            device.write_block(BlockNumber(table_block), &empty_table_block)?;
        }
        device.sync()?;

        debug!(
            block_count = superblock.block_count,
            inode_table_blocks = superblock.inode_table_blocks,
            "formatted volume"
        );
        Ok(())
    }

    /// Mount the device: read and validate the superblock, then
    /// reconstruct the free-space state from the inode table.
    ///
    /// On any failure the file system stays `Unmounted` and owns nothing.
    pub fn mount(&mut self) -> Result<()> {
        if self.session.is_some() || self.device.is_mounted() {
            return Err(SfsError::AlreadyMounted);
        }

        let raw = self.device.read_block(BlockNumber(0))?;
        let mut superblock = Superblock::decode(&raw).map_err(from_parse)?;
        superblock.validate().map_err(from_parse)?;

        let (tracker, valid_inodes) =
            FreeSpaceTracker::rebuild(self.device, &superblock)?;
        // The persisted counter is informational; the scan just recounted.
        superblock.inodes_in_use = valid_inodes;

        let table = InodeTable::new(&superblock);
        self.device.set_mounted(true);
        self.session = Some(Session {
            superblock,
            table,
            tracker,
        });

        debug!(
            block_count = self.device.block_count(),
            inodes_in_use = valid_inodes,
            "mounted"
        );
        Ok(())
    }

    /// Release the mount: drop the free-space state and clear the device's
    /// mount claim. A no-op when already unmounted.
    pub fn unmount(&mut self) {
        if self.session.take().is_some() {
            self.device.set_mounted(false);
            debug!("unmounted");
        }
    }

    /// Whether this instance currently holds a mount.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    /// The cached superblock of the active mount.
    #[must_use]
    pub fn superblock(&self) -> Option<&Superblock> {
        self.session.as_ref().map(|session| &session.superblock)
    }

    /// The free-space state of the active mount.
    #[must_use]
    pub fn free_space(&self) -> Option<&FreeSpaceTracker> {
        self.session.as_ref().map(|session| &session.tracker)
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(SfsError::NotMounted)
    }

    /// Allocate the lowest-numbered free inode as an empty file.
    pub fn create(&mut self) -> Result<InodeNumber> {
        let device = self.device;
        let session = self.session.as_mut().ok_or(SfsError::NotMounted)?;

        if session.superblock.inodes_in_use >= session.superblock.inode_capacity() {
            return Err(SfsError::ResourceExhausted { resource: "inodes" });
        }
        let inode = session.tracker.find_first_free_inode()?;

        let record = Inode {
            valid: true,
            ..Inode::zeroed()
        };
        session.table.store(device, inode, &record)?;

        session.tracker.mark_inode_used(inode);
        session.superblock.inodes_in_use += 1;
        debug!(inode = inode.0, "created inode");
        Ok(inode)
    }

    /// Free an inode and every data block it references.
    pub fn remove(&mut self, inode: InodeNumber) -> Result<()> {
        let device = self.device;
        let session = self.session.as_mut().ok_or(SfsError::NotMounted)?;

        let record = session.table.load(device, inode)?;
        if !record.valid {
            return Err(SfsError::NotFound(inode.0));
        }

        // Gather everything to release before persisting anything, so a
        // failed read leaves tracker and disk untouched.
        let mut to_free: Vec<BlockNumber> = record
            .direct
            .iter()
            .filter(|pointer| **pointer != 0)
            .map(|pointer| BlockNumber(*pointer))
            .collect();
        if record.indirect != 0 {
            let raw = device.read_block(BlockNumber(record.indirect))?;
            let pointers = decode_pointer_block(&raw).map_err(from_parse)?;
            to_free.extend(
                pointers
                    .into_iter()
                    .filter(|pointer| *pointer != 0)
                    .map(BlockNumber),
            );
            to_free.push(BlockNumber(record.indirect));
        }

        session.table.store(device, inode, &Inode::zeroed())?;

        for block in &to_free {
            session.tracker.mark_block_free(*block);
        }
        session.tracker.mark_inode_free(inode);
        session.superblock.inodes_in_use =
            session.superblock.inodes_in_use.saturating_sub(1);
        debug!(
            inode = inode.0,
            freed_blocks = to_free.len(),
            "removed inode"
        );
        Ok(())
    }

    /// Length in bytes of the file held by `inode`.
    pub fn stat(&self, inode: InodeNumber) -> Result<u32> {
        let session = self.session()?;
        let record = session.table.load(self.device, inode)?;
        if !record.valid {
            return Err(SfsError::NotFound(inode.0));
        }
        Ok(record.size)
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// The effective length is clamped to the file size; a read at or past
    /// the end returns 0. A zero pointer inside the addressed range is a
    /// logical hole and stops the read short — only bytes actually backed
    /// by allocated blocks are returned.
    pub fn read(
        &self,
        inode: InodeNumber,
        buf: &mut [u8],
        offset: u32,
    ) -> Result<usize> {
        let session = self.session()?;
        let record = session.table.load(self.device, inode)?;
        if !record.valid {
            return Err(SfsError::NotFound(inode.0));
        }
        if offset >= record.size || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min((record.size - offset) as usize);

        let mut indirect_pointers: Option<Vec<u32>> = None;
        let mut copied = 0_usize;
        let mut pos = offset as usize;
        while copied < len {
            let index = pos / BLOCK_SIZE;
            let within = pos % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - within).min(len - copied);

            let pointer = if index < POINTERS_PER_INODE {
                record.direct[index]
            } else if index < POINTERS_PER_INODE + POINTERS_PER_BLOCK
                && record.indirect != 0
            {
                if indirect_pointers.is_none() {
                    let raw = self.device.read_block(BlockNumber(record.indirect))?;
                    indirect_pointers =
                        Some(decode_pointer_block(&raw).map_err(from_parse)?);
                }
                indirect_pointers
                    .as_ref()
                    .map_or(0, |pointers| pointers[index - POINTERS_PER_INODE])
            } else {
                0
            };

            if pointer == 0 {
                break;
            }

            let raw = self.device.read_block(BlockNumber(pointer))?;
            buf[copied..copied + chunk].copy_from_slice(&raw[within..within + chunk]);
            copied += chunk;
            pos += chunk;
        }

        Ok(copied)
    }

    /// Write `data` starting at `offset`, allocating blocks (and the
    /// indirect block, lazily) as needed.
    ///
    /// All block allocations and data writes happen before the inode
    /// record is persisted; on failure, provisionally taken blocks are
    /// returned to the tracker and nothing becomes visible.
    pub fn write(
        &mut self,
        inode: InodeNumber,
        data: &[u8],
        offset: u32,
    ) -> Result<usize> {
        let device = self.device;
        let session = self.session.as_mut().ok_or(SfsError::NotMounted)?;

        let mut allocated = Vec::new();
        match write_extent(device, &mut *session, inode, data, offset, &mut allocated) {
            Ok(written) => Ok(written),
            Err(err) => {
                for block in allocated {
                    session.tracker.mark_block_free(block);
                }
                Err(err)
            }
        }
    }
}

impl<D: BlockDevice + ?Sized> Drop for FileSystem<'_, D> {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Take the lowest free block out of the tracker, remembering it for
/// rollback.
fn allocate_block(
    session: &mut Session,
    allocated: &mut Vec<BlockNumber>,
) -> Result<BlockNumber> {
    let block = session.tracker.find_first_free_block()?;
    session.tracker.mark_block_used(block);
    allocated.push(block);
    trace!(block = block.0, "allocated data block");
    Ok(block)
}

fn write_extent<D: BlockDevice + ?Sized>(
    device: &D,
    session: &mut Session,
    inode: InodeNumber,
    data: &[u8],
    offset: u32,
    allocated: &mut Vec<BlockNumber>,
) -> Result<usize> {
    let mut record = session.table.load(device, inode)?;
    if !record.valid {
        return Err(SfsError::NotFound(inode.0));
    }

    let end = u64::from(offset) + data.len() as u64;
    if end > MAX_FILE_SIZE {
        return Err(SfsError::FileTooLarge {
            end,
            max: MAX_FILE_SIZE,
        });
    }
    if data.is_empty() {
        return Ok(0);
    }

    // Load the existing indirect block only when this write touches the
    // indirect range; otherwise start from a blank pointer array that the
    // lazy allocation below may populate.
    let touches_indirect = end > (POINTERS_PER_INODE * BLOCK_SIZE) as u64;
    let mut indirect_pointers = if record.indirect != 0 && touches_indirect {
        let raw = device.read_block(BlockNumber(record.indirect))?;
        decode_pointer_block(&raw).map_err(from_parse)?
    } else {
        vec![0_u32; POINTERS_PER_BLOCK]
    };
    let mut indirect_dirty = false;

    let mut written = 0_usize;
    let mut pos = offset as usize;
    while written < data.len() {
        let index = pos / BLOCK_SIZE;
        let within = pos % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - within).min(data.len() - written);

        if index >= POINTERS_PER_INODE && record.indirect == 0 {
            // First write past the direct range: reserve the indirect
            // block and persist it zeroed before populating any slot.
            let block = allocate_block(session, allocated)?;
            device.write_block(block, &vec![0_u8; BLOCK_SIZE])?;
            record.indirect = block.0;
        }

        let slot = if index < POINTERS_PER_INODE {
            &mut record.direct[index]
        } else {
            &mut indirect_pointers[index - POINTERS_PER_INODE]
        };

        let mut fresh = false;
        if *slot == 0 {
            let block = allocate_block(session, allocated)?;
            *slot = block.0;
            fresh = true;
            if index >= POINTERS_PER_INODE {
                indirect_dirty = true;
            }
        }
        let target = BlockNumber(*slot);

        // Freshly allocated blocks start zeroed so a later size extension
        // never exposes stale bytes; partial writes into existing blocks
        // are read-modify-write.
        let mut block_buf = if chunk == BLOCK_SIZE || fresh {
            vec![0_u8; BLOCK_SIZE]
        } else {
            device.read_block(target)?
        };
        block_buf[within..within + chunk].copy_from_slice(&data[written..written + chunk]);
        device.write_block(target, &block_buf)?;

        written += chunk;
        pos += chunk;
    }

    if indirect_dirty {
        let encoded = encode_pointer_block(&indirect_pointers).map_err(from_parse)?;
        device.write_block(BlockNumber(record.indirect), &encoded)?;
    }

    // end <= MAX_FILE_SIZE, so the narrowing cannot lose bits.
    let new_size = u32::try_from(end).map_err(|_| SfsError::FileTooLarge {
        end,
        max: MAX_FILE_SIZE,
    })?;
    record.size = record.size.max(new_size);
    session.table.store(device, inode, &record)?;

    trace!(
        inode = inode.0,
        written,
        offset,
        size = record.size,
        "wrote extent"
    );
    Ok(written)
}
