use crate::error::{Error, Result};
use crate::Core::SharedMemory::{HeapMemory, SharedMemoryBackend};
use std::collections::BTreeMap;
use std::io;
use std::io::IoSlice;
mod debug;
mod getters;

/// Every slice starts and ends on this boundary so receivers can use
/// aligned fixed-width reads.
pub const POOL_SLICE_ALIGN: usize = 8;

/// A contiguous, offset-addressed region allocated from a [`Pool`].
///
/// Not `Clone`: handing it back to
/// [`Pool::release_kernel`] consumes it, so a slice cannot be released twice.
pub struct PoolSlice {
    offset: usize,
    size: usize,
}

impl PoolSlice {
    /// Byte offset of the slice from the start of the pool.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the slice in bytes (always a multiple of `POOL_SLICE_ALIGN`).
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Bookkeeping for one live slice.
///
/// The kernel reference is held by the message that allocated the slice, the
/// user reference by the receiver once the slice was published. Space is
/// reclaimed when both are gone.
struct SliceState {
    size: usize,
    ref_kernel: bool,
    ref_user: bool,
}

/// Peer-owned byte arena from which message slices are carved.
///
/// All mutation goes through `&mut self`; callers reach the pool only through
/// the owning peer's lock.
pub struct Pool {
    shm: Box<dyn SharedMemoryBackend>,
    slices: BTreeMap<usize, SliceState>,
    allocated: usize,
}

impl Pool {
    pub fn new(shm: Box<dyn SharedMemoryBackend>) -> Self {
        Self {
            shm,
            slices: BTreeMap::new(),
            allocated: 0,
        }
    }

    /// Pool backed by zeroed process heap memory.
    pub fn with_heap(size: usize) -> io::Result<Self> {
        Ok(Self::new(Box::new(HeapMemory::new(size)?)))
    }

    /// Allocate a slice of at least `size` bytes, first fit.
    ///
    /// A zero-sized request still occupies one alignment unit so every live
    /// slice has a distinct offset.
    pub fn alloc(&mut self, size: usize) -> Result<PoolSlice> {
        let size = match size
            .max(1)
            .checked_add(POOL_SLICE_ALIGN - 1)
            .map(|s| s & !(POOL_SLICE_ALIGN - 1))
        {
            Some(size) if size <= self.shm.size() => size,
            _ => return Err(Error::PoolExhausted),
        };

        let mut cursor = 0usize;
        let mut found = None;
        for (&offset, state) in &self.slices {
            if offset - cursor >= size {
                found = Some(cursor);
                break;
            }
            cursor = offset + state.size;
        }

        let offset = match found {
            Some(offset) => offset,
            None if self.shm.size() - cursor >= size => cursor,
            None => return Err(Error::PoolExhausted),
        };

        self.slices.insert(
            offset,
            SliceState {
                size,
                ref_kernel: true,
                ref_user: false,
            },
        );
        self.allocated += size;

        Ok(PoolSlice { offset, size })
    }

    /// Drop the kernel reference of `slice`. The space is reclaimed right away
    /// unless the slice was published and the receiver still holds it.
    pub fn release_kernel(&mut self, slice: PoolSlice) {
        let reclaim = match self.slices.get_mut(&slice.offset) {
            Some(state) => {
                state.ref_kernel = false;
                !state.ref_user
            }
            None => {
                log::error!("release of unknown pool slice at offset {}", slice.offset);
                false
            }
        };

        if reclaim {
            self.reclaim(slice.offset);
        }
    }

    /// Hand `slice` to the receiver: it stays allocated until
    /// [`Pool::release_user`] is called for its offset.
    pub fn publish(&mut self, slice: &PoolSlice) {
        if let Some(state) = self.slices.get_mut(&slice.offset) {
            state.ref_user = true;
        }
    }

    /// Drop the receiver reference on the slice at `offset`.
    pub fn release_user(&mut self, offset: usize) -> Result<()> {
        let reclaim = match self.slices.get_mut(&offset) {
            Some(state) if state.ref_user => {
                state.ref_user = false;
                !state.ref_kernel
            }
            _ => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no published slice at offset {offset}"),
                )))
            }
        };

        if reclaim {
            self.reclaim(offset);
        }
        Ok(())
    }

    /// Scatter-write `bufs` into `slice`, starting `offset` bytes into it.
    pub fn write_kvec(&mut self, slice: &PoolSlice, offset: usize, bufs: &[IoSlice<'_>]) -> Result<()> {
        let total: usize = bufs.iter().map(|b| b.len()).sum();

        if !self.slices.contains_key(&slice.offset) {
            return Err(Error::WriteFailure(io::Error::new(
                io::ErrorKind::NotFound,
                format!("slice at offset {} is not allocated", slice.offset),
            )));
        }

        match offset.checked_add(total) {
            Some(end) if end <= slice.size => {}
            _ => {
                return Err(Error::WriteFailure(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "write of {total} bytes at {offset} overruns slice of {} bytes",
                        slice.size
                    ),
                )))
            }
        }

        self.shm
            .write_at(slice.offset + offset, bufs)
            .map_err(Error::WriteFailure)
    }

    /// Read `len` bytes at absolute pool `offset`, the way a receiver that
    /// mapped the pool would.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
        buf.resize(len, 0);
        self.shm.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    fn reclaim(&mut self, offset: usize) {
        if let Some(state) = self.slices.remove(&offset) {
            self.allocated -= state.size;
        }
    }
}
