use super::*;
use crate::Core::SharedMemory::RawHandle;

/// Getter methods for Pool
///
/// These methods expose pool occupancy for the delivery layer, debugging and
/// tests. None of them mutate the pool.
impl Pool {
    /// Total size of the backing region in bytes
    pub fn size(&self) -> usize {
        self.shm.size()
    }

    /// Bytes currently held by live slices (kernel or user referenced)
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Bytes not held by any slice
    ///
    /// Free space may be fragmented; a successful `alloc` of this size is not
    /// guaranteed.
    pub fn available(&self) -> usize {
        self.shm.size().saturating_sub(self.allocated)
    }

    /// Number of live slices
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    /// Whether the slice at `offset` has been published to the receiver
    pub fn is_published(&self, offset: usize) -> bool {
        self.slices.get(&offset).map_or(false, |s| s.ref_user)
    }

    /// Handle of the backing region, for receivers that map the pool
    pub fn raw_handle(&self) -> RawHandle {
        self.shm.raw_handle()
    }

    pub(crate) fn backend(&self) -> &dyn SharedMemoryBackend {
        &*self.shm
    }
}
