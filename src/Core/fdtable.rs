// Descriptor table of a receiving process

use crate::error::{Error, Result};
use libc::c_int;
use parking_lot::Mutex;
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Owned reference to an open file. Cloning takes another reference.
pub type FileRef = Arc<File>;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

enum FdSlot {
    Free,
    Reserved { cloexec: bool },
    Installed { file: FileRef, cloexec: bool },
}

/// A descriptor number reserved in one [`FdTable`] but not yet bound to a file.
///
/// The token is consumed either by [`FdTable::install`] or by
/// [`FdTable::put_unused`]; dropping it leaks the reservation until the table
/// itself goes away.
#[must_use = "a reserved descriptor must be installed or put back"]
#[derive(Debug)]
pub struct ReservedFd {
    fd: c_int,
    table: u64,
}

impl ReservedFd {
    pub fn fd(&self) -> c_int {
        self.fd
    }
}

struct FdTableInner {
    slots: Vec<FdSlot>,
    max_fds: usize,
}

/// Descriptor table of the process a peer delivers into.
///
/// Descriptor numbers are handed out lowest-free-first, like a POSIX process
/// table, and are bounded by `max_fds` (the process's open-file limit).
pub struct FdTable {
    id: u64,
    inner: Mutex<FdTableInner>,
}

impl FdTable {
    pub fn new(max_fds: usize) -> Self {
        Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(FdTableInner {
                slots: Vec::new(),
                max_fds,
            }),
        }
    }

    /// Reserve the lowest unused descriptor number.
    ///
    /// `flags` accepts `libc::O_CLOEXEC`; other bits are ignored.
    pub fn reserve_unused(&self, flags: c_int) -> Result<ReservedFd> {
        let cloexec = flags & libc::O_CLOEXEC != 0;
        let mut inner = self.inner.lock();

        let index = match inner.slots.iter().position(|s| matches!(s, FdSlot::Free)) {
            Some(index) => index,
            None if inner.slots.len() < inner.max_fds => {
                inner.slots.push(FdSlot::Free);
                inner.slots.len() - 1
            }
            None => return Err(Error::ResourceExhausted),
        };

        let fd = c_int::try_from(index).map_err(|_| Error::ResourceExhausted)?;
        inner.slots[index] = FdSlot::Reserved { cloexec };

        Ok(ReservedFd { fd, table: self.id })
    }

    /// Give back a reservation that was never bound to a file.
    pub fn put_unused(&self, fd: ReservedFd) {
        let mut inner = self.inner.lock();
        match self.reserved_slot(&mut inner, &fd) {
            Some(slot) => *slot = FdSlot::Free,
            None => log::error!("put_unused of descriptor {} not reserved here", fd.fd),
        }
    }

    /// Bind a reserved descriptor to `file`.
    ///
    /// Cannot fail: the slot was set aside by `reserve_unused` and the token
    /// proves nobody else has used it since.
    pub fn install(&self, fd: ReservedFd, file: FileRef) {
        let mut inner = self.inner.lock();
        match self.reserved_slot(&mut inner, &fd) {
            Some(slot) => {
                let cloexec = matches!(slot, FdSlot::Reserved { cloexec: true });
                *slot = FdSlot::Installed { file, cloexec };
            }
            None => {
                log::error!("install into descriptor {} not reserved here", fd.fd);
                debug_assert!(false, "ReservedFd used with a foreign table");
            }
        }
    }

    fn reserved_slot<'a>(&self, inner: &'a mut FdTableInner, fd: &ReservedFd) -> Option<&'a mut FdSlot> {
        if fd.table != self.id {
            return None;
        }
        let slot = inner.slots.get_mut(usize::try_from(fd.fd).ok()?)?;
        if matches!(slot, FdSlot::Reserved { .. }) {
            Some(slot)
        } else {
            None
        }
    }

    /// Close an installed descriptor, returning the file reference it held.
    pub fn close(&self, fd: c_int) -> Option<FileRef> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(usize::try_from(fd).ok()?)?;
        match std::mem::replace(slot, FdSlot::Free) {
            FdSlot::Installed { file, .. } => Some(file),
            other => {
                *slot = other;
                None
            }
        }
    }

    pub fn get(&self, fd: c_int) -> Option<FileRef> {
        let inner = self.inner.lock();
        match inner.slots.get(usize::try_from(fd).ok()?)? {
            FdSlot::Installed { file, .. } => Some(Arc::clone(file)),
            _ => None,
        }
    }

    pub fn is_cloexec(&self, fd: c_int) -> bool {
        let inner = self.inner.lock();
        let Ok(index) = usize::try_from(fd) else {
            return false;
        };
        matches!(
            inner.slots.get(index),
            Some(FdSlot::Installed { cloexec: true, .. }) | Some(FdSlot::Reserved { cloexec: true })
        )
    }

    /// Number of descriptors bound to a file
    pub fn open_count(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .filter(|s| matches!(s, FdSlot::Installed { .. }))
            .count()
    }

    /// Number of descriptors reserved but not yet bound
    pub fn reserved_count(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .filter(|s| matches!(s, FdSlot::Reserved { .. }))
            .count()
    }

    pub fn max_fds(&self) -> usize {
        self.inner.lock().max_fds
    }
}
