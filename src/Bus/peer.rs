// Destination peers: the lock that serializes pool and quota access

use crate::Core::alloc::Pool;
use crate::Core::fdtable::FdTable;
use crate::Core::quota::PeerQuota;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// Everything of a peer that is protected by its lock.
///
/// Holding `&mut PeerInfo` is proof that the peer lock is held: the only way
/// to get one for a shared peer is through [`Peer::lock`].
pub struct PeerInfo {
    id: u64,
    pub(crate) pool: Pool,
    pub(crate) quota: PeerQuota,
    fd_table: Arc<FdTable>,
}

impl PeerInfo {
    /// `fd_table` is the descriptor table of the process this peer delivers into.
    pub fn new(id: u64, pool: Pool, fd_table: Arc<FdTable>) -> Self {
        Self {
            id,
            pool,
            quota: PeerQuota::new(),
            fd_table,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    pub fn quota(&self) -> &PeerQuota {
        &self.quota
    }

    pub fn fd_table(&self) -> &Arc<FdTable> {
        &self.fd_table
    }
}

/// An endpoint of the bus.
pub struct Peer {
    id: u64,
    info: Mutex<PeerInfo>,
}

impl Peer {
    pub fn new(info: PeerInfo) -> Arc<Self> {
        Arc::new(Self {
            id: info.id,
            info: Mutex::new(info),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take the peer lock. Bind and unbind run under it.
    pub fn lock(&self) -> MutexGuard<'_, PeerInfo> {
        self.info.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, PeerInfo>> {
        self.info.try_lock()
    }
}

impl fmt::Debug for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_peer_info(self, f)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("locked", &self.info.is_locked())
            .finish()
    }
}
