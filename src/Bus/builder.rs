use super::peer::{Peer, PeerInfo};
use crate::Core::alloc::Pool;
use crate::Core::fdtable::FdTable;
use crate::Core::SharedMemory::create_shared_memory;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_POOL_SIZE: usize = 4 * 1024 * 1024; // 4MB
pub const DEFAULT_MAX_FDS: usize = 1024;

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

pub struct PeerBuilder {
    id: u64,
    pool_size: usize,
    max_fds: usize,
    shared_memory: bool,
    fd_table: Option<Arc<FdTable>>,
}

impl Default for PeerBuilder {
    fn default() -> Self {
        Self {
            id: NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed),
            pool_size: DEFAULT_POOL_SIZE,
            max_fds: DEFAULT_MAX_FDS,
            shared_memory: false,
            fd_table: None,
        }
    }
}

impl PeerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the id drawn from the process-wide counter. The caller is
    /// then responsible for keeping ids of live peers distinct.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Open-file limit of the fresh descriptor table. Ignored when a table is
    /// supplied with [`PeerBuilder::with_fd_table`].
    pub fn with_max_fds(mut self, max_fds: usize) -> Self {
        self.max_fds = max_fds;
        self
    }

    /// Back the pool with a memfd the receiver can map instead of heap memory.
    pub fn with_shared_memory(mut self, enabled: bool) -> Self {
        self.shared_memory = enabled;
        self
    }

    /// Deliver descriptors into an existing process table, shared with other peers.
    pub fn with_fd_table(mut self, table: Arc<FdTable>) -> Self {
        self.fd_table = Some(table);
        self
    }

    pub fn build_info(self) -> std::io::Result<PeerInfo> {
        let pool = if self.shared_memory {
            let name = format!("dmxp_peer_{}", self.id);
            Pool::new(create_shared_memory(self.pool_size, Some(&name))?)
        } else {
            Pool::with_heap(self.pool_size)?
        };

        let fd_table = self
            .fd_table
            .unwrap_or_else(|| Arc::new(FdTable::new(self.max_fds)));

        Ok(PeerInfo::new(self.id, pool, fd_table))
    }

    pub fn build(self) -> std::io::Result<Arc<Peer>> {
        Ok(Peer::new(self.build_info()?))
    }
}
