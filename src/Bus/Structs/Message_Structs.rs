// Header, queue linkage and transaction linkage embedded in every message

use crate::Bus::Msg::Message;
use crate::Bus::Peer;
use crate::Core::handle::Handle;
use std::sync::Arc;

/// Sentinel for `MessageData::offset` while no slice is bound.
pub const OFFSET_INVALID: u64 = u64::MAX;

/// Credential value meaning "not set" (the `-1` id).
pub const ID_INVALID: u32 = u32::MAX;

/// Framing fields handed to the receiver next to the pool slice.
/// ABI-stable across languages; all fields are native-endian.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MessageData {
    pub destination: u64,
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    pub tid: u32,
    pub offset: u64,
    pub n_bytes: u64,
    pub n_handles: u64,
    pub n_fds: u64,
}

impl MessageData {
    pub(crate) fn new(n_bytes: usize, n_handles: usize, n_fds: usize) -> Self {
        Self {
            destination: 0,
            uid: ID_INVALID,
            gid: ID_INVALID,
            pid: 0,
            tid: 0,
            offset: OFFSET_INVALID,
            n_bytes: n_bytes as u64,
            n_handles: n_handles as u64,
            n_fds: n_fds as u64,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueNodeKind {
    MessageNormal,
    /// Accounted and delivered, but never wakes a waiting receiver.
    MessageSilent,
}

/// Linkage into a destination peer's delivery queue.
///
/// The queue subsystem owns ordering; the message only records its kind,
/// its timestamp and whether it is currently linked.
#[derive(Debug)]
pub struct QueueNode {
    kind: QueueNodeKind,
    timestamp: u64,
    linked: bool,
}

impl QueueNode {
    pub(crate) fn new(kind: QueueNodeKind) -> Self {
        Self {
            kind,
            timestamp: 0,
            linked: false,
        }
    }

    pub fn kind(&self) -> QueueNodeKind {
        self.kind
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Mark the node as queued on a destination at `timestamp`.
    pub fn link(&mut self, timestamp: u64) {
        debug_assert!(!self.linked, "queue node linked twice");
        self.timestamp = timestamp;
        self.linked = true;
    }

    pub fn unlink(&mut self) {
        self.linked = false;
    }
}

/// Pointers used only while a message travels through a transaction commit.
///
/// All three must be empty before the message is freed.
#[derive(Default)]
pub struct TransactionLink {
    /// Next message of the same transaction batch
    pub next: Option<Box<Message>>,
    /// Destination handle the message was matched against
    pub handle: Option<Arc<Handle>>,
    /// Destination peer, for lock-free identity comparisons
    pub raw_peer: Option<Arc<Peer>>,
}

impl TransactionLink {
    pub fn is_empty(&self) -> bool {
        self.next.is_none() && self.handle.is_none() && self.raw_peer.is_none()
    }

    /// Whether `peer` is the destination recorded for this transaction,
    /// compared by identity without taking the peer lock.
    pub fn targets(&self, peer: &Arc<Peer>) -> bool {
        self.raw_peer
            .as_ref()
            .map_or(false, |p| Arc::ptr_eq(p, peer))
    }

    /// Drop the handle and peer links and detach the rest of the batch,
    /// which the caller now owns.
    pub fn clear(&mut self) -> Option<Box<Message>> {
        self.handle = None;
        self.raw_peer = None;
        self.next.take()
    }
}
