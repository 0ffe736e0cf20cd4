// The message entity and its create/destroy lifecycle

use crate::error::{Error, Result};
use crate::Bus::Structs::Message_Structs::{MessageData, QueueNode, QueueNodeKind, TransactionLink};
use crate::Core::alloc::PoolSlice;
use crate::Core::fdtable::FileRef;
use crate::Core::handle::HandleInflight;
use crate::Core::quota::User;
use std::fmt;
use std::sync::Arc;

/// A message's claim on a destination peer: the user charged for it and the
/// pool slice it was given. One value, so neither can exist without the other.
pub struct Binding {
    pub(crate) user: Arc<User>,
    pub(crate) slice: PoolSlice,
    pub(crate) peer: u64,
}

impl Binding {
    /// Id of the peer whose pool holds the slice.
    pub fn peer(&self) -> u64 {
        self.peer
    }

    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    pub fn slice(&self) -> &PoolSlice {
        &self.slice
    }
}

/// The unit of transfer between peers.
///
/// Byte, handle and descriptor counts are fixed at creation; the transaction
/// layer may under-fill but never grow them. Exactly one owner holds a
/// message at a time, and hands it on by value.
pub struct Message {
    pub(crate) qnode: QueueNode,
    pub(crate) data: MessageData,
    pub(crate) transaction: TransactionLink,
    pub(crate) binding: Option<Binding>,
    pub(crate) handles: HandleInflight,
    pub(crate) files: Box<[Option<FileRef>]>,
}

impl Message {
    /// Allocate a new, unbound message.
    ///
    /// Storage for `n_files` file references and `n_handles` handles is
    /// reserved up front. Fails only with [`Error::OutOfMemory`].
    pub fn new(n_bytes: usize, n_files: usize, n_handles: usize, silent: bool) -> Result<Self> {
        let mut files: Vec<Option<FileRef>> = Vec::new();
        files
            .try_reserve_exact(n_files)
            .map_err(|_| Error::OutOfMemory)?;
        files.resize_with(n_files, || None);

        let handles = HandleInflight::new(n_handles)?;

        let kind = if silent {
            QueueNodeKind::MessageSilent
        } else {
            QueueNodeKind::MessageNormal
        };

        Ok(Self {
            qnode: QueueNode::new(kind),
            data: MessageData::new(n_bytes, n_handles, n_files),
            transaction: TransactionLink::default(),
            binding: None,
            handles,
            files: files.into_boxed_slice(),
        })
    }

    /// Destroy the message.
    ///
    /// The caller must have unlinked it from any queue, cleared its transaction
    /// links and undone its binding. Held files and handles are released here.
    pub fn free(self) {
        drop(self)
    }

    pub fn data(&self) -> &MessageData {
        &self.data
    }

    pub fn n_bytes(&self) -> usize {
        self.data.n_bytes as usize
    }

    pub fn n_handles(&self) -> usize {
        self.data.n_handles as usize
    }

    pub fn n_fds(&self) -> usize {
        self.data.n_fds as usize
    }

    pub fn is_silent(&self) -> bool {
        self.qnode.kind() == QueueNodeKind::MessageSilent
    }

    pub fn set_destination(&mut self, destination: u64) {
        self.data.destination = destination;
    }

    pub fn set_credentials(&mut self, uid: u32, gid: u32, pid: u32, tid: u32) {
        self.data.uid = uid;
        self.data.gid = gid;
        self.data.pid = pid;
        self.data.tid = tid;
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn accounted_user(&self) -> Option<&Arc<User>> {
        self.binding.as_ref().map(|b| &b.user)
    }

    pub fn slice(&self) -> Option<&PoolSlice> {
        self.binding.as_ref().map(|b| &b.slice)
    }

    /// Store `file` in descriptor slot `index`. Each slot is filled at most once.
    pub fn set_file(&mut self, index: usize, file: FileRef) -> Result<()> {
        let len = self.files.len();
        let slot = self
            .files
            .get_mut(index)
            .ok_or(Error::InvalidSlot { index, len })?;

        if slot.is_some() {
            return Err(Error::SlotInUse(index));
        }
        *slot = Some(file);
        Ok(())
    }

    pub fn file(&self, index: usize) -> Option<&FileRef> {
        self.files.get(index)?.as_ref()
    }

    pub fn handles(&self) -> &HandleInflight {
        &self.handles
    }

    pub fn handles_mut(&mut self) -> &mut HandleInflight {
        &mut self.handles
    }

    pub fn queue_node(&self) -> &QueueNode {
        &self.qnode
    }

    pub fn queue_node_mut(&mut self) -> &mut QueueNode {
        &mut self.qnode
    }

    pub fn transaction(&self) -> &TransactionLink {
        &self.transaction
    }

    pub fn transaction_mut(&mut self) -> &mut TransactionLink {
        &mut self.transaction
    }

    /// Report every lifecycle rule broken by freeing the message now.
    fn check_released(&self) -> bool {
        let mut clean = true;

        if let Some(binding) = &self.binding {
            log::error!(
                "message freed while bound: slice at {} charged to uid {} is leaked",
                binding.slice.offset(),
                binding.user.uid()
            );
            clean = false;
        }
        if self.transaction.raw_peer.is_some() {
            log::error!("message freed with a live transaction peer link");
            clean = false;
        }
        if self.transaction.handle.is_some() {
            log::error!("message freed with a live transaction handle link");
            clean = false;
        }
        if self.transaction.next.is_some() {
            log::error!("message freed while still chained to a transaction batch");
            clean = false;
        }
        if self.qnode.is_linked() {
            log::error!("message freed while linked into a delivery queue");
            clean = false;
        }

        clean
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        let clean = self.check_released();
        if !std::thread::panicking() {
            debug_assert!(clean, "message freed in violation of its lifecycle");
        }

        for file in self.files.iter_mut() {
            file.take();
        }
        self.handles.destroy();
        self.qnode.unlink();
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_message(self, f)
    }
}
