use std::io::IoSlice;
use std::sync::Arc;

use super::layout;
use super::Msg::{Binding, Message};
use crate::error::{Error, Result};
use crate::Bus::peer::PeerInfo;
use crate::Core::alloc::PoolSlice;
use crate::Core::fdtable::{FileRef, ReservedFd};
use crate::Core::handle::{HANDLE_BATCH_INLINE, HANDLE_BATCH_SIZE};
use crate::Core::quota::User;

impl Message {
    /// Allocate a pool slice on `peer` and charge `user` for everything the
    /// message carries.
    ///
    /// Must be called with the peer lock held, which `&mut PeerInfo` proves.
    /// On any error the quota ledger and the pool are left exactly as they
    /// were and the message stays unbound. Binding a bound message is a caller
    /// bug: it panics in debug builds and returns [`Error::AlreadyBound`]
    /// otherwise.
    pub fn bind_locked(&mut self, peer: &mut PeerInfo, user: &Arc<User>) -> Result<()> {
        if let Some(binding) = &self.binding {
            log::error!(
                "bind of message already bound to peer {} at offset {}",
                binding.peer,
                binding.slice.offset()
            );
            debug_assert!(false, "message already bound");
            return Err(Error::AlreadyBound);
        }

        let (n_bytes, n_handles, n_fds) = (self.n_bytes(), self.n_handles(), self.n_fds());

        if let Err(e) = peer.quota.charge(user, n_bytes, n_handles, n_fds) {
            log::warn!(
                "peer {}: quota of uid {} exhausted ({n_bytes} bytes, {n_handles} handles, {n_fds} fds)",
                peer.id(),
                user.uid()
            );
            return Err(e);
        }

        let Some(size) = layout::slice_size(n_bytes, n_handles, n_fds) else {
            peer.quota.discharge(user, n_bytes, n_handles, n_fds);
            log::warn!(
                "peer {}: slice for {n_bytes} bytes, {n_handles} handles, {n_fds} fds overflows",
                peer.id()
            );
            return Err(Error::PoolExhausted);
        };
        let slice = match peer.pool.alloc(size) {
            Ok(slice) => slice,
            Err(e) => {
                peer.quota.discharge(user, n_bytes, n_handles, n_fds);
                log::warn!(
                    "peer {}: pool cannot fit {size} bytes ({} available)",
                    peer.id(),
                    peer.pool.available()
                );
                return Err(e);
            }
        };

        log::debug!(
            "peer {}: bound {size} byte slice at {} for uid {}",
            peer.id(),
            slice.offset(),
            user.uid()
        );

        self.data.offset = slice.offset() as u64;
        self.binding = Some(Binding {
            user: Arc::clone(user),
            slice,
            peer: peer.id(),
        });
        Ok(())
    }

    /// Release the slice and refund the quota taken by [`Message::bind_locked`].
    ///
    /// No-op on an unbound message. Must be called with the lock of the same
    /// peer the message was bound on.
    pub fn unbind_locked(&mut self, peer: &mut PeerInfo) {
        let Some(binding) = self.binding.take() else {
            return;
        };

        if binding.peer != peer.id() {
            log::error!(
                "unbind on peer {} of a message bound on peer {}",
                peer.id(),
                binding.peer
            );
            debug_assert!(false, "message unbound on the wrong peer");
            self.binding = Some(binding);
            return;
        }

        let Binding { user, slice, .. } = binding;
        peer.quota
            .discharge(&user, self.n_bytes(), self.n_handles(), self.n_fds());

        log::debug!(
            "peer {}: unbound slice at {} for uid {}",
            peer.id(),
            slice.offset(),
            user.uid()
        );
        peer.pool.release_kernel(slice);
    }

    /// The bound slice, provided `peer` is the peer it was allocated from.
    ///
    /// Offsets are only meaningful in the pool that handed them out, so every
    /// write into the slice goes through here first.
    fn slice_on(&self, peer: &PeerInfo) -> Result<&PoolSlice> {
        let binding = self.binding.as_ref().ok_or(Error::NotBound)?;
        if binding.peer != peer.id() {
            log::error!(
                "access on peer {} to a slice bound on peer {}",
                peer.id(),
                binding.peer
            );
            debug_assert!(false, "message used on the wrong peer");
            return Err(Error::WrongPeer {
                bound: binding.peer,
                given: peer.id(),
            });
        }
        Ok(&binding.slice)
    }

    /// Make the bound slice visible to the receiver, so it stays allocated
    /// after [`Message::unbind_locked`] until the receiver releases it.
    pub fn publish_locked(&self, peer: &mut PeerInfo) -> Result<()> {
        let slice = self.slice_on(peer)?;
        peer.pool.publish(slice);
        Ok(())
    }

    /// Write the ids of all carried handles into the handle region of the slice.
    ///
    /// A failed write is returned as is; the message stays bound and the
    /// caller decides whether to retry or abandon it.
    pub fn install_handles(&self, peer: &mut PeerInfo) -> Result<()> {
        let slice = self.slice_on(peer)?;
        let mut offset = layout::handles_offset(self.n_bytes());

        let chunk_max = self
            .n_handles()
            .min(HANDLE_BATCH_INLINE.max(HANDLE_BATCH_SIZE));
        let mut ids: Vec<u64> = Vec::new();
        let mut buf: Vec<u8> = Vec::new();
        ids.try_reserve_exact(chunk_max)
            .map_err(|_| Error::OutOfMemory)?;
        buf.try_reserve_exact(chunk_max * layout::HANDLE_ID_SIZE)
            .map_err(|_| Error::OutOfMemory)?;

        let mut pos = 0;
        loop {
            let n = self.handles.walk(&mut pos, &mut ids);
            if n == 0 {
                break;
            }

            buf.clear();
            buf.extend(ids.iter().flat_map(|id| id.to_ne_bytes()));

            if let Err(e) = peer.pool.write_kvec(slice, offset, &[IoSlice::new(&buf)]) {
                log::warn!("peer {}: writing {n} handle ids failed: {e}", peer.id());
                return Err(e);
            }
            offset += n * layout::HANDLE_ID_SIZE;
        }

        Ok(())
    }

    /// Install every carried file into the receiving process and write the
    /// new descriptor numbers into the descriptor region of the slice.
    ///
    /// Either all `n_fds` descriptors end up open in the receiver, or none:
    /// reservations are undone on any error, and the final binding step runs
    /// only after everything that can fail has succeeded.
    pub fn install_fds(&self, peer: &mut PeerInfo) -> Result<()> {
        let n_fds = self.n_fds();
        let slice = self.slice_on(peer)?;

        let files: Vec<&FileRef> = self
            .files
            .iter()
            .enumerate()
            .map(|(i, f)| f.as_ref().ok_or(Error::MissingFile(i)))
            .collect::<Result<_>>()?;

        let mut reserved: Vec<ReservedFd> = Vec::new();
        let mut buf: Vec<u8> = Vec::new();
        reserved
            .try_reserve_exact(n_fds)
            .map_err(|_| Error::OutOfMemory)?;
        buf.try_reserve_exact(n_fds * layout::FD_SIZE)
            .map_err(|_| Error::OutOfMemory)?;

        let table = Arc::clone(peer.fd_table());

        for _ in 0..n_fds {
            match table.reserve_unused(libc::O_CLOEXEC) {
                Ok(fd) => {
                    buf.extend_from_slice(&fd.fd().to_ne_bytes());
                    reserved.push(fd);
                }
                Err(e) => {
                    log::warn!(
                        "peer {}: descriptor table exhausted after {} of {n_fds} fds",
                        peer.id(),
                        reserved.len()
                    );
                    for fd in reserved {
                        table.put_unused(fd);
                    }
                    return Err(e);
                }
            }
        }

        let offset = layout::fds_offset(self.n_bytes(), self.n_handles());
        if let Err(e) = peer.pool.write_kvec(slice, offset, &[IoSlice::new(&buf)]) {
            log::warn!("peer {}: writing {n_fds} fd numbers failed: {e}", peer.id());
            for fd in reserved {
                table.put_unused(fd);
            }
            return Err(e);
        }

        // Descriptor numbers are published now; nothing below may fail.
        for (fd, file) in reserved.into_iter().zip(files) {
            table.install(fd, Arc::clone(file));
        }

        log::debug!("peer {}: installed {n_fds} fds", peer.id());
        Ok(())
    }
}
