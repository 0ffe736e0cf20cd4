use std::fmt;
use crate::Bus::Msg::Message;
use crate::Bus::PeerInfo;
use crate::Core::alloc::{Pool, PoolSlice};

/// Debug function for Pool
///
/// Shows occupancy and the backing region without dumping its contents:
/// - Region base address and size
/// - Bytes held by live slices
/// - Number of live slices
pub fn debug_pool(pool: &Pool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pool")
        .field("shm", &format_args!("{:p}", pool.backend().as_ptr()))
        .field("handle", &pool.raw_handle())
        .field("size", &pool.size())
        .field("allocated", &pool.allocated())
        .field("slices", &pool.slice_count())
        .finish()
}

/// Debug function for PoolSlice
pub fn debug_pool_slice(slice: &PoolSlice, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PoolSlice")
        .field("offset", &slice.offset())
        .field("size", &slice.size())
        .finish()
}

/// Debug function for Message
///
/// Shows:
/// - Header fields
/// - Whether the message is bound, and where
/// - How many file slots are populated
pub fn debug_message(message: &Message, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let files = (0..message.n_fds())
        .filter(|&i| message.file(i).is_some())
        .count();

    f.debug_struct("Message")
        .field("data", message.data())
        .field("silent", &message.is_silent())
        .field("queued", &message.queue_node().is_linked())
        .field("slice", &message.slice())
        .field("uid", &message.accounted_user().map(|u| u.uid()))
        .field("handles", &message.handles().len())
        .field("files", &format_args!("{}/{}", files, message.n_fds()))
        .finish_non_exhaustive()
}

/// Debug function for PeerInfo
pub fn debug_peer_info(info: &PeerInfo, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PeerInfo")
        .field("id", &info.id())
        .field("pool", info.pool())
        .field("quota_users", &info.quota().user_count())
        .field("open_fds", &info.fd_table().open_count())
        .finish()
}
