// Byte layout of a message slice as the receiver parses it:
//
//   [payload, n_bytes][pad to 8][handle ids, n_handles x u64][pad to 8][fd numbers, n_fds x i32][pad to 8]
//
// Every region starts on an 8-byte boundary relative to the slice start.

use std::mem::size_of;

/// Width of one handle id in the slice.
pub const HANDLE_ID_SIZE: usize = size_of::<u64>();

/// Width of one descriptor number in the slice.
pub const FD_SIZE: usize = size_of::<libc::c_int>();

#[inline]
pub const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

#[inline]
const fn checked_align8(n: usize) -> Option<usize> {
    match n.checked_add(7) {
        Some(n) => Some(n & !7),
        None => None,
    }
}

/// Offset of the handle-id region.
///
/// Like [`fds_offset`], only meaningful for counts whose [`slice_size`] is
/// `Some`, which holds for every bound message.
#[inline]
pub const fn handles_offset(n_bytes: usize) -> usize {
    align8(n_bytes)
}

/// Offset of the descriptor-number region.
#[inline]
pub const fn fds_offset(n_bytes: usize, n_handles: usize) -> usize {
    align8(n_bytes) + align8(n_handles * HANDLE_ID_SIZE)
}

/// Size of the slice a message with these counts needs, or `None` if it
/// does not fit in `usize`.
#[inline]
pub const fn slice_size(n_bytes: usize, n_handles: usize, n_fds: usize) -> Option<usize> {
    let Some(payload) = checked_align8(n_bytes) else {
        return None;
    };
    let Some(handles) = n_handles.checked_mul(HANDLE_ID_SIZE) else {
        return None;
    };
    let Some(handles) = checked_align8(handles) else {
        return None;
    };
    let Some(fds) = n_fds.checked_mul(FD_SIZE) else {
        return None;
    };
    let Some(fds) = checked_align8(fds) else {
        return None;
    };
    match payload.checked_add(handles) {
        Some(head) => head.checked_add(fds),
        None => None,
    }
}
