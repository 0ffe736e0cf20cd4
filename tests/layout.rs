// Layout conformance tests for the receiver-facing ABI.
// These tests assert sizes, alignments and field offsets of MessageData and
// the region offsets inside a message slice. They also print the observed
// values to aid debugging when a mismatch occurs on a given platform.
use dmxp_bus::Bus::Msg::layout::{align8, fds_offset, handles_offset, slice_size, FD_SIZE, HANDLE_ID_SIZE};
use dmxp_bus::Bus::Structs::MessageData;
use memoffset::offset_of;
use std::mem::{align_of, size_of};

#[test]
fn test_message_data_layout() {
    let raw = 8 + 4 + 4 + 4 + 4 + 8 + 8 + 8 + 8; // 56 bytes of fields

    let size = size_of::<MessageData>();
    let align = align_of::<MessageData>();
    let off_destination = offset_of!(MessageData, destination);
    let off_uid = offset_of!(MessageData, uid);
    let off_gid = offset_of!(MessageData, gid);
    let off_pid = offset_of!(MessageData, pid);
    let off_tid = offset_of!(MessageData, tid);
    let off_offset = offset_of!(MessageData, offset);
    let off_n_bytes = offset_of!(MessageData, n_bytes);
    let off_n_handles = offset_of!(MessageData, n_handles);
    let off_n_fds = offset_of!(MessageData, n_fds);

    println!(
        "MessageData => size: {size}, expected: {raw}, align: {align}, offsets: [destination:{off_destination}, uid:{off_uid}, gid:{off_gid}, pid:{off_pid}, tid:{off_tid}, offset:{off_offset}, n_bytes:{off_n_bytes}, n_handles:{off_n_handles}, n_fds:{off_n_fds}]"
    );

    assert_eq!(size, raw);
    assert_eq!(align, align_of::<u64>());
    assert_eq!(off_destination, 0);
    assert_eq!(off_uid, 8);
    assert_eq!(off_gid, 12);
    assert_eq!(off_pid, 16);
    assert_eq!(off_tid, 20);
    assert_eq!(off_offset, 24);
    assert_eq!(off_n_bytes, 32);
    assert_eq!(off_n_handles, 40);
    assert_eq!(off_n_fds, 48);
}

#[test]
fn test_slice_regions() {
    assert_eq!(HANDLE_ID_SIZE, 8);
    assert_eq!(FD_SIZE, 4);

    assert_eq!(align8(0), 0);
    assert_eq!(align8(1), 8);
    assert_eq!(align8(8), 8);
    assert_eq!(align8(13), 16);

    // 16 payload bytes, 1 handle, 2 fds
    assert_eq!(handles_offset(16), 16);
    assert_eq!(fds_offset(16, 1), 24);
    assert_eq!(slice_size(16, 1, 2), Some(32));

    // Odd sizes: every region still starts 8-aligned
    assert_eq!(handles_offset(5), 8);
    assert_eq!(fds_offset(5, 3), 32);
    assert_eq!(slice_size(5, 3, 3), Some(48));

    assert_eq!(slice_size(0, 0, 0), Some(0));
}

#[test]
fn test_regions_are_aligned_for_any_counts() {
    for _ in 0..1000 {
        let n_bytes = fastrand::usize(0..10_000);
        let n_handles = fastrand::usize(0..300);
        let n_fds = fastrand::usize(0..300);

        let h = handles_offset(n_bytes);
        let f = fds_offset(n_bytes, n_handles);
        let s = slice_size(n_bytes, n_handles, n_fds).unwrap();

        assert_eq!(h % 8, 0);
        assert_eq!(f % 8, 0);
        assert_eq!(s % 8, 0);
        assert!(h >= n_bytes);
        assert!(f >= h + n_handles * HANDLE_ID_SIZE);
        assert!(s >= f + n_fds * FD_SIZE);
    }
}

#[test]
fn test_slice_size_overflow_is_none() {
    assert_eq!(slice_size(usize::MAX, 0, 0), None);
    assert_eq!(slice_size(usize::MAX - 6, 0, 0), None);
    assert_eq!(slice_size(0, usize::MAX / 4, 0), None);
    assert_eq!(slice_size(0, 0, usize::MAX / 2), None);
    assert_eq!(slice_size(usize::MAX - 7, 1, 0), None);

    // Largest payload that still rounds up inside usize
    assert_eq!(slice_size(usize::MAX - 7, 0, 0), Some(usize::MAX - 7));
}
