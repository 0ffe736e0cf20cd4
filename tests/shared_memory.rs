// Pool backend tests: heap regions everywhere, memfd regions on Linux
// Run with: cargo test --test shared_memory -- --nocapture

use dmxp_bus::Core::{HeapMemory, RawHandle, SharedMemoryBackend};
use std::io::IoSlice;

#[test]
fn test_heap_memory_is_zeroed() {
    let heap = HeapMemory::new(4096).unwrap();
    assert_eq!(heap.size(), 4096);
    assert_eq!(heap.raw_handle(), RawHandle::Heap);

    let mut buf = vec![0xffu8; 4096];
    heap.read_at(0, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn test_heap_memory_scatter_write() {
    let mut heap = HeapMemory::new(64).unwrap();

    let parts = [b"dmxp".as_slice(), b"-".as_slice(), b"bus".as_slice()];
    let bufs: Vec<IoSlice<'_>> = parts.iter().map(|p| IoSlice::new(p)).collect();
    heap.write_at(10, &bufs).unwrap();

    let mut out = [0u8; 8];
    heap.read_at(10, &mut out).unwrap();
    assert_eq!(&out, b"dmxp-bus");
}

#[test]
fn test_heap_memory_bounds() {
    let mut heap = HeapMemory::new(16).unwrap();

    assert!(heap.write_at(12, &[IoSlice::new(&[1, 2, 3, 4])]).is_ok());
    assert!(heap.write_at(13, &[IoSlice::new(&[1, 2, 3, 4])]).is_err());
    assert!(heap.write_at(usize::MAX, &[IoSlice::new(&[1])]).is_err());

    let mut out = [0u8; 17];
    assert!(heap.read_at(0, &mut out).is_err());
    assert!(heap.read_at(16, &mut [0u8; 0]).is_ok());
}

#[cfg(target_os = "linux")]
mod linux_tests {
    use dmxp_bus::Bus::PeerBuilder;
    use dmxp_bus::Core::{create_shared_memory, RawHandle, SharedMemoryBackend};
    use std::io::IoSlice;

    #[test]
    fn test_create_shared_memory() {
        let size = 4096;
        let shm = create_shared_memory(size, Some("test_create")).unwrap();

        assert_eq!(shm.size(), size);
        assert!(!shm.as_ptr().is_null());
        assert!(matches!(shm.raw_handle(), RawHandle::Fd(fd) if fd >= 0));
    }

    #[test]
    fn test_shared_memory_sizes() {
        for size in [1024, 4096, 65536, 1024 * 1024] {
            let shm = create_shared_memory(size, None).unwrap();
            assert_eq!(shm.size(), size);
        }
    }

    #[test]
    fn test_zero_size_is_rejected() {
        assert!(create_shared_memory(0, None).is_err());
    }

    #[test]
    fn test_shared_memory_read_write() {
        let size = 8192;
        let mut shm = create_shared_memory(size, Some("test_rw")).unwrap();

        let pattern: Vec<u8> = (0..100).map(|i| (i % 256) as u8).collect();
        shm.write_at(size - 100, &[IoSlice::new(&pattern)]).unwrap();

        let mut out = vec![0u8; 100];
        shm.read_at(size - 100, &mut out).unwrap();
        assert_eq!(out, pattern);
    }

    #[test]
    fn test_peer_pool_backed_by_memfd() {
        let peer = PeerBuilder::new()
            .with_id(7)
            .with_pool_size(64 * 1024)
            .with_shared_memory(true)
            .build()
            .unwrap();

        let info = peer.lock();
        println!("Peer info: {:#?}", *info);
        assert_eq!(info.pool().size(), 64 * 1024);
        assert!(matches!(info.pool().raw_handle(), RawHandle::Fd(_)));
    }
}
