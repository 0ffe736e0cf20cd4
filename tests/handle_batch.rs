// Handle inflight batch tests

use dmxp_bus::Core::handle::{
    Handle, HandleInflight, HANDLE_BATCH_INLINE, HANDLE_BATCH_SIZE, HANDLE_INVALID,
};
use dmxp_bus::Error;
use std::sync::Arc;

fn collect_chunks(batch: &HandleInflight) -> Vec<Vec<u64>> {
    let mut pos = 0;
    let mut ids = Vec::new();
    let mut chunks = Vec::new();
    while batch.walk(&mut pos, &mut ids) > 0 {
        chunks.push(ids.clone());
    }
    chunks
}

#[test]
fn test_empty_batch_walks_nothing() {
    let batch = HandleInflight::new(0).unwrap();
    assert!(batch.is_empty());
    assert!(collect_chunks(&batch).is_empty());
}

#[test]
fn test_inline_only_batch_is_one_chunk() {
    let mut batch = HandleInflight::new(4).unwrap();
    batch.set(0, Handle::new(10)).unwrap();
    batch.set(3, Handle::new(13)).unwrap();

    let chunks = collect_chunks(&batch);
    assert_eq!(chunks, vec![vec![10, HANDLE_INVALID, HANDLE_INVALID, 13]]);
}

#[test]
fn test_overflow_chunks_follow_block_boundaries() {
    let n = HANDLE_BATCH_INLINE + HANDLE_BATCH_SIZE + 3;
    let mut batch = HandleInflight::new(n).unwrap();
    for i in 0..n {
        batch.set(i, Handle::new(i as u64)).unwrap();
    }

    let chunks = collect_chunks(&batch);
    let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
    assert_eq!(lens, vec![HANDLE_BATCH_INLINE, HANDLE_BATCH_SIZE, 3]);

    let flat: Vec<u64> = chunks.into_iter().flatten().collect();
    assert_eq!(flat, (0..n as u64).collect::<Vec<_>>());
}

#[test]
fn test_walk_resumes_mid_block() {
    let mut batch = HandleInflight::new(HANDLE_BATCH_INLINE + 4).unwrap();
    for i in 0..batch.len() {
        batch.set(i, Handle::new(100 + i as u64)).unwrap();
    }

    let mut pos = HANDLE_BATCH_INLINE + 2;
    let mut ids = Vec::new();
    assert_eq!(batch.walk(&mut pos, &mut ids), 2);
    assert_eq!(ids, vec![100 + HANDLE_BATCH_INLINE as u64 + 2, 100 + HANDLE_BATCH_INLINE as u64 + 3]);
    assert_eq!(batch.walk(&mut pos, &mut ids), 0);
    assert!(ids.is_empty());
}

#[test]
fn test_slots_fill_once_and_are_bounded() {
    let mut batch = HandleInflight::new(HANDLE_BATCH_INLINE + 1).unwrap();
    let last = HANDLE_BATCH_INLINE;

    batch.set(last, Handle::new(1)).unwrap();
    assert!(matches!(batch.set(last, Handle::new(2)), Err(Error::SlotInUse(i)) if i == last));
    assert!(matches!(
        batch.set(last + 1, Handle::new(3)),
        Err(Error::InvalidSlot { .. })
    ));
    assert_eq!(batch.get(last).map(|h| h.id()), Some(1));
    assert!(batch.get(0).is_none());
}

#[test]
fn test_destroy_releases_references() {
    let handle = Handle::new(5);
    let mut batch = HandleInflight::new(HANDLE_BATCH_INLINE + 10).unwrap();
    batch.set(1, Arc::clone(&handle)).unwrap();
    batch.set(HANDLE_BATCH_INLINE + 9, Arc::clone(&handle)).unwrap();
    assert_eq!(Arc::strong_count(&handle), 3);

    batch.destroy();
    assert_eq!(Arc::strong_count(&handle), 1);
    batch.destroy();
    assert_eq!(Arc::strong_count(&handle), 1);
}
