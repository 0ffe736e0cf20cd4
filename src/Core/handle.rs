// Capability handles carried by in-flight messages

use crate::error::{Error, Result};
use std::sync::Arc;

/// Id written for a handle slot the transaction layer never filled.
pub const HANDLE_INVALID: u64 = u64::MAX;

/// Number of handle slots stored inline in every batch.
pub const HANDLE_BATCH_INLINE: usize = 16;

/// Number of handle slots per overflow block.
pub const HANDLE_BATCH_SIZE: usize = 1024;

/// A transferable reference to a bus-level object.
///
/// `id` is the identifier the destination peer knows the object by.
#[derive(Debug, PartialEq, Eq)]
pub struct Handle {
    id: u64,
}

impl Handle {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self { id })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

type HandleSlot = Option<Arc<Handle>>;

/// Handles owned by one message between creation and installation.
///
/// The first `HANDLE_BATCH_INLINE` slots live inline; larger batches spill
/// into overflow blocks of `HANDLE_BATCH_SIZE` slots. [`HandleInflight::walk`]
/// hides that split from the installer.
pub struct HandleInflight {
    n_handles: usize,
    inline: [HandleSlot; HANDLE_BATCH_INLINE],
    overflow: Vec<Box<[HandleSlot]>>,
}

impl HandleInflight {
    /// Pre-allocate room for exactly `n_handles` handles.
    pub fn new(n_handles: usize) -> Result<Self> {
        let mut remaining = n_handles.saturating_sub(HANDLE_BATCH_INLINE);
        let n_blocks = remaining.div_ceil(HANDLE_BATCH_SIZE);

        let mut overflow = Vec::new();
        overflow
            .try_reserve_exact(n_blocks)
            .map_err(|_| Error::OutOfMemory)?;

        while remaining > 0 {
            let len = remaining.min(HANDLE_BATCH_SIZE);
            let mut block: Vec<HandleSlot> = Vec::new();
            block.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
            block.resize_with(len, || None);
            overflow.push(block.into_boxed_slice());
            remaining -= len;
        }

        Ok(Self {
            n_handles,
            inline: Default::default(),
            overflow,
        })
    }

    pub fn len(&self) -> usize {
        self.n_handles
    }

    pub fn is_empty(&self) -> bool {
        self.n_handles == 0
    }

    /// Attach `handle` to slot `index`. Each slot is filled at most once.
    pub fn set(&mut self, index: usize, handle: Arc<Handle>) -> Result<()> {
        let len = self.n_handles;
        let slot = self
            .slot_mut(index)
            .ok_or(Error::InvalidSlot { index, len })?;

        if slot.is_some() {
            return Err(Error::SlotInUse(index));
        }
        *slot = Some(handle);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Handle>> {
        if index >= self.n_handles {
            return None;
        }
        if index < HANDLE_BATCH_INLINE {
            return self.inline[index].as_ref();
        }
        let idx = index - HANDLE_BATCH_INLINE;
        self.overflow[idx / HANDLE_BATCH_SIZE][idx % HANDLE_BATCH_SIZE].as_ref()
    }

    fn slot_mut(&mut self, index: usize) -> Option<&mut HandleSlot> {
        if index >= self.n_handles {
            return None;
        }
        if index < HANDLE_BATCH_INLINE {
            return Some(&mut self.inline[index]);
        }
        let idx = index - HANDLE_BATCH_INLINE;
        Some(&mut self.overflow[idx / HANDLE_BATCH_SIZE][idx % HANDLE_BATCH_SIZE])
    }

    /// Produce the next chunk of resolved ids.
    ///
    /// Clears `ids`, fills it with the ids of the block containing `*pos`
    /// starting at `*pos`, advances `*pos` past them and returns how many were
    /// produced. Zero means the batch is exhausted.
    pub fn walk(&self, pos: &mut usize, ids: &mut Vec<u64>) -> usize {
        ids.clear();
        if *pos >= self.n_handles {
            return 0;
        }

        let chunk: &[HandleSlot] = if *pos < HANDLE_BATCH_INLINE {
            let end = self.n_handles.min(HANDLE_BATCH_INLINE);
            &self.inline[*pos..end]
        } else {
            let idx = *pos - HANDLE_BATCH_INLINE;
            &self.overflow[idx / HANDLE_BATCH_SIZE][idx % HANDLE_BATCH_SIZE..]
        };

        ids.extend(
            chunk
                .iter()
                .map(|slot| slot.as_ref().map_or(HANDLE_INVALID, |h| h.id())),
        );
        *pos += chunk.len();
        chunk.len()
    }

    /// Release every handle reference held by the batch. Safe to call twice.
    pub fn destroy(&mut self) {
        for slot in self.inline.iter_mut() {
            *slot = None;
        }
        for block in self.overflow.iter_mut() {
            for slot in block.iter_mut() {
                *slot = None;
            }
        }
    }
}
