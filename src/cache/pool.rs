//! Append-only byte pool for cached output lines.
//! Bump allocation in a `typed_arena`: copies are never freed or moved, and
//! the whole pool is released only when its owner drops it.

use std::cell::Cell;

use typed_arena::Arena;

/// Arena of cached line bytes. Owned by the pipeline, written only by the
/// output pump; the returned slices live as long as the pool.
pub struct Pool {
    bytes: Arena<u8>,
    allocated: Cell<usize>,
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            bytes: Arena::new(),
            allocated: Cell::new(0),
        }
    }
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `bytes` into pool storage. The copy outlives the call.
    pub fn allocate_and_copy(&self, bytes: &[u8]) -> &[u8] {
        self.allocated.set(self.allocated.get() + bytes.len());
        self.bytes.alloc_extend(bytes.iter().copied())
    }

    /// Total payload bytes copied in so far.
    pub fn bytes_allocated(&self) -> usize {
        self.allocated.get()
    }
}
