//! Fixed-slot buffer pools used to hand encoded frames from the encoder
//! callback thread to stream writer threads without allocating on the
//! hot path.
//!
//! [`HierarchyPool`] splits its slots across two capacities (a small
//! "default" cell and a larger "max" cell used for keyframes), mirroring
//! the two-tier buffer strategy video sources commonly use to avoid
//! sizing every slot for the worst case.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::buffer::FrameBuffer;
use crate::error::RtspError;

/// A fixed-slot pool of `FrameBuffer<CAP>` cells.
///
/// Slot ownership is tracked with a per-slot `AtomicBool` rather than a
/// mutex: a slot's contents may only be accessed through the
/// [`PoolHandle`] returned by a successful [`acquire`](Self::acquire),
/// and a handle is the unique owner of its slot until it is dropped (or
/// [`release`](PoolHandle::release) is called explicitly), so the usual
/// aliasing rules hold despite the interior mutability.
pub struct MemoryPool<const CAP: usize> {
    cells: Box<[UnsafeCell<FrameBuffer<CAP>>]>,
    in_use: Box<[AtomicBool]>,
}

// SAFETY: access to `cells[i]` is gated by a successful CAS on `in_use[i]`,
// which hands out exclusive access until the corresponding `PoolHandle`
// is dropped.
unsafe impl<const CAP: usize> Sync for MemoryPool<CAP> {}

impl<const CAP: usize> MemoryPool<CAP> {
    /// Builds a pool with `slot_count` cells, each of capacity `CAP` bytes.
    pub fn new(slot_count: usize) -> Arc<Self> {
        Arc::new(Self {
            cells: (0..slot_count)
                .map(|_| UnsafeCell::new(FrameBuffer::new()))
                .collect(),
            in_use: (0..slot_count).map(|_| AtomicBool::new(false)).collect(),
        })
    }

    /// Number of slots in the pool.
    pub fn slot_count(&self) -> usize {
        self.cells.len()
    }

    /// Claims a free slot able to hold `size` bytes, or `None` if every
    /// slot is in use or `size` exceeds `CAP`.
    pub fn acquire(self: &Arc<Self>, size: usize) -> Option<PoolHandle<CAP>> {
        if size > CAP {
            return None;
        }
        for (index, flag) in self.in_use.iter().enumerate() {
            if flag
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Some(PoolHandle {
                    pool: Arc::clone(self),
                    index,
                    released: false,
                });
            }
        }
        None
    }

    fn release(&self, index: usize) {
        self.in_use[index].store(false, Ordering::Release);
    }
}

/// An exclusive handle to one slot of a [`MemoryPool`].
///
/// Dereferences to a `FrameBuffer<CAP>`. The slot is returned to the
/// pool when the handle is dropped.
pub struct PoolHandle<const CAP: usize> {
    pool: Arc<MemoryPool<CAP>>,
    index: usize,
    released: bool,
}

impl<const CAP: usize> PoolHandle<CAP> {
    /// Returns the slot to the pool early. Equivalent to dropping the
    /// handle, provided for call sites that want to be explicit about
    /// lifetime.
    pub fn release(mut self) {
        self.pool.release(self.index);
        self.released = true;
    }
}

impl<const CAP: usize> Deref for PoolHandle<CAP> {
    type Target = FrameBuffer<CAP>;

    fn deref(&self) -> &Self::Target {
        // SAFETY: see `MemoryPool`'s Sync justification; this handle is
        // the unique owner of `index` until dropped.
        unsafe { &*self.pool.cells[self.index].get() }
    }
}

impl<const CAP: usize> DerefMut for PoolHandle<CAP> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.pool.cells[self.index].get() }
    }
}

impl<const CAP: usize> Drop for PoolHandle<CAP> {
    fn drop(&mut self) {
        if !self.released {
            self.pool.release(self.index);
        }
    }
}

/// Either tier of a [`HierarchyPool`].
///
/// The variant is tracked privately so callers don't need to remember
/// which sub-pool a given frame came from; every access goes through
/// the uniform `Deref`/`DerefMut` to `FrameBuffer<M>`.
pub enum PoolCell<const D: usize, const M: usize> {
    Default(PoolHandle<D>),
    Max(PoolHandle<M>),
}

impl<const D: usize, const M: usize> PoolCell<D, M> {
    /// The occupied bytes of the underlying frame, regardless of tier.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Default(h) => h.as_slice(),
            Self::Max(h) => h.as_slice(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Default(h) => h.size,
            Self::Max(h) => h.size,
        }
    }

    pub fn presentation_time_us(&self) -> i64 {
        match self {
            Self::Default(h) => h.presentation_time_us,
            Self::Max(h) => h.presentation_time_us,
        }
    }

    pub fn flags(&self) -> u32 {
        match self {
            Self::Default(h) => h.flags,
            Self::Max(h) => h.flags,
        }
    }

    pub fn is_key_frame(&self) -> bool {
        match self {
            Self::Default(h) => h.is_key_frame(),
            Self::Max(h) => h.is_key_frame(),
        }
    }

    /// Writes `size` bytes and metadata into the cell.
    pub fn fill(&mut self, data: &[u8], presentation_time_us: i64, flags: u32) {
        assert!(data.len() <= self.capacity());
        match self {
            Self::Default(h) => {
                h.as_full_slice_mut()[..data.len()].copy_from_slice(data);
                h.size = data.len();
                h.presentation_time_us = presentation_time_us;
                h.flags = flags;
            }
            Self::Max(h) => {
                h.as_full_slice_mut()[..data.len()].copy_from_slice(data);
                h.size = data.len();
                h.presentation_time_us = presentation_time_us;
                h.flags = flags;
            }
        }
    }

    fn capacity(&self) -> usize {
        match self {
            Self::Default(_) => D,
            Self::Max(_) => M,
        }
    }
}

/// A two-tier pool: most frames are small and come from an 80%-of-total
/// "default" pool of `D`-byte cells, while the remaining 20% of slots
/// are reserved as `M`-byte cells for oversized frames (keyframes).
pub struct HierarchyPool<const D: usize, const M: usize> {
    default_pool: Arc<MemoryPool<D>>,
    max_pool: Arc<MemoryPool<M>>,
}

impl<const D: usize, const M: usize> HierarchyPool<D, M> {
    /// Builds a pool with `total_slots` cells split 80/20 between the
    /// default and max tiers.
    pub fn new(total_slots: usize) -> Self {
        let default_slots = total_slots * 80 / 100;
        let max_slots = total_slots - default_slots;
        Self {
            default_pool: MemoryPool::new(default_slots),
            max_pool: MemoryPool::new(max_slots),
        }
    }

    /// Claims a cell able to hold `size` bytes: the default tier is
    /// tried first when `size` fits, falling back to the max tier.
    pub fn acquire(&self, size: usize) -> Result<PoolCell<D, M>, RtspError> {
        if size <= D {
            if let Some(handle) = self.default_pool.acquire(size) {
                return Ok(PoolCell::Default(handle));
            }
        }
        if size <= M {
            if let Some(handle) = self.max_pool.acquire(size) {
                return Ok(PoolCell::Max(handle));
            }
        }
        Err(RtspError::PoolExhausted { requested: size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_round_trips() {
        let pool: Arc<MemoryPool<64>> = MemoryPool::new(2);
        let h1 = pool.acquire(10).expect("slot available");
        let h2 = pool.acquire(10).expect("slot available");
        assert!(pool.acquire(10).is_none());
        drop(h1);
        assert!(pool.acquire(10).is_some());
        drop(h2);
    }

    #[test]
    fn acquire_rejects_oversized_request() {
        let pool: Arc<MemoryPool<16>> = MemoryPool::new(1);
        assert!(pool.acquire(32).is_none());
    }

    #[test]
    fn hierarchy_pool_splits_80_20() {
        let pool: HierarchyPool<16, 256> = HierarchyPool::new(10);
        assert_eq!(pool.default_pool.slot_count(), 8);
        assert_eq!(pool.max_pool.slot_count(), 2);
    }

    #[test]
    fn hierarchy_pool_routes_by_size_then_falls_back() {
        let pool: HierarchyPool<16, 256> = HierarchyPool::new(10);
        let small = pool.acquire(8).expect("fits default tier");
        assert!(matches!(small, PoolCell::Default(_)));

        let large = pool.acquire(200).expect("fits max tier");
        assert!(matches!(large, PoolCell::Max(_)));
    }

    #[test]
    fn hierarchy_pool_exhaustion_is_reported() {
        let pool: HierarchyPool<16, 16> = HierarchyPool::new(1);
        assert!(pool.acquire(4096).is_err());
    }
}
