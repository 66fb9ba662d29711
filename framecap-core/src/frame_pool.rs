//! Bounded pool of 32-byte aligned pixel buffers
//!
//! Buffers go back to the pool when the last holder drops them. The free
//! list keeps at most `max_cached` buffers; anything beyond that is freed.
//! Fresh memory comes from a [`FrameAllocator`], the system heap unless the
//! session installs its own.

use crate::error::{CaptureError, CaptureResult};
use framecap_convert::SIMD_ALIGNMENT;
use parking_lot::{Mutex, RwLock};
use std::alloc::{alloc, dealloc, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Backing memory for frame buffers.
///
/// Layouts handed to `allocate` always have a non-zero size that is a
/// multiple of 32 and an alignment of 32.
///
/// # Safety
///
/// `allocate` must return memory that is valid for `layout.size()` bytes,
/// aligned to `layout.align()`, and not used by anything else until it is
/// passed back to `deallocate`.
pub unsafe trait FrameAllocator: Send + Sync {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// # Safety
    ///
    /// `ptr` was returned by `allocate` on this allocator with the same `layout`.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Global heap
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

unsafe impl FrameAllocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has a non-zero size
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        dealloc(ptr.as_ptr(), layout)
    }
}

/// Round up to a whole number of alignment units, never zero
fn round_size(size: usize) -> usize {
    size.max(1).div_ceil(SIMD_ALIGNMENT) * SIMD_ALIGNMENT
}

fn same_allocator(a: &Arc<dyn FrameAllocator>, b: &Arc<dyn FrameAllocator>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Owned aligned allocation, freed through the allocator that made it
struct RawBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    allocator: Arc<dyn FrameAllocator>,
}

// The allocation is uniquely owned; access goes through &/&mut of the owner.
unsafe impl Send for RawBuffer {}
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    fn allocate(size: usize, allocator: Arc<dyn FrameAllocator>) -> CaptureResult<Self> {
        let layout = Layout::from_size_align(round_size(size), SIMD_ALIGNMENT)
            .map_err(|_| CaptureError::MemoryAllocationFailed(size))?;
        let ptr = allocator
            .allocate(layout)
            .ok_or(CaptureError::MemoryAllocationFailed(size))?;
        if ptr.as_ptr() as usize % SIMD_ALIGNMENT != 0 {
            // SAFETY: just returned by this allocator for this layout
            unsafe { allocator.deallocate(ptr, layout) };
            return Err(CaptureError::MemoryAllocationFailed(size));
        }
        // SAFETY: valid for layout.size() bytes and exclusively ours
        unsafe { ptr.as_ptr().write_bytes(0, layout.size()) };
        Ok(RawBuffer { ptr, layout, allocator })
    }

    fn capacity(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` by this allocator with this layout
        unsafe { self.allocator.deallocate(self.ptr, self.layout) }
    }
}

struct PoolShared {
    free: Mutex<Vec<RawBuffer>>,
    allocator: RwLock<Arc<dyn FrameAllocator>>,
    max_cached: AtomicUsize,
    allocations: AtomicU64,
    reuses: AtomicU64,
}

impl PoolShared {
    fn recycle(&self, buffer: RawBuffer) {
        let mut free = self.free.lock();
        let current = same_allocator(&buffer.allocator, &self.allocator.read());
        if current && free.len() < self.max_cached.load(Ordering::Relaxed) {
            free.push(buffer);
        }
        // else dropped here, outside the pool
    }
}

/// Pool of aligned buffers shared by the producer and every frame holder
#[derive(Clone)]
pub struct FramePool {
    shared: Arc<PoolShared>,
}

impl FramePool {
    pub fn new(max_cached: usize) -> Self {
        FramePool {
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::with_capacity(max_cached)),
                allocator: RwLock::new(Arc::new(SystemAllocator)),
                max_cached: AtomicUsize::new(max_cached),
                allocations: AtomicU64::new(0),
                reuses: AtomicU64::new(0),
            }),
        }
    }

    /// Get a buffer of at least `size` bytes, reusing a cached one when its
    /// capacity is between `size` and twice `size`.
    ///
    /// Reused buffers keep their previous contents.
    pub fn acquire(&self, size: usize) -> CaptureResult<PooledBuffer> {
        let wanted = round_size(size);
        let reused = {
            let mut free = self.shared.free.lock();
            let best = free
                .iter()
                .enumerate()
                .filter(|(_, buf)| buf.capacity() >= wanted && buf.capacity() <= wanted * 2)
                .min_by_key(|(_, buf)| buf.capacity())
                .map(|(index, _)| index);
            best.map(|index| free.swap_remove(index))
        };

        let raw = match reused {
            Some(raw) => {
                self.shared.reuses.fetch_add(1, Ordering::Relaxed);
                raw
            }
            None => {
                let allocator = self.shared.allocator.read().clone();
                let raw = RawBuffer::allocate(size, allocator)?;
                self.shared.allocations.fetch_add(1, Ordering::Relaxed);
                raw
            }
        };

        Ok(PooledBuffer {
            raw: Some(raw),
            len: size,
            pool: Arc::downgrade(&self.shared),
        })
    }

    /// Change the free-list bound, freeing cached buffers above it
    pub fn set_max_cached(&self, max_cached: usize) {
        self.shared.max_cached.store(max_cached, Ordering::Relaxed);
        let evicted: Vec<RawBuffer> = {
            let mut free = self.shared.free.lock();
            let keep = free.len().min(max_cached);
            free.drain(keep..).collect()
        };
        drop(evicted);
    }

    /// Take fresh memory from `allocator` from now on.
    ///
    /// Cached buffers are freed; buffers still held by frames go back to the
    /// allocator that made them when they are dropped.
    pub fn set_allocator(&self, allocator: Arc<dyn FrameAllocator>) {
        *self.shared.allocator.write() = allocator;
        self.clear();
        log::debug!("frame pool allocator replaced");
    }

    /// Drop every cached buffer
    pub fn clear(&self) {
        let evicted = std::mem::take(&mut *self.shared.free.lock());
        drop(evicted);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            cached: self.shared.free.lock().len(),
            max_cached: self.shared.max_cached.load(Ordering::Relaxed),
            allocations: self.shared.allocations.load(Ordering::Relaxed),
            reuses: self.shared.reuses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub cached: usize,
    pub max_cached: usize,
    pub allocations: u64,
    pub reuses: u64,
}

/// Buffer on loan from a [`FramePool`]; dereferences to exactly the requested length
pub struct PooledBuffer {
    raw: Option<RawBuffer>,
    len: usize,
    pool: Weak<PoolShared>,
}

impl PooledBuffer {
    /// Allocated size, at least `len()` and a multiple of 32
    pub fn capacity(&self) -> usize {
        self.raw.as_ref().map_or(0, RawBuffer::capacity)
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.raw {
            // SAFETY: the allocation holds at least `len` initialized bytes
            Some(raw) => unsafe { std::slice::from_raw_parts(raw.ptr.as_ptr(), self.len) },
            None => &[],
        }
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.raw {
            // SAFETY: as above, and `&mut self` guarantees exclusive access
            Some(raw) => unsafe { std::slice::from_raw_parts_mut(raw.ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let (Some(raw), Some(pool)) = (self.raw.take(), self.pool.upgrade()) {
            pool.recycle(raw);
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
