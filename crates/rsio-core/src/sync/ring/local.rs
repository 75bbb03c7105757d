use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU8;
#[cfg(not(loom))]
use std::sync::atomic::AtomicUsize;

use crossbeam_utils::CachePadded;
#[cfg(loom)]
use loom::sync::atomic::AtomicUsize;

use super::INDEX_MASK;

struct Header {
    capacity: usize,
    read_state: CachePadded<AtomicUsize>,
    write_state: CachePadded<AtomicUsize>,
    refcount: AtomicU8,
}

/// Ring buffer storage: a header followed by `capacity` initialized slots, in one allocation.
pub struct LocalBuffer<T> {
    inner: NonNull<Header>,
    marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for LocalBuffer<T> {}
unsafe impl<T: Send> Sync for LocalBuffer<T> {}

impl<T: Copy> LocalBuffer<T> {
    pub fn new(capacity: usize, fill: T) -> LocalBuffer<T> {
        assert!(capacity > 0 && capacity <= INDEX_MASK && capacity.is_power_of_two());

        let layout = Self::layout(capacity);

        // SAFETY: size cannot be zero because we're storing at least `Header`.
        let ptr = unsafe { std::alloc::alloc(layout) as *mut Header };

        let Some(inner) = NonNull::new(ptr) else {
            std::alloc::handle_alloc_error(layout);
        };

        let header = Header {
            capacity,
            read_state: CachePadded::new(AtomicUsize::new(0)),
            write_state: CachePadded::new(AtomicUsize::new(0)),
            refcount: AtomicU8::new(2),
        };

        // SAFETY: pointer is valid, because we've just allocated it and checked the result.
        unsafe { std::ptr::write(inner.as_ptr(), header) };

        let buffer: LocalBuffer<T> = LocalBuffer {
            inner,
            marker: PhantomData,
        };

        // Slots are handed out as `&mut [T]` regions, so every one of them must be initialized.
        for i in 0..capacity {
            // SAFETY: `i < capacity`, the allocation holds `capacity` slots after the header.
            unsafe { buffer.data_ptr().add(i).write(fill) };
        }

        buffer
    }
}

impl<T> LocalBuffer<T> {
    fn header(&self) -> &Header {
        // SAFETY: pointer is valid until self is dropped
        unsafe { self.inner.as_ref() }
    }

    fn offset() -> usize {
        Layout::new::<Header>()
            .extend(Layout::new::<T>())
            .expect("header layout overflow")
            .1
    }

    fn layout(capacity: usize) -> Layout {
        Layout::new::<Header>()
            .extend(Layout::array::<T>(capacity).expect("ring buffer too large"))
            .expect("ring buffer too large")
            .0
    }

    /// Pointer to the first of `capacity` initialized slots.
    pub fn data_ptr(&self) -> *mut T {
        let offset = Self::offset();
        // SAFETY: after adding `offset`, pointer is still in bounds (since capacity is > 0)
        // and properly aligned (enforced by `Layout::extend`).
        unsafe { (self.inner.as_ptr() as *mut u8).add(offset) as *mut T }
    }

    /// Always a power of two in `[1, usize::MAX / 2]`.
    pub fn capacity(&self) -> usize {
        self.header().capacity
    }

    /// Read index (lowest N-1 bits) and the consumer-closed flag (highest bit).
    pub fn read_state(&self) -> &AtomicUsize {
        &self.header().read_state
    }

    /// Write index (lowest N-1 bits) and the producer-closed flag (highest bit).
    pub fn write_state(&self) -> &AtomicUsize {
        &self.header().write_state
    }

    /// Starts at 2, one for each half.
    pub fn refcount(&self) -> &AtomicU8 {
        &self.header().refcount
    }
}

impl<T> Drop for LocalBuffer<T> {
    fn drop(&mut self) {
        let layout = Self::layout(self.capacity());
        // SAFETY: block of memory was allocated with `std::alloc::alloc` using the same `layout`.
        // The header holds no resources of its own and `T` is `Copy` for every constructed buffer.
        unsafe { std::alloc::dealloc(self.inner.as_ptr() as *mut u8, layout) };
    }
}
