mod local;

use std::fmt;
use std::mem::ManuallyDrop;
#[cfg(not(loom))]
use std::sync::atomic::fence;
#[cfg(not(loom))]
use std::sync::atomic::Ordering::{Acquire, Release};

#[cfg(loom)]
use loom::sync::atomic::fence;
#[cfg(loom)]
use loom::sync::atomic::Ordering::{Acquire, Release};

pub use self::local::LocalBuffer;

/// Creates a lock-free SPSC ring buffer of `capacity` slots.
///
/// `capacity` must be a power of 2 between `1` and `usize::MAX / 2`. Every slot starts out as
/// `T::default()`.
pub fn buffer<T: Copy + Default>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let buffer = ManuallyDrop::new(LocalBuffer::new(capacity, T::default()));

    // SAFETY: pointer is valid since we got it from a reference, `ManuallyDrop` will prevent double
    // drop. Inside, `LocalBuffer` is just a pointer, so it's fine to copy it.
    let buffer_copy = unsafe { std::ptr::read(&buffer) };

    // SAFETY: a newly created buffer will satisfy `read_state == write_state == 0`.
    let producer = unsafe { Producer::new(buffer_copy) };
    let consumer = unsafe { Consumer::new(buffer) };

    (producer, consumer)
}

/// Creates a ring buffer holding at least `min_capacity` slots, rounding up to a power of two.
pub fn buffer_at_least<T: Copy + Default>(min_capacity: usize) -> (Producer<T>, Consumer<T>) {
    buffer(min_capacity.max(1).next_power_of_two())
}

const INDEX_MASK: usize = usize::MAX / 2;

const CLOSED_MASK: usize = 1 << (usize::BITS - 1);

/// Producing side of the SPSC ring buffer.
///
/// Data is written in place: [`Self::writable_region()`] exposes the contiguous free span after
/// the write cursor, and [`Self::advance_write()`] publishes what has been written into it.
pub struct Producer<T> {
    buffer: ManuallyDrop<LocalBuffer<T>>,
    closed: bool,
    read_state: usize,
    write_idx: usize,
}

impl<T: Copy> Producer<T> {
    /// SAFETY: assuming `read_state == write_state == 0`.
    unsafe fn new(buffer: ManuallyDrop<LocalBuffer<T>>) -> Producer<T> {
        Producer {
            buffer,
            closed: false,
            read_state: 0,
            write_idx: 0,
        }
    }

    /// Updates cached state, synchronizing with the consumer.
    ///
    /// [`Self::writable_region()`] refreshes on its own, there is no need to call this before it.
    pub fn refresh(&mut self) {
        // Using `Acquire` here to establish a happens-after relationship with
        // `Consumer::advance_read()` and `Consumer::drop()`.
        self.read_state = self.buffer.read_state().load(Acquire);
    }

    fn read_idx(&self) -> usize {
        self.read_state & INDEX_MASK
    }

    /// Returns `true` if the buffer is closed (either manually, or by dropping
    /// [`Producer`] or [`Consumer`]).
    ///
    /// Uses the cached state. To update, call [`Self::refresh()`].
    pub fn is_closed(&self) -> bool {
        self.closed || self.read_state & CLOSED_MASK == CLOSED_MASK
    }

    fn len(&self) -> usize {
        self.write_idx.wrapping_sub(self.read_idx()) & INDEX_MASK
    }

    /// Returns the capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of slots written but not yet read, observed right now.
    pub fn fill_count(&self) -> usize {
        let read_idx = self.buffer.read_state().load(Acquire) & INDEX_MASK;
        self.write_idx.wrapping_sub(read_idx) & INDEX_MASK
    }

    /// Number of slots the producer may still write, observed right now.
    pub fn free_count(&self) -> usize {
        self.capacity() - self.fill_count()
    }

    /// Returns the contiguous span of free slots following the write cursor.
    ///
    /// The span stops at the physical end of the storage, so it may be shorter than
    /// [`Self::free_count()`]. After [`Self::advance_write()`], a second call returns the part
    /// that wrapped around. Returns an empty span once the consumer is gone.
    pub fn writable_region(&mut self) -> &mut [T] {
        self.refresh();
        if self.is_closed() {
            return &mut [];
        }

        let free = self.capacity() - self.len();

        // `capacity` is a power of two, using bitwise and instead of modulo.
        let idx = self.write_idx & (self.capacity() - 1);
        let len = (self.capacity() - idx).min(free);

        // SAFETY: `idx + len <= capacity`, slots are initialized at creation. The consumer only
        // touches slots in `[read_idx, write_idx)`, which is disjoint from this span, and can only
        // shrink that range while we hold `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.buffer.data_ptr().add(idx), len) }
    }

    /// Publishes `count` slots written through [`Self::writable_region()`].
    ///
    /// Panics if `count` exceeds the free space seen by the last refresh.
    pub fn advance_write(&mut self, count: usize) {
        assert!(
            count <= self.capacity() - self.len(),
            "advance_write past the free region"
        );

        // Move the write index, marking these slots used, wrapping on overflow.
        self.write_idx = self.write_idx.wrapping_add(count) & INDEX_MASK;

        // Update the write index in the shared buffer, notifying the consumer.
        // Using `Release` ordering so the slot contents happen-before `Consumer::refresh()`.
        self.buffer.write_state().store(self.write_idx, Release);
    }

    /// Copies as much of `slice` as fits, handling the wrap-around. Returns the number of elements
    /// written.
    pub fn write_slice(&mut self, slice: &[T]) -> usize {
        let mut written = 0;

        // At most two spans: up to the end of the storage, then from its start.
        for _ in 0..2 {
            let region = self.writable_region();
            let len = region.len().min(slice.len() - written);
            if len == 0 {
                break;
            }

            region[..len].copy_from_slice(&slice[written..written + len]);
            self.advance_write(len);
            written += len;
        }

        written
    }

    /// Close the buffer. The consumer sees this once it has drained everything written before.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;

        // `Release` keeps the flag ordered after the last published write index.
        self.buffer
            .write_state()
            .store(self.write_idx | CLOSED_MASK, Release);
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.buffer
                .write_state()
                .store(self.write_idx | CLOSED_MASK, Release);
        }

        if self.buffer.refcount().fetch_sub(1, Release) == 1 {
            fence(Acquire);

            // SAFETY: refcount is 0, so the buffer can be dropped.
            unsafe { ManuallyDrop::drop(&mut self.buffer) };
        }
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.buffer.capacity())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Consuming side of the SPSC ring buffer.
pub struct Consumer<T> {
    buffer: ManuallyDrop<LocalBuffer<T>>,
    closed: bool,
    read_idx: usize,
    write_state: usize,
}

impl<T: Copy> Consumer<T> {
    /// SAFETY: assuming `read_state == write_state == 0`
    unsafe fn new(buffer: ManuallyDrop<LocalBuffer<T>>) -> Consumer<T> {
        Consumer {
            buffer,
            closed: false,
            read_idx: 0,
            write_state: 0,
        }
    }

    /// Updates cached state, synchronizing with the producer.
    ///
    /// [`Self::readable_region()`] refreshes on its own, there is no need to call this before it.
    pub fn refresh(&mut self) {
        // Using `Acquire` here to establish a happens-after relationship with
        // `Producer::advance_write()` and `Producer::close()`.
        self.write_state = self.buffer.write_state().load(Acquire);
    }

    fn write_idx(&self) -> usize {
        self.write_state & INDEX_MASK
    }

    /// Returns `true` if the buffer is closed (either manually, or by dropping
    /// [`Producer`] or [`Consumer`]).
    ///
    /// Uses the cached state. To update, call [`Self::refresh()`].
    pub fn is_closed(&self) -> bool {
        self.closed || self.write_state & CLOSED_MASK == CLOSED_MASK
    }

    /// Returns `true` once the producer has closed and every element it wrote has been read.
    ///
    /// Index and flag come from a single load, so a `true` result never hides unread data.
    pub fn is_finished(&mut self) -> bool {
        self.refresh();
        self.write_state & CLOSED_MASK == CLOSED_MASK && self.len() == 0
    }

    fn len(&self) -> usize {
        self.write_idx().wrapping_sub(self.read_idx) & INDEX_MASK
    }

    /// Returns the capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of slots written but not yet read, observed right now.
    pub fn fill_count(&self) -> usize {
        let write_idx = self.buffer.write_state().load(Acquire) & INDEX_MASK;
        write_idx.wrapping_sub(self.read_idx) & INDEX_MASK
    }

    /// Number of slots the producer may still write, observed right now.
    pub fn free_count(&self) -> usize {
        self.capacity() - self.fill_count()
    }

    /// Returns the contiguous span of readable slots following the read cursor.
    ///
    /// The span stops at the physical end of the storage; after [`Self::advance_read()`], a second
    /// call returns the part that wrapped around.
    pub fn readable_region(&mut self) -> &[T] {
        self.refresh();

        let len = self.len();

        // `capacity` is a power of two, using bitwise and instead of modulo.
        let idx = self.read_idx & (self.capacity() - 1);
        let len = (self.capacity() - idx).min(len);

        // SAFETY: `idx + len <= capacity`. These slots were published with `Release` before the
        // write index we just acquired, and the producer won't touch them until we advance.
        unsafe { std::slice::from_raw_parts(self.buffer.data_ptr().add(idx), len) }
    }

    /// Releases `count` slots back to the producer.
    ///
    /// Panics if `count` exceeds what the last refresh made readable.
    pub fn advance_read(&mut self, count: usize) {
        assert!(count <= self.len(), "advance_read past the readable region");

        // Move the read index, wrapping on overflow
        self.read_idx = self.read_idx.wrapping_add(count) & INDEX_MASK;

        // Update the read index in the shared buffer, notifying the producer.
        // Using `Release` ordering to establish a happens-before relationship with
        // `Producer::refresh()`.
        self.buffer.read_state().store(self.read_idx, Release);
    }

    /// Copies readable elements into `slice` without consuming them. Returns the number copied.
    pub fn peek_slice(&mut self, slice: &mut [T]) -> usize {
        self.refresh();

        let len = self.len().min(slice.len());
        let idx = self.read_idx & (self.capacity() - 1);

        // Compute how many elements will fit after `idx` without wrapping around
        let left_len = (self.capacity() - idx).min(len);

        // Compute how many elements will wrap around the ring buffer
        let right_len = len - left_len;

        unsafe {
            // SAFETY: Pointers are valid, `idx` is in bounds up to `idx + left_len`,
            // data up to `len` was published by the producer.
            std::ptr::copy_nonoverlapping(
                self.buffer.data_ptr().add(idx),
                slice.as_mut_ptr(),
                left_len,
            );

            // SAFETY: Pointers are valid, `left_len` is in bounds up to `left_len + right_len`
            std::ptr::copy_nonoverlapping(
                self.buffer.data_ptr(),
                slice.as_mut_ptr().add(left_len),
                right_len,
            );
        }

        len
    }

    /// Moves up to `slice.len()` elements out of the ring. Returns the number read.
    pub fn read_slice(&mut self, slice: &mut [T]) -> usize {
        let len = self.peek_slice(slice);
        self.advance_read(len);
        len
    }

    /// Discards everything currently readable.
    pub fn clear(&mut self) {
        self.refresh();
        let len = self.len();
        self.advance_read(len);
    }

    /// Close the buffer, telling the [`Producer`] that nothing will be read anymore.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        self.buffer
            .read_state()
            .store(self.read_idx | CLOSED_MASK, Release);
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.buffer
                .read_state()
                .store(self.read_idx | CLOSED_MASK, Release);
        }

        if self.buffer.refcount().fetch_sub(1, Release) == 1 {
            fence(Acquire);

            // SAFETY: refcount is 0, so the buffer can be dropped.
            unsafe { ManuallyDrop::drop(&mut self.buffer) };
        }
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.buffer.capacity())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #[cfg(not(loom))]
    use std::thread;

    #[cfg(loom)]
    use loom::thread;

    use super::*;

    #[test]
    #[cfg(not(loom))]
    fn regions_wrap_around() {
        let (mut producer, mut consumer) = buffer::<u8>(8);

        assert_eq!(producer.writable_region().len(), 8);
        producer.writable_region()[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        producer.advance_write(6);

        assert_eq!(consumer.readable_region(), &[1, 2, 3, 4, 5, 6]);
        consumer.advance_read(4);

        // Free space is 6, but only 2 slots are contiguous before the end.
        assert_eq!(producer.free_count(), 6);
        assert_eq!(producer.writable_region().len(), 2);
        producer.writable_region().copy_from_slice(&[7, 8]);
        producer.advance_write(2);

        let region = producer.writable_region();
        assert_eq!(region.len(), 4);
        region[..3].copy_from_slice(&[9, 10, 11]);
        producer.advance_write(3);

        assert_eq!(consumer.readable_region(), &[5, 6, 7, 8]);
        consumer.advance_read(4);
        assert_eq!(consumer.readable_region(), &[9, 10, 11]);
        consumer.advance_read(3);

        assert_eq!(consumer.fill_count(), 0);
        assert!(consumer.readable_region().is_empty());
    }

    #[test]
    #[cfg(not(loom))]
    fn round_trip_preserves_order() {
        for capacity in [1, 2, 4, 16, 64, 256] {
            let (mut producer, mut consumer) = buffer::<u8>(capacity);
            let data: Vec<u8> = (0..capacity).map(|i| (i * 7 + 3) as u8).collect();

            // Misalign the cursors first so the payload straddles the end of the storage.
            let skew = capacity / 2;
            assert_eq!(producer.write_slice(&data[..skew]), skew);
            let mut sink = vec![0; skew];
            assert_eq!(consumer.read_slice(&mut sink), skew);

            let mut written = 0;
            for chunk in data.chunks(3) {
                written += producer.write_slice(chunk);
            }
            assert_eq!(written, capacity);

            let mut out = vec![0; capacity];
            let mut read = 0;
            while read < capacity {
                let n = consumer.read_slice(&mut out[read..]);
                assert!(n > 0);
                read += n;
            }

            assert_eq!(out, data, "capacity {capacity}");
        }
    }

    #[test]
    #[cfg(not(loom))]
    fn counts_always_sum_to_capacity() {
        let (mut producer, mut consumer) = buffer::<u8>(16);
        let mut scratch = [0u8; 16];

        for step in 0..100usize {
            let n = producer.write_slice(&scratch[..step % 11]);
            assert_eq!(producer.fill_count() + producer.free_count(), 16);
            assert_eq!(consumer.fill_count() + consumer.free_count(), 16);
            assert!(n <= 16);

            consumer.read_slice(&mut scratch[..step % 7]);
            assert_eq!(producer.fill_count() + producer.free_count(), 16);
            assert_eq!(consumer.fill_count() + consumer.free_count(), 16);
        }
    }

    #[test]
    #[cfg(not(loom))]
    fn full_buffer_rejects_writes() {
        let (mut producer, mut consumer) = buffer::<u8>(4);

        assert_eq!(producer.write_slice(&[1, 2, 3, 4, 5]), 4);
        assert!(producer.writable_region().is_empty());
        assert_eq!(producer.write_slice(&[6]), 0);

        let mut out = [0; 2];
        assert_eq!(consumer.read_slice(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(producer.write_slice(&[6, 7, 8]), 2);
    }

    #[test]
    #[cfg(not(loom))]
    fn peek_does_not_consume() {
        let (mut producer, mut consumer) = buffer::<u8>(4);
        producer.write_slice(&[1, 2, 3]);

        let mut out = [0; 4];
        assert_eq!(consumer.peek_slice(&mut out), 3);
        assert_eq!(consumer.fill_count(), 3);
        assert_eq!(consumer.read_slice(&mut out), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
    }

    #[test]
    #[cfg(not(loom))]
    fn clear_discards_readable_data() {
        let (mut producer, mut consumer) = buffer::<u8>(8);
        producer.write_slice(&[1, 2, 3, 4, 5]);

        consumer.clear();
        assert_eq!(consumer.fill_count(), 0);
        assert_eq!(producer.free_count(), 8);

        producer.write_slice(&[9]);
        let mut out = [0; 1];
        assert_eq!(consumer.read_slice(&mut out), 1);
        assert_eq!(out, [9]);
    }

    #[test]
    #[cfg(not(loom))]
    fn finished_only_after_drain() {
        let (mut producer, mut consumer) = buffer::<u8>(4);
        producer.write_slice(&[1, 2]);
        producer.close();

        assert!(!consumer.is_finished());
        let mut out = [0; 4];
        assert_eq!(consumer.read_slice(&mut out), 2);
        assert!(consumer.is_finished());
    }

    #[test]
    #[cfg(not(loom))]
    fn dropped_consumer_closes_producer() {
        let (mut producer, consumer) = buffer::<u8>(4);
        drop(consumer);

        assert!(producer.writable_region().is_empty());
        assert!(producer.is_closed());
    }

    #[test]
    #[cfg(not(loom))]
    fn at_least_rounds_up() {
        let (producer, _consumer) = buffer_at_least::<f32>(1000);
        assert_eq!(producer.capacity(), 1024);

        let (producer, _consumer) = buffer_at_least::<f32>(0);
        assert_eq!(producer.capacity(), 1);
    }

    #[test]
    #[cfg(not(loom))]
    #[should_panic]
    fn rejects_non_power_of_two() {
        let _ = buffer::<u8>(12);
    }

    fn do_parallel_transfer() {
        let (mut producer, mut consumer) = buffer::<u8>(2);

        let expected = vec![1u8, 2, 3];

        let data = expected.clone();
        let t1 = thread::spawn(move || {
            let mut sent = 0;
            while sent < data.len() {
                let n = producer.write_slice(&data[sent..]);
                if n == 0 {
                    thread::yield_now();
                }
                sent += n;
            }
        });

        let t2 = thread::spawn(move || {
            let mut received = Vec::new();
            let mut buf = [0u8; 2];
            loop {
                let n = consumer.read_slice(&mut buf);
                received.extend_from_slice(&buf[..n]);
                if n == 0 {
                    if consumer.is_finished() {
                        break;
                    }
                    thread::yield_now();
                }
            }

            assert_eq!(received, expected);
        });

        t1.join().unwrap();
        t2.join().unwrap();
    }

    #[test]
    #[cfg(not(loom))]
    fn parallel_transfer() {
        do_parallel_transfer();
    }

    #[test]
    #[cfg(loom)]
    fn parallel_transfer() {
        loom::model(do_parallel_transfer);
    }
}
