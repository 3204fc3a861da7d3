//! The read cursor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ring::Ring;

/// The read side of a ring: an independent, monotonically increasing
/// cursor.
///
/// A reader never coordinates with the writer; it trusts the caller (or the
/// channel layer) to keep it behind the published write index. Cloning a
/// reader forks an independent cursor at the current position.
pub struct Reader<T> {
    ring: Arc<Ring<T>>,
    index: AtomicU64,
    /// Staging buffer for the minimum-contiguous guarantee.
    scratch: Option<Mutex<Box<[T]>>>,
}

impl<T: Copy + Default> Clone for Reader<T> {
    fn clone(&self) -> Self {
        let scratch = self
            .scratch
            .as_ref()
            .map(|s| Mutex::new(vec![T::default(); s.lock().len()].into_boxed_slice()));
        Self {
            ring: Arc::clone(&self.ring),
            index: AtomicU64::new(self.index.load(Ordering::Acquire)),
            scratch,
        }
    }
}

impl<T: Copy + Default> Reader<T> {
    pub fn new(ring: Arc<Ring<T>>) -> Self {
        Self {
            ring,
            index: AtomicU64::new(0),
            scratch: None,
        }
    }

    /// A reader whose `read_using` callbacks always see at least
    /// `min_contiguous` contiguous elements (staged through a scratch copy
    /// when the run up to the wrap is shorter).
    pub fn with_min_contiguous(ring: Arc<Ring<T>>, min_contiguous: usize) -> Self {
        let scratch = (min_contiguous > 0)
            .then(|| Mutex::new(vec![T::default(); min_contiguous].into_boxed_slice()));
        Self {
            ring,
            index: AtomicU64::new(0),
            scratch,
        }
    }

    /// The logical read index. Never decreases (except through
    /// [`reset_to`](Self::reset_to), which only moves it forward to the
    /// write index).
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Copy out the element under the cursor and advance.
    pub fn pop(&self) -> T {
        let index = self.index.load(Ordering::Acquire);
        // SAFETY: the caller keeps this cursor behind the write index.
        let value = unsafe { self.ring.read_slot(index) };
        self.index.store(index + 1, Ordering::Release);
        value
    }

    /// Copy out the element under the cursor without advancing.
    #[must_use]
    pub fn peek(&self) -> T {
        let index = self.index.load(Ordering::Acquire);
        // SAFETY: the caller keeps this cursor behind the write index.
        unsafe { self.ring.read_slot(index) }
    }

    /// Read without advancing: the callback sees up to two contiguous
    /// windows and returns how many elements it consumed.
    pub fn peek_using<F>(&self, mut f: F, count: usize) -> usize
    where
        F: FnMut(&[T]) -> usize,
    {
        let capacity = self.ring.capacity();
        let index = self.index.load(Ordering::Acquire);
        let offset = self.ring.slot_of(index);

        let first_len = count.min(capacity - offset);
        if first_len == 0 {
            return 0;
        }
        // SAFETY: in bounds; slots behind the write index are stable.
        let first = f(unsafe { self.ring.window(offset, first_len) }).min(first_len);
        let mut seen = first;

        if first == first_len && seen < count {
            let second_len = (count - seen).min(capacity);
            // SAFETY: as above, starting at slot zero after the wrap.
            let second = f(unsafe { self.ring.window(0, second_len) }).min(second_len);
            seen += second;
        }
        seen
    }

    /// Copy `out.len()` elements without advancing.
    pub fn peek_into(&self, out: &mut [T]) {
        let mut offset = 0;
        let total = out.len();
        self.peek_using(
            |window| {
                let len = window.len().min(total - offset);
                out[offset..offset + len].copy_from_slice(&window[..len]);
                offset += len;
                len
            },
            total,
        );
    }

    /// Hand the callback direct windows into the ring and advance by what
    /// it consumed. Invoked up to twice across the wrap; a callback that
    /// consumes less than offered ends the read.
    pub fn read_using<F>(&self, mut f: F, count: usize) -> usize
    where
        F: FnMut(&[T]) -> usize,
    {
        let capacity = self.ring.capacity();
        let index = self.index.load(Ordering::Acquire);
        let offset = self.ring.slot_of(index);

        let first_len = count.min(capacity - offset);
        let first = self.drain_segment(&mut f, offset, first_len);
        self.index.store(index + first as u64, Ordering::Release);
        let mut consumed = first;

        if first == first_len && consumed < count {
            let second_len = (count - consumed).min(capacity);
            let second = self.drain_segment(&mut f, 0, second_len);
            self.index
                .store(index + (consumed + second) as u64, Ordering::Release);
            consumed += second;
        }
        consumed
    }

    /// Copy exactly `out.len()` elements and advance.
    pub fn read_into(&self, out: &mut [T]) {
        let mut offset = 0;
        let total = out.len();
        self.read_using(
            |window| {
                let len = window.len().min(total - offset);
                out[offset..offset + len].copy_from_slice(&window[..len]);
                offset += len;
                len
            },
            total,
        );
    }

    /// Copy `count` elements into a fresh vector and advance.
    pub fn read_vec(&self, count: usize) -> Vec<T> {
        let mut values = vec![T::default(); count];
        self.read_into(&mut values);
        values
    }

    /// Move the cursor to `index` (used by `Sink::reset` to discard unread
    /// data).
    pub fn reset_to(&self, index: u64) {
        self.index.store(index, Ordering::Release);
    }

    fn drain_segment<F>(&self, f: &mut F, offset: usize, len: usize) -> usize
    where
        F: FnMut(&[T]) -> usize,
    {
        if len == 0 {
            return 0;
        }
        if let Some(scratch) = &self.scratch {
            let mut staging = scratch.lock();
            if len < staging.len() {
                // SAFETY: in bounds; slots behind the write index are stable.
                let window = unsafe { self.ring.window(offset, len) };
                staging[..len].copy_from_slice(window);
                // The callback always sees the full minimum-contiguous span;
                // only the `len` fresh elements count as consumed.
                return f(&staging[..]).min(len);
            }
        }
        // SAFETY: in bounds; slots behind the write index are stable.
        let window = unsafe { self.ring.window(offset, len) };
        f(window).min(len)
    }
}
