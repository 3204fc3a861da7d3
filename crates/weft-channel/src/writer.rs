//! The write cursor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ring::Ring;

/// The write side of a ring: a monotonically increasing cursor.
///
/// Slots are written first and the index published afterwards (release), so
/// a reader that observes the index also observes the data. Only one thread
/// may drive a writer at a time; multi-source channels share one writer and
/// serialize their puts through the index RMW, matching the single logical
/// writer the ring requires.
pub struct Writer<T> {
    ring: Arc<Ring<T>>,
    index: AtomicU64,
    /// Staging buffer for the minimum-contiguous guarantee.
    scratch: Option<Mutex<Box<[T]>>>,
}

impl<T: Copy + Default> Writer<T> {
    pub fn new(ring: Arc<Ring<T>>) -> Self {
        Self {
            ring,
            index: AtomicU64::new(0),
            scratch: None,
        }
    }

    /// A writer whose `write_using` callbacks always see at least
    /// `min_contiguous` contiguous slots.
    ///
    /// When the run up to the wrap point is shorter than that, the callback
    /// is handed a scratch buffer of `min_contiguous` slots instead and the
    /// produced prefix is copied into the ring. Codecs that need a minimum
    /// block size rely on this.
    pub fn with_min_contiguous(ring: Arc<Ring<T>>, min_contiguous: usize) -> Self {
        let scratch = (min_contiguous > 0)
            .then(|| Mutex::new(vec![T::default(); min_contiguous].into_boxed_slice()));
        Self {
            ring,
            index: AtomicU64::new(0),
            scratch,
        }
    }

    /// The logical write index. Never decreases.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Write one value and advance the index.
    pub fn put(&self, value: T) {
        let index = self.index.load(Ordering::Acquire);
        // SAFETY: sole writer; the slot is unpublished until the RMW below.
        unsafe { self.ring.write_slot(index, value) };
        self.index.fetch_add(1, Ordering::AcqRel);
    }

    /// Bulk write, split into two contiguous segments across the wrap
    /// point. Advances the index by `values.len()`.
    pub fn write(&self, values: &[T]) {
        let mut offset = 0;
        self.write_using(
            |window| {
                let len = window.len().min(values.len() - offset);
                window[..len].copy_from_slice(&values[offset..offset + len]);
                offset += len;
                len
            },
            values.len(),
        );
    }

    /// Hand the callback direct windows into the ring.
    ///
    /// The callback is invoked up to twice (before and after the wrap) with
    /// a mutable slot window and returns how many elements it actually
    /// produced; producing fewer than offered ends the write. Returns the
    /// total produced; the index advances accordingly, after each segment.
    pub fn write_using<F>(&self, mut f: F, count: usize) -> usize
    where
        F: FnMut(&mut [T]) -> usize,
    {
        let capacity = self.ring.capacity();
        let index = self.index.load(Ordering::Acquire);
        let offset = self.ring.slot_of(index);

        let first_len = count.min(capacity - offset);
        let first = self.fill_segment(&mut f, offset, first_len);
        self.index.store(index + first as u64, Ordering::Release);
        let mut written = first;

        if first == first_len && written < count {
            // Wrapped: the second segment starts at slot zero.
            let second_len = (count - written).min(capacity);
            let second = self.fill_segment(&mut f, 0, second_len);
            self.index
                .store(index + (written + second) as u64, Ordering::Release);
            written += second;
        }
        written
    }

    fn fill_segment<F>(&self, f: &mut F, offset: usize, len: usize) -> usize
    where
        F: FnMut(&mut [T]) -> usize,
    {
        if len == 0 {
            return 0;
        }
        if let Some(scratch) = &self.scratch {
            let mut staging = scratch.lock();
            if len < staging.len() {
                let produced = f(&mut staging[..]).min(len);
                // SAFETY: offset + produced stays within the contiguous run;
                // sole writer for these unpublished slots.
                let window = unsafe { self.ring.window_mut(offset, produced) };
                window.copy_from_slice(&staging[..produced]);
                return produced;
            }
        }
        // SAFETY: offset + len stays within the contiguous run; sole writer
        // for these unpublished slots while the callback runs.
        let window = unsafe { self.ring.window_mut(offset, len) };
        f(window).min(len)
    }
}
