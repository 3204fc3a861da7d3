//! Source/sink channels over a shared ring, with listener notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use weft_pool::ThreadPool;

use crate::reader::Reader;
use crate::ring::Ring;
use crate::writer::Writer;

/// Ring plus the single shared write cursor.
struct ChannelCore<T> {
    ring: Arc<Ring<T>>,
    writer: Writer<T>,
}

/// Handle to a registered source listener; pass to [`disconnect`] /
/// [`Source::unregister_notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection(u64);

type NotifyFn = Box<dyn FnMut(usize) + Send>;

/// The write side of a channel.
///
/// Every write notifies the listeners registered on this handle with the
/// number of elements written, after the write index has been published.
/// Clones share the ring and write cursor but start with an **empty**
/// listener registry — the registry belongs to the handle, not the ring.
pub struct Source<T> {
    core: Arc<ChannelCore<T>>,
    listeners: Mutex<Vec<(u64, NotifyFn)>>,
    next_listener_id: AtomicU64,
}

impl<T: Copy + Default + Send + 'static> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }
}

impl<T: Copy + Default + Send + 'static> Source<T> {
    fn new(core: Arc<ChannelCore<T>>) -> Self {
        Self {
            core,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.ring.capacity()
    }

    /// The logical write index shared by every source on this ring.
    #[must_use]
    pub fn write_index(&self) -> u64 {
        self.core.writer.index()
    }

    /// Write one value and notify listeners with a count of 1.
    pub fn put(&self, value: T) {
        self.core.writer.put(value);
        self.notify(1);
    }

    /// Bulk write; listeners are notified once with the element count.
    pub fn write(&self, values: &[T]) {
        self.core.writer.write(values);
        self.notify(values.len());
    }

    /// Direct-window write (see [`Writer::write_using`]); listeners are
    /// notified with the count actually produced.
    pub fn write_using<F>(&self, f: F, count: usize) -> usize
    where
        F: FnMut(&mut [T]) -> usize,
    {
        let written = self.core.writer.write_using(f, count);
        self.notify(written);
        written
    }

    /// Register a listener invoked (on the writing thread) after every
    /// write on this handle, with the number of elements written.
    pub fn register_notify<F>(&self, f: F) -> Connection
    where
        F: FnMut(usize) + Send + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Box::new(f)));
        Connection(id)
    }

    /// Remove a listener. Returns whether anything was removed.
    pub fn unregister_notify(&self, connection: Connection) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != connection.0);
        listeners.len() != before
    }

    fn notify(&self, count: usize) {
        let mut listeners = self.listeners.lock();
        for (_, listener) in listeners.iter_mut() {
            listener(count);
        }
    }
}

/// The read side of a channel: an independent cursor over the shared ring.
///
/// Cloning forks the cursor at its current position, so a clone re-reads
/// nothing and misses nothing that comes after the fork. There is no
/// back-pressure: a source more than `capacity` ahead silently overwrites
/// unread data, and [`available`](Self::available) saturates at capacity.
pub struct Sink<T> {
    core: Arc<ChannelCore<T>>,
    reader: Arc<Reader<T>>,
}

impl<T: Copy + Default + Send + 'static> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            reader: Arc::new(Reader::clone(&self.reader)),
        }
    }
}

impl<T: Copy + Default + Send + 'static> Sink<T> {
    fn new(core: Arc<ChannelCore<T>>) -> Self {
        let reader = Arc::new(Reader::new(Arc::clone(&core.ring)));
        Self { core, reader }
    }

    /// A handle over the *same* cursor, used to hand a sink to a listener.
    fn alias(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            reader: Arc::clone(&self.reader),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.ring.capacity()
    }

    /// The logical read index of this sink's cursor.
    #[must_use]
    pub fn read_index(&self) -> u64 {
        self.reader.index()
    }

    /// Unread elements, saturating at capacity.
    #[must_use]
    pub fn available(&self) -> usize {
        let pending = self
            .core
            .writer
            .index()
            .saturating_sub(self.reader.index());
        (pending).min(self.capacity() as u64) as usize
    }

    /// Copy out the next element and advance.
    pub fn pop(&self) -> T {
        self.reader.pop()
    }

    /// Copy out the next element without advancing.
    #[must_use]
    pub fn peek(&self) -> T {
        self.reader.peek()
    }

    /// Copy `out.len()` elements without advancing.
    pub fn peek_into(&self, out: &mut [T]) {
        self.reader.peek_into(out);
    }

    /// Read into `out`, clamped to what is available. Returns the number of
    /// elements actually read.
    pub fn read(&self, out: &mut [T]) -> usize {
        let len = self.available().min(out.len());
        self.reader.read_into(&mut out[..len]);
        len
    }

    /// Direct-window read (see [`Reader::read_using`]), clamped to what is
    /// available.
    pub fn read_using<F>(&self, f: F, count: usize) -> usize
    where
        F: FnMut(&[T]) -> usize,
    {
        self.reader.read_using(f, self.available().min(count))
    }

    /// Read up to `count` elements into a fresh vector.
    pub fn read_vec(&self, count: usize) -> Vec<T> {
        self.reader.read_vec(self.available().min(count))
    }

    /// Read everything available.
    pub fn read_all(&self) -> Vec<T> {
        self.read_vec(self.available())
    }

    /// Discard unread data: move the cursor up to the write index.
    pub fn reset(&self) {
        self.reader.reset_to(self.core.writer.index());
    }
}

/// A single-producer/single-consumer channel over `ring`.
pub fn channel<T: Copy + Default + Send + 'static>(ring: Ring<T>) -> (Source<T>, Sink<T>) {
    let core = make_core(ring);
    (Source::new(Arc::clone(&core)), Sink::new(core))
}

/// A single-producer/multi-consumer channel: every sink owns an independent
/// read cursor over the one ring.
pub fn spmc_channel<T: Copy + Default + Send + 'static>(
    ring: Ring<T>,
    sinks: usize,
) -> (Source<T>, Vec<Sink<T>>) {
    let core = make_core(ring);
    let sinks = (0..sinks).map(|_| Sink::new(Arc::clone(&core))).collect();
    (Source::new(core), sinks)
}

/// A multi-producer/single-consumer channel: every source shares the one
/// write cursor.
pub fn mpsc_channel<T: Copy + Default + Send + 'static>(
    ring: Ring<T>,
    sources: usize,
) -> (Vec<Source<T>>, Sink<T>) {
    let core = make_core(ring);
    let sources = (0..sources)
        .map(|_| Source::new(Arc::clone(&core)))
        .collect();
    (sources, Sink::new(core))
}

fn make_core<T: Copy + Default>(ring: Ring<T>) -> Arc<ChannelCore<T>> {
    let ring = Arc::new(ring);
    Arc::new(ChannelCore {
        writer: Writer::new(Arc::clone(&ring)),
        ring,
    })
}

/// Wire `source` to `sink`: on every write, `sink.read_using(f, count)` runs
/// inline on the writing thread, against the sink's own cursor.
pub fn connect<T, F>(source: &Source<T>, sink: &Sink<T>, mut f: F) -> Connection
where
    T: Copy + Default + Send + 'static,
    F: FnMut(&[T]) -> usize + Send + 'static,
{
    let sink = sink.alias();
    source.register_notify(move |count| {
        sink.read_using(&mut f, count);
    })
}

/// As [`connect`], but each notification enqueues the read as a task on
/// `pool` instead of running it inline.
pub fn connect_via<T, F>(source: &Source<T>, sink: &Sink<T>, f: F, pool: &ThreadPool) -> Connection
where
    T: Copy + Default + Send + 'static,
    F: FnMut(&[T]) -> usize + Send + 'static,
{
    let sink = sink.alias();
    let f = Arc::new(Mutex::new(f));
    let executor = pool.executor();
    debug!("bridging channel through pool");
    source.register_notify(move |count| {
        let sink = sink.alias();
        let f = Arc::clone(&f);
        let job: Box<dyn FnOnce() + Send> = Box::new(move || {
            sink.read_using(|window| (&mut *f.lock())(window), count);
        });
        if executor.execute(job).is_err() {
            warn!("dropping channel notification: pool is stopped");
        }
    })
}

/// As [`connect_via`], on the global pool.
pub fn async_connect<T, F>(source: &Source<T>, sink: &Sink<T>, f: F) -> Connection
where
    T: Copy + Default + Send + 'static,
    F: FnMut(&[T]) -> usize + Send + 'static,
{
    connect_via(source, sink, f, ThreadPool::global())
}

/// Remove a connection made by any of the `connect` variants. The callback
/// is guaranteed not to run for writes after this returns.
pub fn disconnect<T: Copy + Default + Send + 'static>(
    source: &Source<T>,
    connection: Connection,
) -> bool {
    source.unregister_notify(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloned_sources_have_their_own_listeners() {
        let (source, _sink) = channel(Ring::<u8>::new(8).unwrap());
        let hits = Arc::new(AtomicU64::new(0));
        let hits_in = Arc::clone(&hits);
        source.register_notify(move |_| {
            hits_in.fetch_add(1, Ordering::SeqCst);
        });

        let detached = source.clone();
        detached.put(1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        source.put(2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cloned_sinks_fork_their_cursor() {
        let (source, sink) = channel(Ring::<u8>::new(8).unwrap());
        source.write(&[1, 2, 3]);
        assert_eq!(sink.pop(), 1);

        let fork = sink.clone();
        assert_eq!(fork.available(), 2);
        assert_eq!(sink.pop(), 2);
        // the fork's cursor did not move
        assert_eq!(fork.pop(), 2);
    }

    #[test]
    fn reset_discards_unread_data() {
        let (source, sink) = channel(Ring::<u8>::new(8).unwrap());
        source.write(&[1, 2, 3]);
        sink.reset();
        assert_eq!(sink.available(), 0);
        assert_eq!(sink.read_index(), source.write_index());
    }
}
