//! Channel scenarios: round-trips, wrap-around arithmetic, fan-out,
//! listener wiring, and pool-bridged consumers.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use weft_channel::{
    async_connect, channel, connect, connect_via, disconnect, mpsc_channel, spmc_channel, Ring,
};
use weft_pool::{StopSource, ThreadPool};

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn bytes_round_trip_through_a_channel() {
    let (source, sink) = channel(Ring::<u8>::new(1024).unwrap());
    assert_eq!(source.capacity(), sink.capacity());
    assert_eq!(sink.available(), 0);

    source.write(b"Hello");
    assert_eq!(sink.available(), 5);

    let mut data = [0u8; 11];
    assert_eq!(sink.read(&mut data[..5]), 5);
    assert_eq!(&data[..5], b"Hello");

    source.write(b" World");
    assert_eq!(sink.available(), 6);
    assert_eq!(sink.read(&mut data[5..]), 6);
    assert_eq!(&data, b"Hello World");
    assert_eq!(sink.available(), 0);
}

#[test]
fn integers_round_trip_through_a_channel() {
    let (source, sink) = channel(Ring::<i32>::new(16).unwrap());
    let data = [1, 2, 3, 4, 5];
    source.write(&data);

    let mut read = [0i32; 5];
    assert_eq!(sink.read(&mut read), 5);
    assert_eq!(read, data);
}

// ============================================================================
// Wrap-around arithmetic
// ============================================================================

#[test]
fn indices_stay_monotonic_across_the_wrap() {
    let (source, sink) = channel(Ring::<u8>::new(8).unwrap());

    source.write(b"0123");
    assert_eq!(sink.read_vec(4), b"0123".to_vec());
    assert_eq!(source.write_index(), 4);
    assert_eq!(sink.read_index(), 4);

    source.write(b"4567");
    assert_eq!(source.write_index(), 8);
    assert_eq!(sink.read_index(), 4);
    assert_eq!(sink.read_vec(4), b"4567".to_vec());
    assert_eq!(sink.read_index(), 8);

    source.put(b'8');
    assert_eq!(source.write_index(), 9);
    assert_eq!(sink.read_index(), 8);

    assert_eq!(sink.peek(), b'8');
    assert_eq!(sink.read_index(), 8, "peek must not advance");
    assert_eq!(sink.pop(), b'8');
    assert_eq!(sink.read_index(), source.write_index());

    source.put(b'9');
    assert_eq!(sink.pop(), b'9');
    assert_eq!(sink.read_index(), source.write_index());

    source.write(b"abcdefgh");
    assert_eq!(sink.read_vec(8), b"abcdefgh".to_vec());
}

#[test]
fn a_lapped_cursor_saturates_available_at_capacity() {
    let (source, sinks) = spmc_channel(Ring::<i32>::new(8).unwrap(), 2);
    let live = &sinks[0];
    let stale = &sinks[1];

    for i in 0..8 {
        source.put(i);
        assert_eq!(live.pop(), i);
    }
    assert_eq!(live.available(), 0);
    assert_eq!(stale.available(), source.capacity());

    // the writer laps the stale cursor; slot 0 now holds 8
    source.put(8);
    assert_eq!(live.pop(), 8);
    assert_eq!(stale.available(), source.capacity());
}

// ============================================================================
// Fan-out and fan-in
// ============================================================================

#[test]
fn spmc_sinks_read_independently() {
    let (source, sinks) = spmc_channel(Ring::<i32>::new(16).unwrap(), 2);
    let data = [1, 2, 3, 4, 5];
    source.write(&data);

    for sink in &sinks {
        let mut read = [0i32; 5];
        assert_eq!(sink.read(&mut read), 5);
        assert_eq!(read, data);
    }
}

#[test]
fn mpsc_sources_share_one_write_cursor() {
    let (sources, sink) = mpsc_channel(Ring::<u8>::new(16).unwrap(), 2);
    let extra = sources[0].clone();

    sources[0].put(b'0');
    sources[1].put(b'1');
    extra.put(b'2');

    assert_eq!(sink.read_vec(3), b"012".to_vec());
}

#[test]
fn threaded_producer_and_consumer_see_a_consistent_stream() {
    let (source, sink) = channel(Ring::<i32>::new(1024).unwrap());
    let stop = StopSource::new();

    let writer = {
        let token = stop.token();
        thread::spawn(move || {
            let mut next = 0;
            while !token.stop_requested() {
                thread::sleep(Duration::from_millis(2));
                source.put(next);
                next += 1;
            }
        })
    };

    let reader = {
        let token = stop.token();
        thread::spawn(move || {
            let mut expected = 0;
            while !token.stop_requested() {
                thread::sleep(Duration::from_millis(2));
                let available = sink.available();
                if available > 0 {
                    sink.read_using(
                        |window| {
                            for value in window {
                                assert_eq!(*value, expected);
                                expected += 1;
                            }
                            window.len()
                        },
                        available,
                    );
                }
            }
        })
    };

    thread::sleep(Duration::from_millis(300));
    stop.request_stop();
    writer.join().unwrap();
    reader.join().unwrap();
}

// ============================================================================
// Listeners and connect
// ============================================================================

#[test]
fn listeners_see_every_write_with_its_count() {
    let (source, _sink) = channel(Ring::<u8>::new(16).unwrap());
    let counts = Arc::new(Mutex::new(Vec::new()));
    let counts_in = Arc::clone(&counts);
    source.register_notify(move |count| counts_in.lock().push(count));

    source.put(b'a');
    source.write(b"bcd");
    assert_eq!(*counts.lock(), vec![1, 3]);
}

#[test]
fn connect_drives_the_sink_inline() {
    let (source, sink) = channel(Ring::<u8>::new(16).unwrap());
    let seen = Arc::new(Mutex::new(0usize));
    let seen_in = Arc::clone(&seen);
    let connection = connect(&source, &sink, move |window| {
        *seen_in.lock() += window.len();
        window.len()
    });

    source.write(b"1234567");
    assert_eq!(*seen.lock(), 7);

    assert!(disconnect(&source, connection));
    source.write(b"1234567");
    assert_eq!(*seen.lock(), 7, "a disconnected callback must not run");
    assert!(!disconnect(&source, connection));
}

#[test]
fn connect_via_reads_on_a_pool_worker() {
    let pool = ThreadPool::new(1);
    let (source, sink) = channel(Ring::<u8>::new(1024).unwrap());
    let collected = Arc::new(Mutex::new(Vec::new()));
    let collected_in = Arc::clone(&collected);
    connect_via(
        &source,
        &sink,
        move |window| {
            collected_in.lock().extend_from_slice(window);
            window.len()
        },
        &pool,
    );

    for _ in 0..10 {
        thread::sleep(Duration::from_millis(20));
        source.write(b"Hello");
    }
    pool.wait();
    assert_eq!(collected.lock().len(), 50);
    pool.quit();
}

#[test]
fn spmc_async_connect_delivers_the_exact_payload_to_every_sink() {
    let payload: String = (0..=250).map(|i| i.to_string()).collect::<Vec<_>>().join("-");
    let payload = payload.into_bytes();

    let (source, sinks) = spmc_channel(Ring::<u8>::new(1024).unwrap(), 3);

    let collected: Vec<Arc<Mutex<Vec<u8>>>> =
        (0..3).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();
    for (sink, accumulator) in sinks.iter().zip(&collected) {
        let accumulator = Arc::clone(accumulator);
        async_connect(&source, sink, move |window| {
            accumulator.lock().extend_from_slice(window);
            window.len()
        });
    }

    let chunk = payload.len() / 10;
    let mut offset = 0;
    while offset < payload.len() {
        thread::sleep(Duration::from_millis(20));
        let len = chunk.min(payload.len() - offset);
        source.write(&payload[offset..offset + len]);
        offset += len;
    }

    weft_pool::wait();
    for accumulator in &collected {
        assert_eq!(*accumulator.lock(), payload);
    }
}
