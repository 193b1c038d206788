//! Byte fidelity across buffer sizes and scheduling policies

use crossbeam::channel::unbounded;
use proptest::prelude::*;
use std::thread;
use std::time::Duration;
use streamrelay::prelude::*;

fn relay_blocking(data: &[u8], buffer_size: usize) -> Vec<u8> {
    let sink = SharedSink::buffer();
    let relay = RelayBuilder::new()
        .source(SliceSource::new(data.to_vec()))
        .sink(sink.clone())
        .buffer_size(buffer_size)
        .build()
        .unwrap();
    relay.start().unwrap();
    relay.wait_for().unwrap();
    assert!(relay.fault().is_none());
    sink.contents()
}

fn relay_polling_chunks(chunks: &[Vec<u8>], buffer_size: usize) -> Vec<u8> {
    let (tx, rx) = unbounded();
    let sink = SharedSink::buffer();
    let relay = RelayBuilder::new()
        .source(ChannelSource::new(rx))
        .sink(sink.clone())
        .buffer_size(buffer_size)
        .non_blocking(true)
        .poll_interval(Duration::from_millis(1))
        .build()
        .unwrap();
    relay.start().unwrap();

    let expected: usize = chunks.iter().map(Vec::len).sum();
    for chunk in chunks {
        tx.send(chunk.clone()).unwrap();
    }

    // Polling never sees the end on its own; stop once everything has landed.
    for _ in 0..5000 {
        if sink.contents().len() >= expected {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    relay.stop();
    relay.wait_for().unwrap();
    assert!(relay.fault().is_none());
    sink.contents()
}

#[test]
fn abc_with_single_byte_buffer() {
    assert_eq!(relay_blocking(&[0x41, 0x42, 0x43], 1), b"ABC");
}

#[test]
fn empty_source_produces_empty_sink() {
    assert!(relay_blocking(&[], 7).is_empty());
}

#[test]
fn large_payload_small_buffer() {
    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(relay_blocking(&data, 3), data);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn blocking_policy_preserves_bytes(
        data in proptest::collection::vec(any::<u8>(), 0..4096),
        buffer_size in 1usize..600,
    ) {
        prop_assert_eq!(relay_blocking(&data, buffer_size), data);
    }

    #[test]
    fn polling_policy_preserves_bytes(
        chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..300), 0..12),
        buffer_size in 1usize..200,
    ) {
        let expected: Vec<u8> = chunks.concat();
        prop_assert_eq!(relay_polling_chunks(&chunks, buffer_size), expected);
    }
}
