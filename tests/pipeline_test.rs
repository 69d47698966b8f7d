//! Integration tests for the transform stages and the conduit between them.
//!
//! These drive the public stage types the way the pipeline does: a blocking
//! encoder on one side of a bounded conduit, an async consumer on the other.

use ossenc::progress::{ProgressCounter, Tap};
use ossenc::streaming::{conduit, Cipher, Receiver, Sender};
use proptest::prelude::*;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::SyncIoBridge;

const KEY: [u8; 32] = [0x42; 32];

/// Pseudo-random bytes that zlib cannot shrink.
struct Noise {
    state: u32,
    remaining: usize,
}

impl Noise {
    fn new(len: usize) -> Self {
        Self {
            state: 7,
            remaining: len,
        }
    }
}

impl Read for Noise {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining);
        for b in &mut buf[..n] {
            self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            *b = (self.state >> 24) as u8;
        }
        self.remaining -= n;
        Ok(n)
    }
}

fn encode(data: &[u8], encrypt: bool) -> Vec<u8> {
    let cipher = encrypt.then(|| Cipher::new(&KEY).unwrap());
    let (_, out) = Sender::new(cipher).run(&mut &data[..], Vec::new()).unwrap();
    out
}

fn decode(wire: &[u8], encrypt: bool) -> io::Result<Vec<u8>> {
    let cipher = encrypt.then(|| Cipher::new(&KEY).unwrap());
    let mut out = Vec::new();
    Receiver::new(cipher).run(wire, &mut out)?;
    Ok(out)
}

// =============================================================================
// Backpressure and progress
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_consumer_bounds_producer() {
    const CAPACITY: usize = 4096;
    const SOURCE_LEN: usize = 1 << 20;

    let (writer, mut reader) = conduit(CAPACITY);
    let counter = Arc::new(ProgressCounter::new());
    let bridge = SyncIoBridge::new(writer);

    let tap_counter = counter.clone();
    let producer = tokio::task::spawn_blocking(move || {
        let sender = Sender::new(Some(Cipher::new(&KEY).unwrap()));
        let mut source = Noise::new(SOURCE_LEN);
        let result = sender.run(&mut source, Tap::new(bridge, tap_counter));
        match result {
            Ok((_, tap)) => {
                tap.into_inner().into_inner().close(Ok(()));
                Ok(())
            }
            Err(e) => Err(e),
        }
    });

    // Nobody reads: the producer must park once the conduit is full.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stalled = counter.written();
    assert!(stalled > 0, "producer never started");
    assert!(
        stalled <= CAPACITY as u64,
        "{} bytes accepted into a {} byte conduit",
        stalled,
        CAPACITY
    );
    assert!(!producer.is_finished());

    // Drain while sampling the counter; it only ever grows.
    let mut wire = Vec::new();
    let mut chunk = vec![0u8; 1024];
    let mut last = 0;
    loop {
        let n = reader.read(&mut chunk).await.unwrap();
        let now = counter.written();
        assert!(now >= last, "progress went backwards: {} -> {}", last, now);
        last = now;
        if n == 0 {
            break;
        }
        wire.extend_from_slice(&chunk[..n]);
    }

    producer.await.unwrap().unwrap();
    assert_eq!(counter.written(), wire.len() as u64);

    let mut expected = Vec::new();
    Noise::new(SOURCE_LEN).read_to_end(&mut expected).unwrap();
    assert_eq!(decode(&wire, true).unwrap(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_producer_is_not_a_clean_eof() {
    let (writer, mut reader) = conduit(1024);
    let bridge = SyncIoBridge::new(writer);

    let producer = tokio::task::spawn_blocking(move || {
        let mut bridge = bridge;
        io::Write::write_all(&mut bridge, b"partial").unwrap();
        bridge.into_inner().close(Err("source vanished".to_string()));
    });

    let mut received = Vec::new();
    let mut chunk = [0u8; 64];
    let err = loop {
        match reader.read(&mut chunk).await {
            Ok(0) => panic!("failed producer surfaced as a clean EOF"),
            Ok(n) => received.extend_from_slice(&chunk[..n]),
            Err(e) => break e,
        }
    };
    producer.await.unwrap();

    assert_eq!(received, b"partial");
    assert!(err.to_string().contains("source vanished"));
}

// =============================================================================
// Transform identity
// =============================================================================

#[test]
fn test_zero_byte_input_has_encoded_output() {
    for encrypt in [true, false] {
        let wire = encode(&[], encrypt);
        assert!(!wire.is_empty());
        assert!(decode(&wire, encrypt).unwrap().is_empty());
    }
}

#[test]
fn test_encrypted_output_needs_the_key() {
    let data = b"attack at dawn".repeat(100);
    let wire = encode(&data, true);
    assert!(decode(&wire, false).is_err());
}

proptest! {
    #[test]
    fn prop_roundtrip_identity(
        data in prop::collection::vec(any::<u8>(), 0..8192),
        encrypt in any::<bool>(),
    ) {
        let wire = encode(&data, encrypt);
        prop_assert_eq!(decode(&wire, encrypt).unwrap(), data);
    }

    #[test]
    fn prop_any_key_roundtrips(
        key in prop::array::uniform32(any::<u8>()),
        data in prop::collection::vec(any::<u8>(), 1..2048),
    ) {
        let (_, wire) = Sender::new(Some(Cipher::new(&key).unwrap()))
            .run(&mut &data[..], Vec::new())
            .unwrap();
        let mut out = Vec::new();
        Receiver::new(Some(Cipher::new(&key).unwrap()))
            .run(&wire[..], &mut out)
            .unwrap();
        prop_assert_eq!(out, data);
    }
}
