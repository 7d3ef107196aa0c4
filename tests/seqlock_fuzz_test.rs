#![cfg(not(feature = "loom"))]

use rand::Rng;
use s3fifo_policy::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

const WIDTH: usize = 8;
const WRITERS: u64 = 2;
const READERS: usize = 4;
const WRITES_PER_WRITER: usize = 20_000;

/// Payload where every word carries the same tag. A torn read shows up as
/// a payload with mixed words.
type Payload = [u64; WIDTH];

fn payload(writer: u64, salt: u32) -> Payload {
    [(writer << 32) | salt as u64; WIDTH]
}

fn is_valid(value: &Payload) -> bool {
    let first = value[0];
    value.iter().all(|&word| word == first) && (first == 0 || (first >> 32) < WRITERS + 1)
}

#[test]
fn test_concurrent_readers_never_see_torn_values() {
    let entry = Arc::new(Entry::new("fuzz", [0u64; WIDTH], 0, 1));
    let done = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicU64::new(0));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let entry = Arc::clone(&entry);
            let done = Arc::clone(&done);
            let observed = Arc::clone(&observed);
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let value = entry.value();
                    assert!(is_valid(&value), "torn read: {value:?}");
                    observed.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    // Writers tag payloads 1..=WRITERS so the initial zero stays distinguishable
    let writers: Vec<_> = (1..=WRITERS)
        .map(|writer| {
            let entry = Arc::clone(&entry);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..WRITES_PER_WRITER {
                    let value = payload(writer, rng.gen_range(1..u32::MAX));
                    entry.lock();
                    unsafe { entry.set_value(value) };
                    entry.unlock();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(observed.load(Ordering::Relaxed) > 0);
    let last = entry.value();
    assert!(is_valid(&last));
    assert_ne!(last[0], 0, "writers should have replaced the initial value");
}

#[test]
fn test_store_from_many_threads() {
    let entry = Arc::new(Entry::new(7u32, [0u64; WIDTH], 0, 1));

    let writers: Vec<_> = (1..=4u64)
        .map(|writer| {
            let entry = Arc::clone(&entry);
            thread::spawn(move || {
                for salt in 1..=1_000u32 {
                    entry.store(payload(writer, salt));
                    let value = entry.value();
                    assert!(value.iter().all(|&w| w == value[0]));
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }

    // Each writer's last store is 1000, whichever won the final race
    let last = entry.value();
    assert_eq!(last[0] & 0xFFFF_FFFF, 1_000);
}
