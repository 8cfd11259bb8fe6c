//! Concurrency tests for PersistentBTreeMap.
//!
//! Readers run on several threads while one writer mutates the map. Every
//! reader-held snapshot must stay internally consistent and unchanged.

#![cfg(feature = "persistent")]

use ordered_maps::btree::PersistentBTreeMap;
use ordered_maps::ordered_map::MapCursor;
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[rstest]
fn test_readers_see_consistent_snapshots_during_writes() {
    let map: Arc<PersistentBTreeMap<u32, u32>> = Arc::new((0..2000).map(|key| (key, key)).collect());
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let map = Arc::clone(&map);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut rounds = 0_usize;
                while !done.load(Ordering::Acquire) || rounds == 0 {
                    let snapshot = map.snapshot();
                    let keys: Vec<u32> = snapshot.iter().map(|(key, _)| *key).collect();
                    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
                    for (key, value) in &snapshot {
                        assert!(*value == *key || *value == key + 1_000_000);
                    }
                    rounds += 1;
                }
                rounds
            })
        })
        .collect();

    for round in 0..5 {
        for key in (0..2000).filter(|key| key % 5 == round) {
            map.set(key, key + 1_000_000);
        }
        for key in 2000..2100 {
            map.set(key, key);
            map.delete(&key);
        }
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        assert!(reader.join().expect("reader panicked") > 0);
    }
    assert_eq!(map.len(), 2000);
    assert!(map.iter().all(|(key, value)| value == key + 1_000_000));
}

#[rstest]
fn test_snapshot_taken_before_writes_is_frozen() {
    let map: Arc<PersistentBTreeMap<u32, u32>> = Arc::new((0..500).map(|key| (key, 0)).collect());
    let frozen = map.snapshot();

    let writer = {
        let map = Arc::clone(&map);
        thread::spawn(move || {
            for key in 0..500 {
                map.set(key, 1);
            }
        })
    };
    writer.join().expect("writer panicked");

    assert!(frozen.iter().all(|(_, value)| *value == 0));
    assert!(map.iter().all(|(_, value)| value == 1));
}

#[rstest]
fn test_forks_written_from_different_threads_stay_independent() {
    let base: PersistentBTreeMap<u32, u32> = (0..1000).map(|key| (key, 0)).collect();

    let handles: Vec<_> = (1..=4_u32)
        .map(|tag| {
            let fork = base.clone();
            thread::spawn(move || {
                for key in (0..1000).filter(|key| key % 4 == tag - 1) {
                    fork.set(key, tag);
                }
                fork
            })
        })
        .collect();

    let forks: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("fork writer panicked"))
        .collect();

    assert!(base.iter().all(|(_, value)| value == 0));
    for (index, fork) in forks.iter().enumerate() {
        let tag = u32::try_from(index).unwrap_or(0) + 1;
        for (key, value) in fork.iter() {
            let expected = if key % 4 == tag - 1 { tag } else { 0 };
            assert_eq!(value, expected);
        }
    }
}

#[rstest]
fn test_cursor_moves_across_threads() {
    let map: PersistentBTreeMap<u32, u32> = (0..100).map(|key| (key, key)).collect();
    let mut cursor = map.cursor();
    assert!(cursor.seek(&40));
    map.delete(&41);

    let walker = thread::spawn(move || {
        let mut keys = Vec::new();
        while cursor.is_positioned() && keys.len() < 3 {
            keys.extend(cursor.key().copied());
            cursor.next();
        }
        keys
    });
    assert_eq!(walker.join().expect("walker panicked"), vec![40, 41, 42]);
}
