use std::sync::Arc;
use std::thread;

use bramble::buffer::BufferPoolManager;
use bramble::common::{PageId, RecordId, SlotId};
use bramble::index::{BPlusTree, GenericKey, IntegerComparator};
use bramble::storage::disk::DiskManager;

use tempfile::NamedTempFile;

type Tree = BPlusTree<8>;

fn create_tree(pool_size: usize) -> (Arc<Tree>, Arc<BufferPoolManager>, NamedTempFile) {
    let temp = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    let tree = Arc::new(
        BPlusTree::new("test_index", Arc::clone(&bpm), IntegerComparator, 8, 8).unwrap(),
    );
    (tree, bpm, temp)
}

fn key(v: i64) -> GenericKey<8> {
    GenericKey::from_integer(v)
}

fn rid(v: i64) -> RecordId {
    RecordId::new(PageId::new(v as u32), SlotId::new(0))
}

#[test]
fn test_concurrent_inserts() {
    let (tree, bpm, _temp) = create_tree(64);

    const THREADS: i64 = 4;
    const PER_THREAD: i64 = 250;

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                let v = t * PER_THREAD + i;
                assert!(tree.insert(&key(v), rid(v)).unwrap(), "insert {v} failed");
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for v in 0..THREADS * PER_THREAD {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "key {v} lost");
    }

    let keys: Vec<i64> = tree.begin().unwrap().map(|(k, _)| k.to_integer()).collect();
    assert_eq!(keys, (0..THREADS * PER_THREAD).collect::<Vec<_>>());

    for raw in 0..bpm.disk_manager().num_pages() {
        let pin = bpm.get_pin_count(PageId::new(raw));
        assert!(matches!(pin, None | Some(0)), "page {raw} leaked {pin:?}");
    }
}

#[test]
fn test_concurrent_inserts_interleaved_keys() {
    let (tree, _bpm, _temp) = create_tree(64);

    const THREADS: i64 = 4;
    const TOTAL: i64 = 800;

    // each thread inserts the keys congruent to its id, so neighbouring keys
    // land on the same leaves and collide on latches
    let mut handles = Vec::new();
    for t in 0..THREADS {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            let mut v = t;
            while v < TOTAL {
                assert!(tree.insert(&key(v), rid(v)).unwrap());
                v += THREADS;
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let keys: Vec<i64> = tree.begin().unwrap().map(|(k, _)| k.to_integer()).collect();
    assert_eq!(keys, (0..TOTAL).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_reads_during_inserts() {
    let (tree, _bpm, _temp) = create_tree(64);

    // a stable prefix for the readers
    for v in 0..200i64 {
        tree.insert(&key(v), rid(v)).unwrap();
    }

    let mut handles = Vec::new();

    for t in 0..2i64 {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                let v = 200 + t * 200 + i;
                assert!(tree.insert(&key(v), rid(v)).unwrap());
            }
        }));
    }

    for _ in 0..2 {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            for round in 0..400i64 {
                let v = round % 200;
                assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let keys: Vec<i64> = tree.begin().unwrap().map(|(k, _)| k.to_integer()).collect();
    assert_eq!(keys, (0..600).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_removes() {
    let (tree, _bpm, _temp) = create_tree(64);

    const TOTAL: i64 = 600;
    for v in 0..TOTAL {
        tree.insert(&key(v), rid(v)).unwrap();
    }

    // threads delete disjoint stripes; the stripe v % 3 == 2 survives
    let mut handles = Vec::new();
    for t in 0..2i64 {
        let tree = Arc::clone(&tree);
        handles.push(thread::spawn(move || {
            let mut v = t;
            while v < TOTAL {
                tree.remove(&key(v)).unwrap();
                v += 3;
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for v in 0..TOTAL {
        let expected = if v % 3 == 2 { Some(rid(v)) } else { None };
        assert_eq!(tree.get_value(&key(v)).unwrap(), expected, "key {v}");
    }

    let keys: Vec<i64> = tree.begin().unwrap().map(|(k, _)| k.to_integer()).collect();
    assert_eq!(keys, (0..TOTAL).filter(|v| v % 3 == 2).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_mixed_insert_remove() {
    let (tree, bpm, _temp) = create_tree(64);

    // even keys are present throughout; odd keys are inserted and removed
    for v in (0..400i64).step_by(2) {
        tree.insert(&key(v), rid(v)).unwrap();
    }

    let mut handles = Vec::new();

    let inserter = Arc::clone(&tree);
    handles.push(thread::spawn(move || {
        for v in (1..400i64).step_by(2) {
            assert!(inserter.insert(&key(v), rid(v)).unwrap());
        }
    }));

    let remover = Arc::clone(&tree);
    handles.push(thread::spawn(move || {
        for v in (1..400i64).step_by(2) {
            // races with the inserter: removing a not-yet-inserted key is a
            // no-op, so sweep twice
            remover.remove(&key(v)).unwrap();
        }
        for v in (1..400i64).step_by(2) {
            remover.remove(&key(v)).unwrap();
        }
    }));

    for handle in handles {
        handle.join().unwrap();
    }

    for v in (0..400i64).step_by(2) {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "even key {v}");
    }

    for raw in 0..bpm.disk_manager().num_pages() {
        let pin = bpm.get_pin_count(PageId::new(raw));
        assert!(matches!(pin, None | Some(0)), "page {raw} leaked {pin:?}");
    }
}
