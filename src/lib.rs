//! Bramble - the storage and indexing core of a disk-resident relational
//! database.
//!
//! The crate makes a paged database file appear to higher layers as a
//! random-access collection of fixed-size frames, and provides a concurrent
//! ordered index over fixed-width keys backed by those frames.
//!
//! # Architecture
//!
//! - **Disk layer** (`storage::disk`): whole-page file I/O
//!   - `DiskManager`: reads, writes and allocates pages by id
//!   - `DiskScheduler`: background I/O worker behind a request queue
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: page table, free list and fetch/new/unpin/flush/
//!     delete under a single pool mutex
//!   - `LruReplacer`: strict-LRU victim selection over unpinned frames
//!   - `Frame`: per-frame metadata plus the page bytes behind the frame latch
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards coupling the frame latch
//!     with the pin obligation
//!
//! - **Index** (`index`): a concurrent B+ tree
//!   - `BPlusTree`: point lookup, range iteration, insertion and deletion
//!     under latch crabbing; splits, merges and redistribution keep every
//!     node within its size bounds
//!   - `TreeIterator`: pinned, read-latched forward cursor over the leaves
//!   - `GenericKey<N>`: fixed-width keys (4/8/16/32/64 bytes) ordered by a
//!     pluggable `KeyComparator`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bramble::buffer::BufferPoolManager;
//! use bramble::index::{BPlusTree, GenericKey, IntegerComparator};
//! use bramble::storage::disk::DiskManager;
//! use bramble::common::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let tree: BPlusTree<8> =
//!     BPlusTree::new("orders_pk", Arc::clone(&bpm), IntegerComparator, 32, 32).unwrap();
//!
//! let key = GenericKey::from_integer(42);
//! let value = RecordId::new(PageId::new(100), SlotId::new(0));
//! tree.insert(&key, value).unwrap();
//! assert_eq!(tree.get_value(&key).unwrap(), Some(value));
//!
//! for (key, value) in tree.begin().unwrap() {
//!     println!("{} -> {}", key.to_integer(), value);
//! }
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{Error, FrameId, PageId, RecordId, Result, SlotId};
