pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;
pub mod header_page;
pub mod key;

pub use btree_index::BPlusTree;
pub use btree_iterator::TreeIterator;
pub use btree_page::{
    InternalPage, InternalPageRef, LeafPage, LeafPageRef, TreePageKind, TreePageRef,
};
pub use header_page::{HeaderPage, HeaderPageRef};
pub use key::{
    BytewiseComparator, GenericKey, IntegerComparator, Key16, Key32, Key4, Key64, Key8,
    KeyComparator,
};
