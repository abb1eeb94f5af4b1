use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{
    Error, PageId, RecordId, Result, SlotId, HEADER_PAGE_ID, INVALID_PAGE_ID,
};

use super::btree_page::{
    write_parent_page_id, InternalPage, InternalPageRef, LeafPage, LeafPageRef, TreePageRef,
};
use super::btree_iterator::TreeIterator;
use super::header_page::{HeaderPage, HeaderPageRef};
use super::key::{GenericKey, IntegerComparator, KeyComparator};

/// Mutating operations distinguished by the crabbing safety predicate.
/// Lookups descend with read latches and need no predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TreeOp {
    Insert,
    Delete,
}

/// Where a read-latched descent should land.
#[derive(Clone, Copy)]
enum SeekTarget<'k, const N: usize> {
    Key(&'k GenericKey<N>),
    Leftmost,
    Rightmost,
}

/// Operation-local latch state: the root-latch token, the write-latched
/// ancestors still held (deepest last), and page ids queued for physical
/// deletion once every latch is released.
struct Context<'a> {
    root: Option<MutexGuard<'a, PageId>>,
    ancestors: Vec<WritePageGuard>,
    deleted: Vec<PageId>,
}

impl<'a> Context<'a> {
    fn new(root: MutexGuard<'a, PageId>) -> Self {
        Self {
            root: Some(root),
            ancestors: Vec::new(),
            deleted: Vec::new(),
        }
    }

    fn root_id(&self) -> PageId {
        self.root.as_deref().copied().unwrap_or(INVALID_PAGE_ID)
    }

    /// Releases every held ancestor latch and the root token. Idempotent.
    fn release_ancestors(&mut self) {
        self.ancestors.clear();
        self.root = None;
    }
}

/// Concurrent B+ tree index over the buffer pool. Keys are fixed-width
/// (N bytes) with ordering supplied by the comparator; values are record ids.
/// Keys are unique. Concurrency follows latch crabbing: descents hold frame
/// latches top-down and release ancestors as soon as a child is safe, gated
/// by a root latch that also guards the root page id. The root page id is
/// persisted per index name in the header page.
pub struct BPlusTree<const N: usize, C: KeyComparator = IntegerComparator> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    /// The root latch; the guarded value is the root page id
    root_page_id: Mutex<PageId>,
}

impl<const N: usize, C: KeyComparator> BPlusTree<N, C> {
    /// Opens the named index, creating the header page on a fresh database
    /// file and restoring the root page id from an existing header record.
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let index_name = index_name.into();

        if bpm.disk_manager().num_pages() == 0 {
            let mut guard = bpm.new_page_write()?;
            let page_id = guard.page_id();
            if page_id != HEADER_PAGE_ID {
                return Err(Error::Corrupted(format!(
                    "header page allocated as {page_id}"
                )));
            }
            HeaderPage::new(guard.data_mut()).init();
        }

        let root = {
            let guard = bpm.fetch_read(HEADER_PAGE_ID)?;
            HeaderPageRef::new(guard.data())
                .get_root_id(&index_name)
                .unwrap_or(INVALID_PAGE_ID)
        };

        Ok(Self {
            index_name,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            root_page_id: Mutex::new(root),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.lock().is_valid()
    }

    /// Point lookup. Returns the record stored under `key`, if any.
    pub fn get_value(&self, key: &GenericKey<N>) -> Result<Option<RecordId>> {
        let leaf = match self.find_leaf_read(SeekTarget::Key(key))? {
            Some(guard) => guard,
            None => return Ok(None),
        };
        let view = LeafPageRef::<N>::new(leaf.data());
        Ok(view.lookup(key, &self.comparator))
    }

    /// Inserts a key/value pair. Returns false (without modifying the tree)
    /// when the key already exists.
    pub fn insert(&self, key: &GenericKey<N>, value: RecordId) -> Result<bool> {
        let mut ctx = Context::new(self.root_page_id.lock());
        let root_id = ctx.root_id();

        if !root_id.is_valid() {
            self.start_new_tree(&mut ctx, key, value)?;
            return Ok(true);
        }

        let mut leaf_guard = self.descend_write(root_id, key, TreeOp::Insert, &mut ctx)?;

        {
            let leaf = LeafPageRef::<N>::new(leaf_guard.data());
            if leaf.lookup(key, &self.comparator).is_some() {
                return Ok(false);
            }
        }

        let new_size = {
            let mut leaf = LeafPage::<N>::new(leaf_guard.data_mut());
            leaf.insert(key, value, &self.comparator)
        };

        if new_size <= self.leaf_max_size {
            return Ok(true);
        }

        self.split_leaf(leaf_guard, &mut ctx)?;
        Ok(true)
    }

    /// Deletes the pair stored under `key`; absent keys are a no-op.
    pub fn remove(&self, key: &GenericKey<N>) -> Result<()> {
        let mut ctx = Context::new(self.root_page_id.lock());
        let root_id = ctx.root_id();

        if !root_id.is_valid() {
            return Ok(());
        }

        let mut leaf_guard = self.descend_write(root_id, key, TreeOp::Delete, &mut ctx)?;

        let (old_size, new_size) = {
            let mut leaf = LeafPage::<N>::new(leaf_guard.data_mut());
            let old = leaf.size();
            let new = leaf.remove_and_delete_record(key, &self.comparator);
            (old, new)
        };

        if old_size == new_size {
            return Ok(());
        }

        self.coalesce_or_redistribute(leaf_guard, &mut ctx)?;

        // physical deletion happens only after every latch is dropped
        ctx.release_ancestors();
        let deleted = std::mem::take(&mut ctx.deleted);
        drop(ctx);
        for page_id in deleted {
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<TreeIterator<N>> {
        let leaf = self.find_leaf_read(SeekTarget::Leftmost)?;
        TreeIterator::new(Arc::clone(&self.bpm), leaf, 0)
    }

    /// Iterator positioned at the first key >= `key`.
    pub fn begin_at(&self, key: &GenericKey<N>) -> Result<TreeIterator<N>> {
        match self.find_leaf_read(SeekTarget::Key(key))? {
            None => TreeIterator::new(Arc::clone(&self.bpm), None, 0),
            Some(guard) => {
                let index = LeafPageRef::<N>::new(guard.data()).key_index(key, &self.comparator);
                TreeIterator::new(Arc::clone(&self.bpm), Some(guard), index)
            }
        }
    }

    /// Iterator positioned one past the largest key.
    pub fn end(&self) -> Result<TreeIterator<N>> {
        match self.find_leaf_read(SeekTarget::Rightmost)? {
            None => TreeIterator::new(Arc::clone(&self.bpm), None, 0),
            Some(guard) => {
                let size = LeafPageRef::<N>::new(guard.data()).size();
                TreeIterator::new(Arc::clone(&self.bpm), Some(guard), size)
            }
        }
    }

    /// Bulk-loads whitespace-separated integer keys from a file.
    pub fn insert_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = std::fs::read_to_string(path)?;
        for token in contents.split_whitespace() {
            if let Ok(value) = token.parse::<i64>() {
                let key = GenericKey::<N>::from_integer(value);
                self.insert(&key, record_for_key(value))?;
            }
        }
        Ok(())
    }

    /// Removes whitespace-separated integer keys listed in a file.
    pub fn remove_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = std::fs::read_to_string(path)?;
        for token in contents.split_whitespace() {
            if let Ok(value) = token.parse::<i64>() {
                let key = GenericKey::<N>::from_integer(value);
                self.remove(&key)?;
            }
        }
        Ok(())
    }

    /// Read-latched descent: latch the child, then release the parent
    /// (pure latch coupling). Returns None on an empty tree.
    fn find_leaf_read(&self, target: SeekTarget<'_, N>) -> Result<Option<ReadPageGuard>> {
        let mut token = Some(self.root_page_id.lock());
        let root_id = token.as_deref().copied().unwrap_or(INVALID_PAGE_ID);
        if !root_id.is_valid() {
            return Ok(None);
        }

        let mut guard = self.bpm.fetch_read(root_id)?;
        loop {
            if TreePageRef::new(guard.data()).is_leaf() {
                token.take();
                return Ok(Some(guard));
            }

            let child_id = {
                let node = InternalPageRef::<N>::new(guard.data());
                match target {
                    SeekTarget::Key(key) => node.lookup(key, &self.comparator),
                    SeekTarget::Leftmost => node.value_at(0),
                    SeekTarget::Rightmost => node.value_at(node.size() - 1),
                }
            };

            let child = self.bpm.fetch_read(child_id)?;
            token.take();
            guard = child;
        }
    }

    /// Write-latched descent for insert/delete. Ancestors accumulate in the
    /// context and are released (with the root token) as soon as the freshly
    /// latched child is safe for the operation.
    fn descend_write(
        &self,
        root_id: PageId,
        key: &GenericKey<N>,
        op: TreeOp,
        ctx: &mut Context<'_>,
    ) -> Result<WritePageGuard> {
        let mut current = self.bpm.fetch_write(root_id)?;
        loop {
            if TreePageRef::new(current.data()).is_leaf() {
                return Ok(current);
            }

            let child_id = {
                let node = InternalPageRef::<N>::new(current.data());
                node.lookup(key, &self.comparator)
            };

            let child = self.bpm.fetch_write(child_id)?;
            let child_safe = Self::is_safe(&TreePageRef::new(child.data()), op);
            ctx.ancestors.push(current);
            if child_safe {
                ctx.release_ancestors();
            }
            current = child;
        }
    }

    /// A node is safe when the pending operation cannot propagate past it:
    /// no overflow on insert, no underflow on delete. Only children of the
    /// descent are tested; the root never passes through here (its underflow
    /// is handled by adjust_root).
    fn is_safe(hdr: &TreePageRef<'_>, op: TreeOp) -> bool {
        debug_assert!(!hdr.is_root(), "safety is only evaluated on children");
        let size = hdr.size();
        match op {
            TreeOp::Insert => size < hdr.max_size(),
            TreeOp::Delete => size > hdr.min_size(),
        }
    }

    /// Builds a single-leaf tree holding the first pair and records the new
    /// root in the header page.
    fn start_new_tree(
        &self,
        ctx: &mut Context<'_>,
        key: &GenericKey<N>,
        value: RecordId,
    ) -> Result<()> {
        let mut root_guard = self.bpm.new_page_write()?;
        let root_id = root_guard.page_id();
        {
            let mut leaf = LeafPage::<N>::new(root_guard.data_mut());
            leaf.init(root_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(key, value, &self.comparator);
        }
        drop(root_guard);

        self.set_root_id(ctx, root_id);
        self.update_root_record(root_id, true)?;
        log::debug!("started new tree for {} at {root_id}", self.index_name);
        Ok(())
    }

    /// Splits an overflowing leaf, links the sibling chain, and lifts the
    /// sibling's first key into the parent. Both leaf latches are released
    /// before the parent is restructured.
    fn split_leaf(&self, mut leaf_guard: WritePageGuard, ctx: &mut Context<'_>) -> Result<()> {
        let mut sibling_guard = self.bpm.new_page_write()?;
        let sibling_id = sibling_guard.page_id();

        let (left_id, parent_id, sep_key) = {
            let mut leaf = LeafPage::<N>::new(leaf_guard.data_mut());
            let mut sibling = LeafPage::<N>::new(sibling_guard.data_mut());
            sibling.init(sibling_id, leaf.parent_page_id(), self.leaf_max_size);

            leaf.move_half_to(&mut sibling);
            sibling.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(sibling_id);

            (leaf.page_id(), leaf.parent_page_id(), sibling.key_at(0))
        };

        log::debug!("split leaf {left_id} into {sibling_id}");

        drop(leaf_guard);
        drop(sibling_guard);
        self.insert_into_parent(left_id, parent_id, sep_key, sibling_id, ctx)
    }

    /// Inserts the separator for a freshly split pair of siblings into their
    /// parent, growing a new root or splitting the parent as needed. The
    /// split children must already be unlatched; the parent (if any) is the
    /// deepest ancestor still held in the context.
    fn insert_into_parent(
        &self,
        left_id: PageId,
        left_parent_id: PageId,
        key: GenericKey<N>,
        right_id: PageId,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        if !left_parent_id.is_valid() {
            // the left node was the root: grow the tree by one level
            let mut root_guard = self.bpm.new_page_write()?;
            let new_root_id = root_guard.page_id();
            {
                let mut root = InternalPage::<N>::new(root_guard.data_mut());
                root.init(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                root.populate_new_root(left_id, &key, right_id);
            }
            drop(root_guard);

            for child_id in [left_id, right_id] {
                let mut child = self.bpm.fetch_write(child_id)?;
                write_parent_page_id(child.data_mut(), new_root_id);
            }

            self.set_root_id(ctx, new_root_id);
            self.update_root_record(new_root_id, false)?;
            log::debug!("grew new root {new_root_id}");

            ctx.release_ancestors();
            return Ok(());
        }

        let mut parent_guard = ctx
            .ancestors
            .pop()
            .ok_or_else(|| Error::Corrupted("split parent not held by descent".into()))?;

        let new_size = {
            let mut parent = InternalPage::<N>::new(parent_guard.data_mut());
            parent.insert_node_after(left_id, &key, right_id)
        };

        if new_size <= self.internal_max_size {
            return Ok(());
        }

        // parent overflowed in turn
        let mut sibling_guard = self.bpm.new_page_write()?;
        let sibling_id = sibling_guard.page_id();

        let (parent_id, grand_id, push_key) = {
            let mut parent = InternalPage::<N>::new(parent_guard.data_mut());
            let mut sibling = InternalPage::<N>::new(sibling_guard.data_mut());
            sibling.init(sibling_id, parent.parent_page_id(), self.internal_max_size);

            parent.move_half_to(&mut sibling, &self.bpm)?;
            // the key seated in the sibling's dummy slot separates the halves
            (parent.page_id(), parent.parent_page_id(), sibling.key_at(0))
        };

        log::debug!("split internal node {parent_id} into {sibling_id}");

        drop(parent_guard);
        drop(sibling_guard);
        self.insert_into_parent(parent_id, grand_id, push_key, sibling_id, ctx)
    }

    /// Restores the size invariant of an underflowing node, borrowing from or
    /// merging with a sibling, recursing up the held ancestor chain.
    fn coalesce_or_redistribute(
        &self,
        node_guard: WritePageGuard,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        let (node_id, is_root, size, min_size, max_size) = {
            let hdr = TreePageRef::new(node_guard.data());
            (
                hdr.page_id(),
                hdr.is_root(),
                hdr.size(),
                hdr.min_size(),
                hdr.max_size(),
            )
        };

        if is_root {
            return self.adjust_root(node_guard, ctx);
        }
        if size >= min_size {
            return Ok(());
        }

        let mut parent_guard = ctx
            .ancestors
            .pop()
            .ok_or_else(|| Error::Corrupted("underflow parent not held by descent".into()))?;

        let (index, sibling_id) = {
            let parent = InternalPageRef::<N>::new(parent_guard.data());
            let index = parent
                .value_index(node_id)
                .ok_or_else(|| Error::Corrupted("node missing from its parent".into()))?;
            let sibling_index = if index == 0 { 1 } else { index - 1 };
            (index, parent.value_at(sibling_index))
        };

        let sibling_guard = self.bpm.fetch_write(sibling_id)?;
        let sibling_size = TreePageRef::new(sibling_guard.data()).size();

        if size + sibling_size > max_size {
            self.redistribute(sibling_guard, node_guard, &mut parent_guard, index)
            // no structural change above: parent_guard drops here
        } else {
            self.coalesce(sibling_guard, node_guard, &mut parent_guard, index, ctx)?;
            self.coalesce_or_redistribute(parent_guard, ctx)
        }
    }

    /// Moves one boundary entry from the sibling into the node and refreshes
    /// the separator in the parent. `index` is the node's position in the
    /// parent; at position 0 the sibling is the right neighbour, otherwise
    /// the left.
    fn redistribute(
        &self,
        mut neighbor_guard: WritePageGuard,
        mut node_guard: WritePageGuard,
        parent_guard: &mut WritePageGuard,
        index: usize,
    ) -> Result<()> {
        let is_leaf = TreePageRef::new(node_guard.data()).is_leaf();

        if is_leaf {
            let mut node = LeafPage::<N>::new(node_guard.data_mut());
            let mut neighbor = LeafPage::<N>::new(neighbor_guard.data_mut());
            if index == 0 {
                neighbor.move_first_to_end_of(&mut node);
                let sep = neighbor.key_at(0);
                InternalPage::<N>::new(parent_guard.data_mut()).set_key_at(1, &sep);
            } else {
                neighbor.move_last_to_front_of(&mut node);
                let sep = node.key_at(0);
                InternalPage::<N>::new(parent_guard.data_mut()).set_key_at(index, &sep);
            }
        } else if index == 0 {
            let middle_key = InternalPageRef::<N>::new(parent_guard.data()).key_at(1);
            let mut node = InternalPage::<N>::new(node_guard.data_mut());
            let mut neighbor = InternalPage::<N>::new(neighbor_guard.data_mut());
            neighbor.move_first_to_end_of(&mut node, &middle_key, &self.bpm)?;
            let sep = neighbor.key_at(0);
            InternalPage::<N>::new(parent_guard.data_mut()).set_key_at(1, &sep);
        } else {
            let middle_key = InternalPageRef::<N>::new(parent_guard.data()).key_at(index);
            let mut node = InternalPage::<N>::new(node_guard.data_mut());
            let mut neighbor = InternalPage::<N>::new(neighbor_guard.data_mut());
            let borrowed = neighbor.move_last_to_front_of(&mut node, &middle_key, &self.bpm)?;
            InternalPage::<N>::new(parent_guard.data_mut()).set_key_at(index, &borrowed);
        }

        log::debug!("redistributed between siblings");
        Ok(())
    }

    /// Merges the node into its left neighbour (swapping roles when the node
    /// is leftmost), removes the separator from the parent and queues the
    /// emptied page for deletion. Both sibling latches are released before
    /// the caller recurses on the parent.
    fn coalesce(
        &self,
        neighbor_guard: WritePageGuard,
        node_guard: WritePageGuard,
        parent_guard: &mut WritePageGuard,
        index: usize,
        ctx: &mut Context<'_>,
    ) -> Result<()> {
        let (mut left_guard, mut right_guard, sep_index) = if index == 0 {
            (node_guard, neighbor_guard, 1)
        } else {
            (neighbor_guard, node_guard, index)
        };

        let middle_key = InternalPageRef::<N>::new(parent_guard.data()).key_at(sep_index);
        let (right_id, is_leaf) = {
            let hdr = TreePageRef::new(right_guard.data());
            (hdr.page_id(), hdr.is_leaf())
        };

        if is_leaf {
            let mut right = LeafPage::<N>::new(right_guard.data_mut());
            let mut left = LeafPage::<N>::new(left_guard.data_mut());
            right.move_all_to(&mut left);
        } else {
            let mut right = InternalPage::<N>::new(right_guard.data_mut());
            let mut left = InternalPage::<N>::new(left_guard.data_mut());
            right.move_all_to(&mut left, &middle_key, &self.bpm)?;
        }

        ctx.deleted.push(right_id);
        InternalPage::<N>::new(parent_guard.data_mut()).remove(sep_index);

        log::debug!("coalesced sibling {right_id} into its left neighbour");
        Ok(())
    }

    /// Handles underflow at the root: an internal root left with a single
    /// child hands the root role to that child; an emptied leaf root leaves
    /// the tree empty. Anything else is legal for a root.
    fn adjust_root(&self, mut root_guard: WritePageGuard, ctx: &mut Context<'_>) -> Result<()> {
        let (is_leaf, size, root_id) = {
            let hdr = TreePageRef::new(root_guard.data());
            (hdr.is_leaf(), hdr.size(), hdr.page_id())
        };

        if !is_leaf && size == 1 {
            let child_id = {
                let mut root = InternalPage::<N>::new(root_guard.data_mut());
                root.remove_and_return_only_child()
            };
            drop(root_guard);

            {
                let mut child = self.bpm.fetch_write(child_id)?;
                write_parent_page_id(child.data_mut(), INVALID_PAGE_ID);
            }

            self.set_root_id(ctx, child_id);
            self.update_root_record(child_id, false)?;
            ctx.deleted.push(root_id);
            log::debug!("collapsed root into its only child {child_id}");
        } else if is_leaf && size == 0 {
            drop(root_guard);

            self.set_root_id(ctx, INVALID_PAGE_ID);
            self.update_root_record(INVALID_PAGE_ID, false)?;
            ctx.deleted.push(root_id);
            log::debug!("emptied tree for {}", self.index_name);
        }

        Ok(())
    }

    /// Updates the root page id through the context's token; the token is
    /// present whenever a root change is possible.
    fn set_root_id(&self, ctx: &mut Context<'_>, root_id: PageId) {
        match ctx.root.as_mut() {
            Some(token) => **token = root_id,
            None => *self.root_page_id.lock() = root_id,
        }
    }

    /// Mirrors the root page id into the header page record for this index.
    fn update_root_record(&self, root_id: PageId, insert: bool) -> Result<()> {
        let mut guard = self.bpm.fetch_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        if insert {
            header.insert_record(&self.index_name, root_id)?;
        } else if !header.update_record(&self.index_name, root_id) {
            header.insert_record(&self.index_name, root_id)?;
        }
        Ok(())
    }
}

/// Record id derived from an integer key, used by the file bulk loaders.
fn record_for_key(value: i64) -> RecordId {
    RecordId::new(
        PageId::new((value >> 16) as u32),
        SlotId::new((value & 0xFFFF) as u16),
    )
}
