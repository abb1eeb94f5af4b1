use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result};

use super::btree_page::LeafPageRef;
use super::key::GenericKey;

/// Forward cursor over the leaf chain. The iterator owns exactly one
/// read-latched, pinned leaf at a time and walks the sibling pointers
/// hand-over-hand: the next leaf is latched before the current one is
/// released. An iterator over an empty tree holds no leaf and is immediately
/// at its end.
pub struct TreeIterator<const N: usize> {
    bpm: Arc<BufferPoolManager>,
    leaf: Option<ReadPageGuard>,
    index: usize,
}

impl<const N: usize> TreeIterator<N> {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        leaf: Option<ReadPageGuard>,
        index: usize,
    ) -> Result<Self> {
        let mut iter = Self { bpm, leaf, index };
        iter.skip_exhausted()?;
        Ok(iter)
    }

    /// True once the cursor stands one past the last pair of the rightmost
    /// leaf.
    pub fn is_end(&self) -> bool {
        match &self.leaf {
            None => true,
            Some(guard) => {
                let view = LeafPageRef::<N>::new(guard.data());
                !view.next_page_id().is_valid() && self.index == view.size()
            }
        }
    }

    /// The pair under the cursor, or None at the end.
    pub fn item(&self) -> Option<(GenericKey<N>, RecordId)> {
        let guard = self.leaf.as_ref()?;
        let view = LeafPageRef::<N>::new(guard.data());
        if self.index < view.size() {
            Some(view.item(self.index))
        } else {
            None
        }
    }

    /// Steps to the next pair, hopping to the next leaf when the current one
    /// is exhausted. A cursor at the end stays there.
    pub fn advance(&mut self) -> Result<()> {
        if self.leaf.is_some() && !self.is_end() {
            self.index += 1;
            self.skip_exhausted()?;
        }
        Ok(())
    }

    /// Hops forward while the cursor sits past the current leaf's last pair
    /// and a right sibling exists, latching the sibling before releasing the
    /// current leaf.
    fn skip_exhausted(&mut self) -> Result<()> {
        loop {
            let Some(guard) = &self.leaf else {
                return Ok(());
            };
            let (size, next) = {
                let view = LeafPageRef::<N>::new(guard.data());
                (view.size(), view.next_page_id())
            };
            if self.index < size || !next.is_valid() {
                return Ok(());
            }
            let next_guard = self.bpm.fetch_read(next)?;
            self.leaf = Some(next_guard);
            self.index = 0;
        }
    }
}

impl<const N: usize> PartialEq for TreeIterator<N> {
    fn eq(&self, other: &Self) -> bool {
        let own = self.leaf.as_ref().map(|g| g.page_id());
        let theirs = other.leaf.as_ref().map(|g| g.page_id());
        own == theirs && self.index == other.index
    }
}

impl<const N: usize> Iterator for TreeIterator<N> {
    type Item = (GenericKey<N>, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.item()?;
        self.advance().ok()?;
        Some(item)
    }
}
