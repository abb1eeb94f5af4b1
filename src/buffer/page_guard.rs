use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolShared;
use super::Frame;

/// RAII guard for read access to a pinned page. Holds the frame's read latch
/// for its lifetime; dropping the guard releases the latch first and then
/// returns the pin to the pool.
pub struct ReadPageGuard {
    page_id: PageId,
    /// Read latch on the frame bytes, released before the unpin
    data: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    /// Keeps the latched frame alive for the transmuted guard above
    _frame: Arc<Frame>,
    pool: Arc<PoolShared>,
}

impl ReadPageGuard {
    /// # Safety
    /// The transmuted latch guard must not outlive the frame; the Arc held
    /// alongside it guarantees that.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<Frame>, pool: Arc<PoolShared>) -> Self {
        let data = frame.data.read();
        let data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);

        Self {
            page_id,
            data: Some(data),
            _frame: frame,
            pool,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        // data is always Some until drop
        &self.data.as_ref().expect("guard already released")[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.data.take();
        self.pool.unpin_page(self.page_id, false);
    }
}

/// RAII guard for exclusive access to a pinned page. Mutable access marks the
/// page dirty; dropping the guard releases the write latch and unpins with
/// the accumulated dirty flag.
pub struct WritePageGuard {
    page_id: PageId,
    data: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    _frame: Arc<Frame>,
    pool: Arc<PoolShared>,
    is_dirty: bool,
}

impl WritePageGuard {
    /// # Safety
    /// The transmuted latch guard must not outlive the frame; the Arc held
    /// alongside it guarantees that.
    pub(crate) unsafe fn new(page_id: PageId, frame: Arc<Frame>, pool: Arc<PoolShared>) -> Self {
        let data = frame.data.write();
        let data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);

        Self {
            page_id,
            data: Some(data),
            _frame: frame,
            pool,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data.as_ref().expect("guard already released")[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data.as_mut().expect("guard already released")[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data.take();
        self.pool.unpin_page(self.page_id, self.is_dirty);
    }
}
