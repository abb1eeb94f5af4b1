use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Error, FrameId, PageId, Result, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{Frame, LruReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping protected by the pool mutex.
struct PoolInner {
    /// Maps resident page ids to their frames
    page_table: HashMap<PageId, FrameId>,
    /// Frames currently holding no page; consulted before the replacer
    free_list: VecDeque<FrameId>,
}

/// State shared between the pool and the page guards it hands out.
pub(crate) struct PoolShared {
    frames: Vec<Arc<Frame>>,
    inner: Mutex<PoolInner>,
    replacer: LruReplacer,
}

impl PoolShared {
    /// Returns the pin taken by a fetch. Decrements the pin count, ORs the
    /// dirty flag, and hands the frame to the replacer when the count reaches
    /// zero. Returns false for an unknown page or a pin count already at 0.
    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };
        let frame = &self.frames[frame_id.as_usize()];

        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.unpin(frame_id);
                }
                true
            }
        }
    }
}

/// BufferPoolManager makes the paged database file appear as a set of
/// memory-resident frames. It owns the page table, the free list and the
/// LRU replacer, all serialized under one pool mutex, and performs disk I/O
/// through the disk scheduler. Each successful fetch transfers exactly one
/// pin to the caller.
pub struct BufferPoolManager {
    pool_size: usize,
    shared: Arc<PoolShared>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let shared = Arc::new(PoolShared {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
        });

        Self {
            pool_size,
            shared,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Fetches a page into the pool, pinning its frame. The caller owes
    /// exactly one unpin_page for the returned frame.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id));
        }

        let mut inner = self.shared.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.shared.frames[frame_id.as_usize()];
            frame.pin();
            self.shared.replacer.pin(frame_id);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.shared.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.read_sync(page_id, &mut data) {
            inner.free_list.push_back(frame_id);
            return Err(e);
        }
        frame.copy_from(&data);

        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        self.shared.replacer.pin(frame_id);

        Ok(Arc::clone(frame))
    }

    /// Allocates a fresh page id, binds it to a zeroed, pinned frame and
    /// returns the frame. The caller owes one unpin_page.
    pub fn new_page(&self) -> Result<Arc<Frame>> {
        let mut inner = self.shared.inner.lock();

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.shared.frames[frame_id.as_usize()];

        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                inner.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        self.shared.replacer.pin(frame_id);

        log::trace!("allocated new page {page_id}");
        Ok(Arc::clone(frame))
    }

    /// Returns a pin taken by fetch_page/new_page. See PoolShared::unpin_page.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.shared.unpin_page(page_id, is_dirty)
    }

    /// Writes a resident page back to disk and clears its dirty flag.
    /// Returns false for an invalid or non-resident page id.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }

        let inner = self.shared.inner.lock();
        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let frame = &self.shared.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.disk_scheduler.write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Drops a page from the pool and retires its id. A page that is not
    /// resident deletes trivially; a pinned page cannot be deleted.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.shared.inner.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => {
                self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
                return Ok(true);
            }
        };
        let frame = &self.shared.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.write_sync(page_id, &data)?;
        }

        inner.page_table.remove(&page_id);
        self.shared.replacer.pin(frame_id);
        frame.reset();
        inner.free_list.push_back(frame_id);
        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;

        log::trace!("deleted page {page_id}");
        Ok(true)
    }

    /// Writes every resident page back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.shared.inner.lock();

        for (&page_id, &frame_id) in inner.page_table.iter() {
            let frame = &self.shared.frames[frame_id.as_usize()];
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Fetches a page and read-latches it. The guard releases the latch and
    /// the pin on drop.
    pub fn fetch_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.fetch_page(page_id)?;
        Ok(unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.shared)) })
    }

    /// Fetches a page and write-latches it. The guard releases the latch and
    /// the pin on drop, carrying the dirty flag if the page was mutated.
    pub fn fetch_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.fetch_page(page_id)?;
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.shared)) })
    }

    /// Allocates a fresh page and write-latches it.
    pub fn new_page_write(&self) -> Result<WritePageGuard> {
        let frame = self.new_page()?;
        let page_id = frame.page_id();
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.shared)) })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.shared.inner.lock().free_list.len()
    }

    pub fn replacer_size(&self) -> usize {
        self.shared.replacer.size()
    }

    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.shared.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.shared.frames[frame_id.as_usize()].pin_count())
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Picks a frame for a new page binding: front of the free list if any,
    /// else the replacer's victim, writing back its page if dirty. Called
    /// with the pool mutex held.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.shared.replacer.victim().ok_or(Error::OutOfMemory)?;
        let frame = &self.shared.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            log::trace!("writing back dirty victim {old_page_id} from {frame_id}");
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            if let Err(e) = self.disk_scheduler.write_sync(old_page_id, &data) {
                // keep the frame reachable for a later eviction attempt
                self.shared.replacer.unpin(frame_id);
                return Err(e);
            }
        }

        inner.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}
