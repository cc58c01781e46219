//! Fixed-window physical frame arena with per-frame reference counts.
//!
//! The kernel hands this allocator one contiguous physical window plus the
//! virtual offset it is mapped at; frame handles are physical addresses and
//! `table_ptr`/`page_ptr` translate through the offset. Host tests construct
//! the same type over a heap-backed window, so the page-table walks in
//! `paging` run unmodified.

use spin::Mutex;
use x86_64::structures::paging::{PageTable, PhysFrame};
use x86_64::PhysAddr;

use crate::config::PAGE_SIZE;
use crate::memory::PageAllocator;

/// Largest window the arena will manage (16 MiB).
pub const MAX_FRAMES: usize = 4096;

struct ArenaInner {
    /// Array-backed stack of free frame indices.
    free: [u16; MAX_FRAMES],
    free_len: usize,
    /// Reference counts, indexed by frame number within the window.
    refs: [u16; MAX_FRAMES],
}

pub struct ArenaFrameAllocator {
    /// Virtual address of the first byte of the window.
    base: usize,
    /// Physical address of the first frame of the window.
    phys_base: u64,
    nframes: usize,
    inner: Mutex<ArenaInner>,
}

impl ArenaFrameAllocator {
    /// Builds an arena over `nframes` page frames starting at `base` in the
    /// kernel's view of memory, reported as physical frames starting at
    /// `phys_base`. All frames start on the free list, seeded so allocation
    /// proceeds in increasing frame order.
    ///
    /// # Safety
    ///
    /// `base` must point to `nframes * PAGE_SIZE` bytes of page-aligned
    /// memory owned exclusively by this allocator for its lifetime.
    pub unsafe fn new(base: *mut u8, phys_base: PhysAddr, nframes: usize) -> Self {
        assert!(nframes <= MAX_FRAMES);
        assert!(base as usize % PAGE_SIZE == 0);
        assert!(phys_base.is_aligned(PAGE_SIZE as u64));

        let mut inner = ArenaInner {
            free: [0; MAX_FRAMES],
            free_len: nframes,
            refs: [0; MAX_FRAMES],
        };
        for i in 0..nframes {
            inner.free[i] = (nframes - 1 - i) as u16;
        }

        Self {
            base: base as usize,
            phys_base: phys_base.as_u64(),
            nframes,
            inner: Mutex::new(inner),
        }
    }

    /// Frame-number within the window, or `None` for unmanaged frames.
    fn index_of(&self, frame: PhysFrame) -> Option<usize> {
        let pa = frame.start_address().as_u64();
        if pa < self.phys_base {
            return None;
        }
        let idx = ((pa - self.phys_base) as usize) / PAGE_SIZE;
        (idx < self.nframes).then_some(idx)
    }

    fn frame_at(&self, idx: usize) -> PhysFrame {
        PhysFrame::containing_address(PhysAddr::new(self.phys_base + (idx * PAGE_SIZE) as u64))
    }
}

impl PageAllocator for ArenaFrameAllocator {
    fn alloc_page(&self, zero: bool) -> Option<PhysFrame> {
        let idx = {
            let mut inner = self.inner.lock();
            if inner.free_len == 0 {
                return None;
            }
            inner.free_len -= 1;
            let i = inner.free[inner.free_len] as usize;
            debug_assert_eq!(inner.refs[i], 0);
            i
        };

        let frame = self.frame_at(idx);
        if zero {
            // The window is exclusively ours and the frame just left the
            // free list, so nothing else aliases it.
            unsafe { core::ptr::write_bytes(self.page_ptr(frame), 0, PAGE_SIZE) };
        }
        Some(frame)
    }

    fn free_page(&self, frame: PhysFrame) {
        let Some(idx) = self.index_of(frame) else {
            return;
        };
        let mut inner = self.inner.lock();
        debug_assert_eq!(inner.refs[idx], 0, "freeing a referenced page");
        let len = inner.free_len;
        debug_assert!(len < self.nframes, "double free");
        inner.free[len] = idx as u16;
        inner.free_len = len + 1;
    }

    fn incref(&self, frame: PhysFrame) {
        if let Some(idx) = self.index_of(frame) {
            self.inner.lock().refs[idx] += 1;
        }
    }

    fn decref(&self, frame: PhysFrame) -> bool {
        let Some(idx) = self.index_of(frame) else {
            return false;
        };
        let freed = {
            let mut inner = self.inner.lock();
            debug_assert!(inner.refs[idx] > 0, "decref of unreferenced page");
            inner.refs[idx] -= 1;
            inner.refs[idx] == 0
        };
        if freed {
            self.free_page(frame);
        }
        freed
    }

    fn refcount(&self, frame: PhysFrame) -> u16 {
        self.index_of(frame)
            .map(|idx| self.inner.lock().refs[idx])
            .unwrap_or(0)
    }

    fn table_ptr(&self, frame: PhysFrame) -> *mut PageTable {
        self.page_ptr(frame) as *mut PageTable
    }

    fn page_ptr(&self, frame: PhysFrame) -> *mut u8 {
        let pa = frame.start_address().as_u64();
        debug_assert!(self.index_of(frame).is_some(), "translating unmanaged frame");
        (self.base + (pa - self.phys_base) as usize) as *mut u8
    }

    fn free_pages(&self) -> usize {
        self.inner.lock().free_len
    }

    fn used_pages(&self) -> usize {
        self.nframes - self.free_pages()
    }
}
