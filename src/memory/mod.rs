//! Physical-page management: the allocator collaborator interface and the
//! per-task address spaces built on top of it.

pub mod frames;
pub mod paging;

pub use frames::ArenaFrameAllocator;
pub use paging::AddressSpace;

use x86_64::structures::paging::{PageTable, PhysFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    OutOfMemory,
}

/// Physical-page collaborator.
///
/// Shared page-table pages are reference counted across address spaces:
/// `incref`/`decref` track the sharing, and `decref` returns the page to the
/// free pool when the last reference drops. Frames outside the allocator's
/// managed window (the statically placed program image) are ignored by the
/// refcounting calls.
pub trait PageAllocator: Sync {
    /// Takes a page from the free pool, optionally zeroed. The page starts
    /// with a reference count of zero; mapping it increments the count.
    fn alloc_page(&self, zero: bool) -> Option<PhysFrame>;

    /// Returns an unreferenced page to the free pool.
    fn free_page(&self, frame: PhysFrame);

    fn incref(&self, frame: PhysFrame);

    /// Drops one reference; frees the page and returns `true` when the
    /// count reaches zero.
    fn decref(&self, frame: PhysFrame) -> bool;

    fn refcount(&self, frame: PhysFrame) -> u16;

    /// Translates a managed frame to a kernel-accessible page-table pointer.
    fn table_ptr(&self, frame: PhysFrame) -> *mut PageTable;

    /// Translates a managed frame to a kernel-accessible byte pointer.
    fn page_ptr(&self, frame: PhysFrame) -> *mut u8;

    fn free_pages(&self) -> usize;

    fn used_pages(&self) -> usize;
}
