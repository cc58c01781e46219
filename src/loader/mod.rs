//! The statically placed user program image.
//!
//! Boot firmware deposits the user program at a fixed physical address;
//! every user task sees it through the same identity-mapped window, so fork
//! shares the code pages instead of copying them. The image frames sit
//! outside the page allocator's managed window and are never refcounted or
//! freed.

use x86_64::structures::paging::{PageTableFlags, PhysFrame};
use x86_64::{PhysAddr, VirtAddr};

use crate::config::{PAGE_SIZE, PROG_IMAGE_BASE, PROG_IMAGE_PAGES};
use crate::memory::{AddressSpace, MemError, PageAllocator};

/// A loaded user program: where it sits and where execution starts.
#[derive(Debug, Clone, Copy)]
pub struct ProgramImage {
    pub phys_base: u64,
    pub pages: usize,
    pub entry: u64,
}

impl ProgramImage {
    /// The fixed boot-time window with the given entry point.
    pub fn default_window(entry: u64) -> Self {
        Self {
            phys_base: PROG_IMAGE_BASE,
            pages: PROG_IMAGE_PAGES,
            entry,
        }
    }
}

/// Identity-maps the shared image window into `space` with user
/// permissions.
pub fn map_image(alloc: &dyn PageAllocator, space: &AddressSpace) -> Result<(), MemError> {
    let flags =
        PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
    for i in 0..PROG_IMAGE_PAGES {
        let addr = PROG_IMAGE_BASE + (i * PAGE_SIZE) as u64;
        space.map(
            alloc,
            VirtAddr::new(addr),
            PhysFrame::containing_address(PhysAddr::new(addr)),
            flags,
        )?;
    }
    Ok(())
}
