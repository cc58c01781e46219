//! Per-task address spaces.
//!
//! Every task exclusively owns a four-level page-table tree rooted at
//! `root`. The upper half (slots 256..512) is shared with the kernel by
//! copying the kernel root's entries and reference-counting the tables they
//! point at; one slot is a recursive self-mapping used for introspection.
//! All table memory is reached through the [`PageAllocator`] translation,
//! never through the active mapping, so the same walks run on the host.

use x86_64::structures::paging::{PageTable, PageTableFlags, PhysFrame};
use x86_64::VirtAddr;

use crate::config::{
    KERNEL_HALF_START, PAGE_SIZE, RECURSIVE_SLOT, USER_STACK_SIZE, USER_STACK_TOP,
};
use crate::memory::{MemError, PageAllocator};

const USER_FLAGS: PageTableFlags = PageTableFlags::PRESENT
    .union(PageTableFlags::WRITABLE)
    .union(PageTableFlags::USER_ACCESSIBLE);

/// An exclusively owned page-directory tree.
pub struct AddressSpace {
    root: PhysFrame,
}

impl AddressSpace {
    /// Builds a fresh address space: copies the kernel root's upper-half
    /// entries (bumping each target table's reference count), installs the
    /// recursive self-slot, and takes one reference on the root itself.
    pub fn new(alloc: &dyn PageAllocator, kernel_root: PhysFrame) -> Result<Self, MemError> {
        let root = alloc.alloc_page(true).ok_or(MemError::OutOfMemory)?;

        let src = unsafe { &*alloc.table_ptr(kernel_root) };
        let dst = unsafe { &mut *alloc.table_ptr(root) };
        for i in KERNEL_HALF_START..512 {
            if i == RECURSIVE_SLOT {
                continue;
            }
            let entry = &src[i];
            if !entry.is_unused() {
                dst[i].set_addr(entry.addr(), entry.flags());
                alloc.incref(PhysFrame::containing_address(entry.addr()));
            }
        }

        dst[RECURSIVE_SLOT].set_addr(
            root.start_address(),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
        );
        alloc.incref(root);

        Ok(Self { root })
    }

    pub fn root(&self) -> PhysFrame {
        self.root
    }

    /// Walks to the level-1 entry for `va`, allocating intermediate tables
    /// when `create` is set. New tables are zeroed and reference-counted.
    fn walk<'a>(
        &self,
        alloc: &'a dyn PageAllocator,
        va: VirtAddr,
        create: bool,
    ) -> Result<Option<&'a mut x86_64::structures::paging::page_table::PageTableEntry>, MemError>
    {
        let indices = [va.p4_index(), va.p3_index(), va.p2_index()];
        let mut table = unsafe { &mut *alloc.table_ptr(self.root) };

        for idx in indices {
            let entry = &mut table[idx];
            let next = if entry.is_unused() {
                if !create {
                    return Ok(None);
                }
                let frame = alloc.alloc_page(true).ok_or(MemError::OutOfMemory)?;
                entry.set_addr(frame.start_address(), USER_FLAGS);
                alloc.incref(frame);
                frame
            } else {
                PhysFrame::containing_address(entry.addr())
            };
            table = unsafe { &mut *alloc.table_ptr(next) };
        }

        Ok(Some(&mut table[va.p1_index()]))
    }

    /// Maps one page and takes a reference on the mapped frame.
    pub fn map(
        &self,
        alloc: &dyn PageAllocator,
        va: VirtAddr,
        frame: PhysFrame,
        flags: PageTableFlags,
    ) -> Result<(), MemError> {
        let entry = self
            .walk(alloc, va, true)?
            .expect("walk with create returns an entry");
        debug_assert!(entry.is_unused(), "mapping over a present entry");
        entry.set_addr(frame.start_address(), flags);
        alloc.incref(frame);
        Ok(())
    }

    /// Removes the mapping for `va`, dropping the frame's reference (which
    /// frees it when this was the last one). Returns the unmapped frame.
    pub fn unmap(&self, alloc: &dyn PageAllocator, va: VirtAddr) -> Option<PhysFrame> {
        let entry = self.walk(alloc, va, false).ok().flatten()?;
        if entry.is_unused() {
            return None;
        }
        let frame = PhysFrame::containing_address(entry.addr());
        entry.set_unused();
        alloc.decref(frame);
        Some(frame)
    }

    pub fn lookup(&self, alloc: &dyn PageAllocator, va: VirtAddr) -> Option<PhysFrame> {
        let entry = self.walk(alloc, va, false).ok().flatten()?;
        if entry.is_unused() {
            None
        } else {
            Some(PhysFrame::containing_address(entry.addr()))
        }
    }

    /// Allocates and maps the fixed user stack below [`USER_STACK_TOP`].
    pub fn map_user_stack(&self, alloc: &dyn PageAllocator) -> Result<(), MemError> {
        let mut va = USER_STACK_TOP - USER_STACK_SIZE;
        while va < USER_STACK_TOP {
            let frame = alloc.alloc_page(true).ok_or(MemError::OutOfMemory)?;
            if let Err(e) = self.map(alloc, VirtAddr::new(va), frame, USER_FLAGS) {
                // Not yet referenced by any entry; hand it straight back.
                alloc.free_page(frame);
                return Err(e);
            }
            va += PAGE_SIZE as u64;
        }
        Ok(())
    }

    /// Unmaps and releases the user stack pages. Must run before [`destroy`].
    pub fn free_user_stack(&self, alloc: &dyn PageAllocator) {
        let mut va = USER_STACK_TOP - USER_STACK_SIZE;
        while va < USER_STACK_TOP {
            self.unmap(alloc, VirtAddr::new(va));
            va += PAGE_SIZE as u64;
        }
    }

    /// Copies the source task's stack contents page-by-page into this
    /// address space. Both stacks must already be mapped.
    pub fn copy_stack_from(&self, alloc: &dyn PageAllocator, src: &AddressSpace) {
        let mut va = USER_STACK_TOP - USER_STACK_SIZE;
        while va < USER_STACK_TOP {
            let from = src.lookup(alloc, VirtAddr::new(va));
            let to = self.lookup(alloc, VirtAddr::new(va));
            if let (Some(from), Some(to)) = (from, to) {
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        alloc.page_ptr(from),
                        alloc.page_ptr(to),
                        PAGE_SIZE,
                    );
                }
            }
            va += PAGE_SIZE as u64;
        }
    }

    /// Tears the tree down: deep-frees the user half, drops the shared
    /// references on the kernel half, then drops the root's own reference.
    ///
    /// The caller must have switched the CPU off this address space first
    /// and must already have released the user stack pages; remaining leaf
    /// entries in the user half are the shared program-image frames, which
    /// the allocator does not manage.
    pub fn destroy(self, alloc: &dyn PageAllocator) {
        let p4 = unsafe { &mut *alloc.table_ptr(self.root) };

        for i in 0..KERNEL_HALF_START {
            let entry = &mut p4[i];
            if !entry.is_unused() {
                let child = PhysFrame::containing_address(entry.addr());
                free_branch(alloc, child, 3);
                alloc.decref(child);
                entry.set_unused();
            }
        }

        for i in KERNEL_HALF_START..512 {
            if i == RECURSIVE_SLOT {
                continue;
            }
            let entry = &mut p4[i];
            if !entry.is_unused() {
                alloc.decref(PhysFrame::containing_address(entry.addr()));
                entry.set_unused();
            }
        }

        // Drops the reference the recursive slot took at creation.
        alloc.decref(self.root);
    }
}

/// Releases every table page below `table`. At the leaf level only the
/// frame references are dropped; unmanaged frames are no-ops.
fn free_branch(alloc: &dyn PageAllocator, table: PhysFrame, level: u8) {
    let t = unsafe { &mut *alloc.table_ptr(table) };
    for entry in t.iter_mut() {
        if entry.is_unused() {
            continue;
        }
        let frame = PhysFrame::containing_address(entry.addr());
        if level > 1 {
            free_branch(alloc, frame, level - 1);
        }
        alloc.decref(frame);
        entry.set_unused();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::test_arena;

    fn kernel_root(alloc: &dyn PageAllocator) -> PhysFrame {
        // A minimal "kernel" root with one shared upper-half table.
        let root = alloc.alloc_page(true).unwrap();
        let shared = alloc.alloc_page(true).unwrap();
        alloc.incref(shared);
        let p4 = unsafe { &mut *alloc.table_ptr(root) };
        p4[KERNEL_HALF_START].set_addr(
            shared.start_address(),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
        );
        root
    }

    #[test]
    fn new_space_shares_kernel_half_and_self_maps() {
        let alloc = test_arena(64);
        let kroot = kernel_root(alloc);
        let shared_before = alloc.used_pages();

        let space = AddressSpace::new(alloc, kroot).unwrap();
        let p4 = unsafe { &*alloc.table_ptr(space.root()) };

        let kp4 = unsafe { &*alloc.table_ptr(kroot) };
        assert_eq!(p4[KERNEL_HALF_START].addr(), kp4[KERNEL_HALF_START].addr());
        assert_eq!(p4[RECURSIVE_SLOT].addr(), space.root().start_address());

        let shared = PhysFrame::containing_address(kp4[KERNEL_HALF_START].addr());
        assert_eq!(alloc.refcount(shared), 2);
        assert_eq!(alloc.used_pages(), shared_before + 1);
    }

    #[test]
    fn destroy_restores_page_accounting() {
        let alloc = test_arena(64);
        let kroot = kernel_root(alloc);
        let baseline = alloc.used_pages();

        let space = AddressSpace::new(alloc, kroot).unwrap();
        space.map_user_stack(alloc).unwrap();
        assert!(alloc.used_pages() > baseline);

        space.free_user_stack(alloc);
        space.destroy(alloc);
        assert_eq!(alloc.used_pages(), baseline);
    }

    #[test]
    fn map_unmap_roundtrip() {
        let alloc = test_arena(64);
        let kroot = kernel_root(alloc);
        let space = AddressSpace::new(alloc, kroot).unwrap();

        let va = VirtAddr::new(0x40_0000);
        let frame = alloc.alloc_page(true).unwrap();
        space.map(alloc, va, frame, USER_FLAGS).unwrap();

        assert_eq!(space.lookup(alloc, va), Some(frame));
        assert_eq!(alloc.refcount(frame), 1);

        assert_eq!(space.unmap(alloc, va), Some(frame));
        assert_eq!(space.lookup(alloc, va), None);
        assert_eq!(alloc.refcount(frame), 0);
    }

    #[test]
    fn stack_copy_duplicates_contents() {
        let alloc = test_arena(128);
        let kroot = kernel_root(alloc);

        let parent = AddressSpace::new(alloc, kroot).unwrap();
        parent.map_user_stack(alloc).unwrap();
        let child = AddressSpace::new(alloc, kroot).unwrap();
        child.map_user_stack(alloc).unwrap();

        let va = VirtAddr::new(USER_STACK_TOP - PAGE_SIZE as u64);
        let pframe = parent.lookup(alloc, va).unwrap();
        unsafe { core::ptr::write_bytes(alloc.page_ptr(pframe), 0x5A, PAGE_SIZE) };

        child.copy_stack_from(alloc, &parent);

        let cframe = child.lookup(alloc, va).unwrap();
        assert_ne!(cframe, pframe);
        let bytes = unsafe { core::slice::from_raw_parts(alloc.page_ptr(cframe), PAGE_SIZE) };
        assert!(bytes.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn exhaustion_surfaces_as_out_of_memory() {
        let alloc = test_arena(4);
        let kroot = kernel_root(alloc);
        let space = AddressSpace::new(alloc, kroot).unwrap();
        // 2 pages remain; the 16-page stack cannot fit.
        assert_eq!(space.map_user_stack(alloc), Err(MemError::OutOfMemory));
    }
}
