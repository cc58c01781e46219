//! # Test Environment
//!
//! Shared fixtures for exercising the kernel on the host: page-aligned
//! backing memory for the frame arena, a recording console, and (for unit
//! tests) leak-based constructors for a fully wired
//! [`Kernel`](crate::kernel::Kernel).
//!
//! Everything here except the `#[cfg(test)]` helpers is `no_std`-clean, so
//! integration tests build their own arenas and kernels from these pieces.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::devices::{Console, InputQueue};

/// One page of page-aligned backing memory for a test arena.
#[repr(align(4096))]
#[derive(Clone, Copy)]
pub struct PageBuf(pub [u8; 4096]);

impl PageBuf {
    pub const ZERO: PageBuf = PageBuf([0; 4096]);
}

const OUT_CAPACITY: usize = 4096;

struct OutBuf {
    bytes: [u8; OUT_CAPACITY],
    len: usize,
}

/// Console double that records everything the kernel does to it.
pub struct MockConsole {
    out: Mutex<OutBuf>,
    input: InputQueue,
    color: Mutex<(u8, u8)>,
    clears: AtomicUsize,
}

impl MockConsole {
    pub const fn new() -> Self {
        Self {
            out: Mutex::new(OutBuf {
                bytes: [0; OUT_CAPACITY],
                len: 0,
            }),
            input: InputQueue::new(),
            color: Mutex::new((0, 0)),
            clears: AtomicUsize::new(0),
        }
    }

    /// Runs `f` over everything written so far.
    pub fn with_output<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let out = self.out.lock();
        f(&out.bytes[..out.len])
    }

    pub fn color(&self) -> (u8, u8) {
        *self.color.lock()
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::Relaxed)
    }
}

impl Default for MockConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for MockConsole {
    fn putch(&self, byte: u8) {
        let mut out = self.out.lock();
        if out.len < OUT_CAPACITY {
            let len = out.len;
            out.bytes[len] = byte;
            out.len = len + 1;
        }
    }

    fn getc(&self) -> Option<u8> {
        self.input.pop()
    }

    fn push_input(&self, byte: u8) {
        self.input.push(byte);
    }

    fn set_text_color(&self, fg: u8, bg: u8) {
        *self.color.lock() = (fg, bg);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
pub use host::{kernel_root_for_test, syscall_frame, test_arena, test_kernel};

#[cfg(test)]
mod host {
    use super::{MockConsole, PageBuf};
    use x86_64::structures::paging::{PageTableFlags, PhysFrame};
    use x86_64::PhysAddr;

    use crate::devices::NO_FS;
    use crate::kernel::{ArchOps, Kernel};
    use crate::loader::ProgramImage;
    use crate::memory::{ArenaFrameAllocator, PageAllocator};
    use crate::task::TaskId;
    use crate::trap::{Trapframe, T_SYSCALL};

    /// Physical base reported for test arenas. Far above the program-image
    /// window, so image frames stay unmanaged like on hardware.
    const TEST_PHYS_BASE: u64 = 0x4000_0000;

    /// Pages behind a full test kernel: enough for a maxed-out task table.
    const KERNEL_ARENA_PAGES: usize = 2048;

    /// Leaks a frame arena over `n` fresh pages of heap.
    pub fn test_arena(n: usize) -> &'static ArenaFrameAllocator {
        let backing = Box::leak(vec![PageBuf::ZERO; n].into_boxed_slice());
        let alloc = unsafe {
            ArenaFrameAllocator::new(
                backing.as_mut_ptr() as *mut u8,
                PhysAddr::new(TEST_PHYS_BASE),
                n,
            )
        };
        Box::leak(Box::new(alloc))
    }

    /// A minimal kernel page-table root with one populated upper-half slot,
    /// standing in for the boot environment's kernel mappings.
    pub fn kernel_root_for_test(alloc: &dyn PageAllocator) -> PhysFrame {
        let root = alloc.alloc_page(true).unwrap();
        let shared = alloc.alloc_page(true).unwrap();
        alloc.incref(shared);
        let p4 = unsafe { &mut *alloc.table_ptr(root) };
        p4[crate::config::KERNEL_HALF_START].set_addr(
            shared.start_address(),
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
        );
        root
    }

    /// A fully wired kernel over mocks: arena-backed memory, recording
    /// console, no filesystem, no-op privileged operations.
    pub fn test_kernel(ncpus: usize) -> (&'static Kernel, &'static MockConsole) {
        let alloc = test_arena(KERNEL_ARENA_PAGES);
        let console: &'static MockConsole = Box::leak(Box::new(MockConsole::new()));
        let kernel = Kernel::new(alloc, console, &NO_FS, ArchOps::noop(), ncpus)
            .expect("test arena fits the idle tasks");
        (Box::leak(Box::new(kernel)), console)
    }

    /// A trapframe as the syscall entry stub would push it.
    pub fn syscall_frame(num: u64, args: [u64; 5]) -> Trapframe {
        let mut tf = Trapframe {
            trapno: T_SYSCALL as u64,
            ..Default::default()
        };
        tf.regs.rax = num;
        tf.regs.rdx = args[0];
        tf.regs.rcx = args[1];
        tf.regs.rbx = args[2];
        tf.regs.rdi = args[3];
        tf.regs.rsi = args[4];
        tf
    }

    impl Kernel {
        /// Spawns a user task from the default image window, panicking on
        /// failure. Unit-test convenience.
        pub fn spawn_root_for_test(&self) -> TaskId {
            self.spawn_root(&ProgramImage::default_window(
                crate::config::PROG_IMAGE_BASE,
            ))
            .expect("test arena fits another task")
        }
    }
}
