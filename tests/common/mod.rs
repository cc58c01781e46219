//! Shared fixture for the integration tests: a kernel wired over a
//! heap-backed frame arena, a recording console and no-op privileged
//! operations, booted the way the real init path wires things.

use taskos::config::PROG_IMAGE_BASE;
use taskos::devices::NO_FS;
use taskos::kernel::{ArchOps, Kernel};
use taskos::loader::ProgramImage;
use taskos::memory::ArenaFrameAllocator;
use taskos::test_env::{MockConsole, PageBuf};
use x86_64::PhysAddr;

pub const ARENA_PAGES: usize = 2048;

/// Reported physical base of the arena; far from the program-image window
/// so image frames stay unmanaged.
const PHYS_BASE: u64 = 0x4000_0000;

pub fn boot(ncpus: usize) -> (&'static Kernel, &'static MockConsole) {
    let backing = Box::leak(vec![PageBuf::ZERO; ARENA_PAGES].into_boxed_slice());
    let alloc = unsafe {
        ArenaFrameAllocator::new(
            backing.as_mut_ptr() as *mut u8,
            PhysAddr::new(PHYS_BASE),
            ARENA_PAGES,
        )
    };
    let alloc = Box::leak(Box::new(alloc));
    let console: &'static MockConsole = Box::leak(Box::new(MockConsole::new()));

    let kernel = Kernel::new(alloc, console, &NO_FS, ArchOps::noop(), ncpus)
        .expect("arena fits the idle tasks");
    (Box::leak(Box::new(kernel)), console)
}

pub fn default_image() -> ProgramImage {
    ProgramImage::default_window(PROG_IMAGE_BASE)
}
