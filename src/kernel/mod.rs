//! The kernel object: every collaborator the subsystems need, the global
//! tick counter, and the per-core online flags used during multiprocessor
//! bring-up.

pub mod init;

pub use init::init_kernel;

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::{Mutex, Once};
use x86_64::structures::paging::PhysFrame;

use crate::config::{NR_CPUS, NR_TASKS};
use crate::devices::{Console, Filesystem};
use crate::loader::{self, ProgramImage};
use crate::memory::PageAllocator;
use crate::task::{TaskError, TaskId, TaskTable};

/// Privileged operations the scheduler and task teardown need, as plain
/// function pointers so tests can substitute no-ops and the real kernel
/// installs the CR-register accessors.
#[derive(Clone, Copy)]
pub struct ArchOps {
    /// Switches the core onto an address-space root.
    pub activate: fn(PhysFrame),
    /// Reads the faulting address after a page fault.
    pub fault_address: fn() -> u64,
}

impl ArchOps {
    pub fn hardware() -> Self {
        Self {
            activate: hw_activate,
            fault_address: hw_fault_address,
        }
    }

    /// No-op operations for host-side tests.
    pub fn noop() -> Self {
        Self {
            activate: |_| {},
            fault_address: || 0,
        }
    }
}

fn hw_activate(root: PhysFrame) {
    use x86_64::registers::control::{Cr3, Cr3Flags};
    unsafe { Cr3::write(root, Cr3Flags::empty()) };
}

fn hw_fault_address() -> u64 {
    use x86_64::registers::control::Cr2;
    Cr2::read().map(|a| a.as_u64()).unwrap_or(0)
}

pub struct Kernel {
    pub tasks: Mutex<TaskTable>,
    /// Timer ticks since boot; advanced by the coordinator core only.
    pub ticks: AtomicU64,
    pub alloc: &'static dyn PageAllocator,
    pub console: &'static dyn Console,
    pub fs: &'static dyn Filesystem,
    pub arch: ArchOps,
    /// Root of the kernel's own page-table tree; its upper half is copied
    /// into every task's address space.
    pub kernel_root: PhysFrame,
    pub ncpus: usize,
    online: [AtomicBool; NR_CPUS],
}

impl Kernel {
    /// Builds the kernel around its collaborators: allocates the kernel
    /// page-table root and creates one privileged idle task per core, in
    /// slots `0..ncpus` so each lands in its own core's slot domain.
    ///
    /// The caller populates the kernel root's upper half (shared mappings)
    /// through `alloc.table_ptr` before spawning user tasks.
    pub fn new(
        alloc: &'static dyn PageAllocator,
        console: &'static dyn Console,
        fs: &'static dyn Filesystem,
        arch: ArchOps,
        ncpus: usize,
    ) -> Result<Self, TaskError> {
        assert!(ncpus >= 1 && ncpus <= NR_CPUS);
        assert!(NR_TASKS >= 2 * ncpus, "task table too small for idle tasks");

        let kernel_root = alloc.alloc_page(true).ok_or(TaskError::OutOfMemory)?;
        alloc.incref(kernel_root);

        let mut tasks = TaskTable::new();
        for cpu in 0..ncpus {
            let id = tasks.create(alloc, kernel_root, false)?;
            debug_assert_eq!(id, cpu);
            tasks.slot_mut(id).tf.rip = idle_entry as usize as u64;
        }

        Ok(Self {
            tasks: Mutex::new(tasks),
            ticks: AtomicU64::new(0),
            alloc,
            console,
            fs,
            arch,
            kernel_root,
            ncpus,
            online: [const { AtomicBool::new(false) }; NR_CPUS],
        })
    }

    pub fn current_tick(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Creates the first user task from a loaded program image.
    pub fn spawn_root(&self, image: &ProgramImage) -> Result<TaskId, TaskError> {
        let mut tasks = self.tasks.lock();
        let id = tasks.create(self.alloc, self.kernel_root, true)?;
        {
            let space = tasks.slot(id).space.as_ref().expect("fresh task has a space");
            if let Err(e) = loader::map_image(self.alloc, space) {
                tasks.destroy(id, self.alloc, &self.arch, self.kernel_root);
                return Err(e.into());
            }
        }
        tasks.slot_mut(id).tf.rip = image.entry;
        Ok(id)
    }

    pub fn mark_online(&self, cpu: usize) {
        self.online[cpu].store(true, Ordering::Release);
    }

    pub fn is_online(&self, cpu: usize) -> bool {
        self.online[cpu].load(Ordering::Acquire)
    }

    pub fn online_count(&self) -> usize {
        (0..self.ncpus).filter(|&c| self.is_online(c)).count()
    }

    /// Spins until `cpu` has raised its online flag.
    pub fn wait_online(&self, cpu: usize) {
        while !self.is_online(cpu) {
            core::hint::spin_loop();
        }
    }

    /// Spins until every core has reported in.
    pub fn wait_all_online(&self) {
        while self.online_count() < self.ncpus {
            core::hint::spin_loop();
        }
    }
}

/// What each core's idle task runs: wait for the next interrupt, forever.
pub extern "C" fn idle_entry() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

static KERNEL: Once<Kernel> = Once::new();

/// Installs the kernel singleton. Later calls return the first instance.
pub fn install(kernel: Kernel) -> &'static Kernel {
    KERNEL.call_once(|| kernel)
}

pub fn try_global() -> Option<&'static Kernel> {
    KERNEL.get()
}
