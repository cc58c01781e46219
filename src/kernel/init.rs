//! Kernel bring-up: phased initialization on the boot core and the entry
//! path the secondary cores spin into.

use x86_64::structures::paging::PageTable;

use crate::config::COORDINATOR_CPU;
use crate::devices::{Console, Filesystem};
use crate::kernel::{self, ArchOps, Kernel};
use crate::loader::ProgramImage;
use crate::memory::PageAllocator;
use crate::println;
use crate::{interrupts, sched};

/// Initializes the kernel on the boot core, in order: trap plumbing, the
/// kernel object with its per-core idle tasks, then the first user task.
/// `ncpus` is the core count the boot environment discovered. Returns the
/// installed kernel singleton.
pub fn init_kernel(
    alloc: &'static dyn PageAllocator,
    console: &'static dyn Console,
    fs: &'static dyn Filesystem,
    image: &ProgramImage,
    ncpus: usize,
) -> Result<&'static Kernel, &'static str> {
    init_phase("trap plumbing", || {
        interrupts::init();
        Ok(())
    })?;

    let kernel = init_phase("task table", || {
        Kernel::new(alloc, console, fs, ArchOps::hardware(), ncpus)
            .map_err(|_| "out of memory building the task table")
    })?;
    let kernel = kernel::install(kernel);

    init_phase("root task", || {
        kernel
            .spawn_root(image)
            .map(|_| ())
            .map_err(|_| "out of memory spawning the root task")
    })?;

    kernel.mark_online(COORDINATOR_CPU);
    println!("kernel up: {} cpu(s), root task spawned", kernel.ncpus);
    Ok(kernel)
}

fn init_phase<T>(
    name: &'static str,
    init_fn: impl FnOnce() -> Result<T, &'static str>,
) -> Result<T, &'static str> {
    println!("init: {}...", name);
    match init_fn() {
        Ok(v) => {
            println!("init: {} ok", name);
            Ok(v)
        }
        Err(e) => {
            println!("init: {} FAILED: {}", name, e);
            Err(e)
        }
    }
}

/// Copies the present upper-half entries of the currently active top-level
/// table into the kernel root, so every task created afterwards shares the
/// kernel mappings.
///
/// # Safety
///
/// `active` must point at the live top-level table the boot environment set
/// up, and must stay valid for the duration of the call.
pub unsafe fn adopt_kernel_mappings(k: &Kernel, active: *const PageTable) {
    use crate::config::{KERNEL_HALF_START, RECURSIVE_SLOT};

    let src = &*active;
    let dst = &mut *k.alloc.table_ptr(k.kernel_root);
    for i in KERNEL_HALF_START..512 {
        if i == RECURSIVE_SLOT {
            continue;
        }
        if !src[i].is_unused() {
            dst[i].set_addr(src[i].addr(), src[i].flags());
        }
    }
}

/// Entry for every core once the kernel is installed. Secondary cores
/// block until the boot core's online flag releases them, load their own
/// tables and report in; the boot core waits until every core has reported
/// before scheduling, so the first tick sees all slot domains serviced.
/// Then each core makes its first scheduling decision and drops into the
/// chosen task. Never returns.
///
/// # Safety
///
/// Must run exactly once per core, after [`init_kernel`] succeeded, with
/// interrupts still disabled.
pub unsafe fn start_cpu(k: &'static Kernel, cpu: usize) -> ! {
    if cpu == COORDINATOR_CPU {
        k.wait_all_online();
    } else {
        k.wait_online(COORDINATOR_CPU);
        interrupts::load_cpu_tables(cpu);
        k.mark_online(cpu);
    }

    let first = sched::reschedule(k, cpu);
    let frame = {
        let mut tasks = k.tasks.lock();
        &mut tasks.slot_mut(first).tf as *mut crate::trap::Trapframe
    };
    interrupts::restore_trapframe(frame)
}
