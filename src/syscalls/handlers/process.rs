//! Task-management syscall handlers.

use crate::kernel::Kernel;
use crate::sched;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};
use crate::task::{TaskError, TaskState};

/// Id of the task current on the calling core.
pub fn sys_getpid(k: &Kernel, cpu: usize) -> SyscallResult {
    k.tasks
        .lock()
        .current(cpu)
        .ok_or(SyscallError::InvalidSyscall)
}

/// Duplicates the calling task. The parent gets the child's id; the child
/// observes 0 from the same call site.
pub fn sys_fork(k: &Kernel, cpu: usize) -> SyscallResult {
    let mut table = k.tasks.lock();
    let parent = table.current(cpu).ok_or(SyscallError::InvalidSyscall)?;
    match table.fork(parent, k.alloc, k.kernel_root) {
        Ok(child) => Ok(child),
        Err(TaskError::NoFreeSlot) => Err(SyscallError::TableFull),
        Err(TaskError::OutOfMemory) => Err(SyscallError::NoMemory),
    }
}

/// Kills a task; `pid` 0 means the caller itself.
///
/// A victim currently assigned to a core is only marked STOPPED and reaped
/// by that core's own scheduler, so its address space is never torn down
/// under it. Self-kill therefore marks and reschedules; the reap happens in
/// the decision that follows, and this call never returns to the caller.
pub fn sys_kill(k: &Kernel, cpu: usize, pid: usize) -> Option<isize> {
    let mut table = k.tasks.lock();
    let target = if pid == 0 {
        match table.current(cpu) {
            Some(cur) => cur,
            None => return Some(SyscallError::InvalidSyscall.as_errno()),
        }
    } else {
        pid
    };
    if target < k.ncpus {
        // Slots 0..ncpus hold the per-core idle tasks; every core must
        // always have its own to fall back on.
        return Some(SyscallError::InvalidArgument.as_errno());
    }
    if target >= crate::config::NR_TASKS || table.slot(target).state == TaskState::Free {
        // Killing a dead slot is a no-op.
        return Some(0);
    }

    match table.running_on(target) {
        Some(victim_cpu) => {
            table.slot_mut(target).state = TaskState::Stopped;
            drop(table);
            if victim_cpu == cpu {
                sched::reschedule(k, cpu);
                return None;
            }
            // The victim's core reaps on its next decision point.
            Some(0)
        }
        None => {
            table.destroy(target, k.alloc, &k.arch, k.kernel_root);
            // destroy left the core on the kernel root; put the caller's
            // space back before returning to it.
            if let Some(cur) = table.current(cpu) {
                let root = table.slot(cur).space.as_ref().map(|s| s.root());
                if let Some(root) = root {
                    (k.arch.activate)(root);
                }
            }
            Some(0)
        }
    }
}
