//! The round-robin, multi-core scheduler.
//!
//! Task slots are partitioned across cores by stride: core `c` only ever
//! runs tasks whose slot index satisfies `slot % ncpus == c`, so two cores
//! never compete for the same task and each core's idle task (slot `c`)
//! can never be claimed by another core.
//!
//! [`reschedule`] is the single decision point. It never restores context
//! itself; it picks the next task, marks it RUNNING, installs its address
//! space, and returns its id. The trap-return path restores whichever
//! trapframe is current afterwards.

use core::sync::atomic::Ordering;

use crate::config::{COORDINATOR_CPU, NR_TASKS, TIME_QUANTUM};
use crate::kernel::Kernel;
use crate::task::{TaskId, TaskState};

/// Picks (and installs) the next task for `cpu`.
///
/// In order: the coordinator wakes due sleepers, a STOPPED current task is
/// reaped, a RUNNING current task inside its quantum is kept, otherwise the
/// core's slot domain is scanned round-robin starting just after the
/// current slot, falling back to the core's idle task when nothing else is
/// RUNNABLE.
pub fn reschedule(k: &Kernel, cpu: usize) -> TaskId {
    let now = k.ticks.load(Ordering::Relaxed);
    let mut table = k.tasks.lock();

    if cpu == COORDINATOR_CPU {
        for id in 0..NR_TASKS {
            let t = table.slot_mut(id);
            if t.state == TaskState::Sleeping && now >= t.wake_tick {
                t.state = TaskState::Runnable;
            }
        }
    }

    if let Some(cur) = table.current(cpu) {
        debug_assert_eq!(cur % k.ncpus, cpu, "current task outside this core's domain");
        match table.slot(cur).state {
            TaskState::Stopped => {
                table.destroy(cur, k.alloc, &k.arch, k.kernel_root);
            }
            TaskState::Running if now < table.slot(cur).wake_tick => {
                // Quantum not exhausted; keep running, space already active.
                return cur;
            }
            TaskState::Running => {
                table.slot_mut(cur).state = TaskState::Runnable;
            }
            _ => {}
        }
    }

    // Round-robin over this core's slot domain, starting just after the
    // slot that ran last. The idle slot is skipped here so it is only ever
    // the fallback.
    let start = table.current(cpu).unwrap_or(cpu);
    let domain_len = (NR_TASKS - cpu).div_ceil(k.ncpus);
    let mut candidate = start;
    let mut chosen = None;
    for _ in 0..domain_len {
        candidate += k.ncpus;
        if candidate >= NR_TASKS {
            candidate = cpu;
        }
        if candidate == cpu {
            continue;
        }
        if table.slot(candidate).state == TaskState::Runnable {
            chosen = Some(candidate);
            break;
        }
    }

    let next = chosen.unwrap_or(cpu);
    let idle = next == cpu;
    if idle {
        let s = table.slot(cpu).state;
        assert!(
            s == TaskState::Runnable || s == TaskState::Running,
            "core {} has no runnable task and its idle task is {:?}",
            cpu,
            s
        );
    }

    let t = table.slot_mut(next);
    t.state = TaskState::Running;
    // The idle task gets no quantum: the next decision point preempts it as
    // soon as real work shows up.
    t.wake_tick = now + if idle { 0 } else { TIME_QUANTUM };
    let root = t.space.as_ref().expect("live task has a space").root();

    table.set_current(cpu, Some(next));
    (k.arch.activate)(root);
    next
}

/// Puts the current task of `cpu` to sleep for `ticks` and gives up the
/// core. Returns the task picked to run instead.
pub fn sleep_current(k: &Kernel, cpu: usize, ticks: u64) -> TaskId {
    let now = k.ticks.load(Ordering::Relaxed);
    {
        let mut table = k.tasks.lock();
        if let Some(cur) = table.current(cpu) {
            let t = table.slot_mut(cur);
            t.state = TaskState::Sleeping;
            t.wake_tick = now + ticks;
        }
    }
    reschedule(k, cpu)
}
