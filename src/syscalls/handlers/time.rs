//! Time syscall handlers.
//!
//! `sleep` gives up the core instead of spinning: the caller is moved to
//! SLEEPING with an absolute wake tick and the scheduler picks someone
//! else. The coordinator core's tick scan makes it RUNNABLE again no
//! earlier than the requested deadline; the actual resumption can be later,
//! whenever rotation next reaches the task.

use crate::kernel::Kernel;
use crate::sched;
use crate::trap::Trapframe;

/// Puts the caller to sleep for at least `ticks` timer ticks and hands the
/// core to the next task. Always transfers control, so the dispatcher must
/// not touch the frame afterwards; the caller's stored frame already reads
/// 0 when it eventually resumes.
pub fn sys_sleep(k: &Kernel, cpu: usize, tf: &mut Trapframe, ticks: u64) -> Option<isize> {
    tf.regs.rax = 0;
    sched::sleep_current(k, cpu, ticks);
    None
}

/// Ticks since boot.
pub fn sys_get_ticks(k: &Kernel) -> usize {
    k.current_tick() as usize
}
