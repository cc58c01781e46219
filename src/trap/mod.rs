//! Trap classification and the central dispatcher.
//!
//! Every interrupt, exception and syscall funnels through one entry
//! contract: the hardware and the entry stubs push a [`Trapframe`], the
//! dispatcher routes on the cause, and execution resumes by restoring
//! whichever trapframe is current afterwards — possibly a different task's.

use crate::config::COORDINATOR_CPU;
use crate::kernel::Kernel;
use crate::println;
use crate::{sched, syscalls};

/// PIC vector base after remapping.
pub const IRQ_OFFSET: u8 = 32;
pub const IRQ_TIMER: u8 = IRQ_OFFSET;
pub const IRQ_KEYBOARD: u8 = IRQ_OFFSET + 1;

/// Page-fault exception vector.
pub const T_PGFLT: u8 = 14;

/// Software-interrupt vector for syscalls (`int 0x30`), gate DPL 3.
pub const T_SYSCALL: u8 = 0x30;

/// Cause code pushed by the shared default stubs for vectors the kernel
/// does not route individually.
pub const T_UNKNOWN: u8 = 0xFF;

/// General-purpose registers in stub push order.
///
/// The entry stub pushes rax first and r15 last, so r15 sits at the lowest
/// address. The context-restore path pops in exactly the reverse order; any
/// change here must change `trap_common`/`trap_return` in lockstep.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushRegs {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
}

/// The saved execution state of an interrupted task.
///
/// Field order is the wire contract with the entry stubs, lowest address
/// first: the segment pair pushed last by software, the general-purpose
/// block, the software-pushed cause/error pair, then the hardware frame
/// (`rip`..`ss`). A task's resumable state lives in exactly one of these,
/// stored in its table slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trapframe {
    pub es: u64,
    pub ds: u64,
    pub regs: PushRegs,
    pub trapno: u64,
    pub err: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl Trapframe {
    /// Whether the frame was captured while executing in ring 3.
    pub fn from_user(&self) -> bool {
        self.cs & 0x3 == 0x3
    }
}

/// Closed classification of trap causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    PageFault,
    Keyboard,
    Timer,
    Syscall,
    Other(u8),
}

impl TrapCause {
    pub fn from_vector(vector: u8) -> Self {
        match vector {
            T_PGFLT => Self::PageFault,
            IRQ_KEYBOARD => Self::Keyboard,
            IRQ_TIMER => Self::Timer,
            T_SYSCALL => Self::Syscall,
            other => Self::Other(other),
        }
    }
}

/// Human-readable trap name for fatal dumps.
pub fn trap_name(vector: u8) -> &'static str {
    const EXCEPTIONS: [&str; 20] = [
        "Divide error",
        "Debug",
        "Non-Maskable Interrupt",
        "Breakpoint",
        "Overflow",
        "BOUND Range Exceeded",
        "Invalid Opcode",
        "Device Not Available",
        "Double Fault",
        "Coprocessor Segment Overrun",
        "Invalid TSS",
        "Segment Not Present",
        "Stack Fault",
        "General Protection",
        "Page Fault",
        "(unknown trap)",
        "x87 FPU Floating-Point Error",
        "Alignment Check",
        "Machine-Check",
        "SIMD Floating-Point Exception",
    ];

    if (vector as usize) < EXCEPTIONS.len() {
        return EXCEPTIONS[vector as usize];
    }
    if vector == T_SYSCALL {
        return "System call";
    }
    if (IRQ_OFFSET..IRQ_OFFSET + 16).contains(&vector) {
        return "Hardware Interrupt";
    }
    "(unknown trap)"
}

/// Dumps the full register/segment/cause state of a frame.
pub fn print_trapframe(tf: &Trapframe) {
    println!("TRAP frame at {:p}", tf);
    println!("  rax  {:#018x}  rbx  {:#018x}", tf.regs.rax, tf.regs.rbx);
    println!("  rcx  {:#018x}  rdx  {:#018x}", tf.regs.rcx, tf.regs.rdx);
    println!("  rsi  {:#018x}  rdi  {:#018x}", tf.regs.rsi, tf.regs.rdi);
    println!("  rbp  {:#018x}  r8   {:#018x}", tf.regs.rbp, tf.regs.r8);
    println!("  r9   {:#018x}  r10  {:#018x}", tf.regs.r9, tf.regs.r10);
    println!("  r11  {:#018x}  r12  {:#018x}", tf.regs.r11, tf.regs.r12);
    println!("  r13  {:#018x}  r14  {:#018x}", tf.regs.r13, tf.regs.r14);
    println!("  r15  {:#018x}", tf.regs.r15);
    println!("  es   {:#06x}  ds   {:#06x}", tf.es, tf.ds);
    println!(
        "  trap {:#04x} {}",
        tf.trapno,
        trap_name(tf.trapno as u8)
    );
    if tf.trapno as u8 == T_PGFLT {
        // Decoded page-fault error code: mode, access, reason.
        println!(
            "  err  {:#x} [{}, {}, {}]",
            tf.err,
            if tf.err & 4 != 0 { "user" } else { "kernel" },
            if tf.err & 2 != 0 { "write" } else { "read" },
            if tf.err & 1 != 0 { "protection" } else { "not-present" },
        );
    } else {
        println!("  err  {:#x}", tf.err);
    }
    println!("  rip  {:#018x}", tf.rip);
    println!("  cs   {:#06x}", tf.cs);
    println!("  flag {:#018x}", tf.rflags);
    if tf.from_user() {
        println!("  rsp  {:#018x}", tf.rsp);
        println!("  ss   {:#06x}", tf.ss);
    }
}

/// Per-core context line for fatal dumps: what the core was running and
/// the last vector it dispatched, plus overall table pressure.
fn print_cpu_context(k: &Kernel, cpu: usize) {
    let table = k.tasks.lock();
    println!(
        "  cpu {}: current {:?}, last trap {:?}, {} live tasks",
        cpu,
        table.current(cpu),
        table.cpu(cpu).last_trapno,
        table.live_tasks()
    );
}

/// The central dispatcher. `tf` is the frame the entry stub just pushed;
/// the return value is the frame the stub must restore, which belongs to
/// whichever task is current once dispatch is done.
///
/// If a task is current on this core, the on-stack frame is first copied
/// into the task's table slot and dispatch rebinds to that stored copy, so
/// a task's resumable state never lives only on a transient stack.
///
/// Page faults and unexpected causes are fatal: state is dumped and the
/// kernel panics. Resource errors never reach this level; they are returned
/// to the syscall caller as negative values.
pub fn handle(k: &Kernel, cpu: usize, tf: &mut Trapframe) -> *mut Trapframe {
    let mut frame: *mut Trapframe = tf;
    {
        let mut table = k.tasks.lock();
        if let Some(cur) = table.current(cpu) {
            table.slot_mut(cur).tf = *tf;
            table.cpu_mut(cpu).last_trapno = Some(tf.trapno as u8);
            frame = &mut table.slot_mut(cur).tf as *mut Trapframe;
        }
    }
    // The stored copy (when one exists) is only ever touched by the core
    // the task is current on; the table lock covers state transitions, not
    // this core's own frame contents.
    let tf = unsafe { &mut *frame };

    match TrapCause::from_vector(tf.trapno as u8) {
        TrapCause::PageFault => {
            print_trapframe(tf);
            print_cpu_context(k, cpu);
            panic!("page fault at {:#x}", (k.arch.fault_address)());
        }
        TrapCause::Keyboard => {
            k.console.on_keyboard_interrupt();
        }
        TrapCause::Timer => {
            if cpu == COORDINATOR_CPU {
                k.ticks
                    .fetch_add(1, core::sync::atomic::Ordering::Relaxed);
            }
            sched::reschedule(k, cpu);
        }
        TrapCause::Syscall => {
            if let Some(ret) = syscalls::dispatch(k, cpu, tf) {
                tf.regs.rax = ret as u64;
            }
        }
        TrapCause::Other(vector) => {
            print_trapframe(tf);
            print_cpu_context(k, cpu);
            panic!("unexpected trap {} ({})", vector, trap_name(vector));
        }
    }

    // Resume whichever task is now current; dispatch may have switched it.
    let mut table = k.tasks.lock();
    match table.current(cpu) {
        Some(cur) => &mut table.slot_mut(cur).tf as *mut Trapframe,
        None => frame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TIME_QUANTUM;
    use crate::syscalls::SyscallNumber;
    use crate::task::TaskState;
    use crate::test_env::{syscall_frame, test_kernel};

    #[test]
    fn trapframe_layout_matches_stub_contract() {
        use core::mem::{offset_of, size_of};
        assert_eq!(size_of::<Trapframe>(), 24 * 8);
        assert_eq!(offset_of!(Trapframe, es), 0);
        assert_eq!(offset_of!(Trapframe, ds), 8);
        assert_eq!(offset_of!(Trapframe, regs), 16);
        assert_eq!(offset_of!(PushRegs, r15), 0);
        assert_eq!(offset_of!(PushRegs, rax), 14 * 8);
        assert_eq!(offset_of!(Trapframe, trapno), 17 * 8);
        assert_eq!(offset_of!(Trapframe, err), 18 * 8);
        assert_eq!(offset_of!(Trapframe, rip), 19 * 8);
        assert_eq!(offset_of!(Trapframe, ss), 23 * 8);
    }

    #[test]
    fn causes_decode_by_vector() {
        assert_eq!(TrapCause::from_vector(T_PGFLT), TrapCause::PageFault);
        assert_eq!(TrapCause::from_vector(IRQ_TIMER), TrapCause::Timer);
        assert_eq!(TrapCause::from_vector(IRQ_KEYBOARD), TrapCause::Keyboard);
        assert_eq!(TrapCause::from_vector(T_SYSCALL), TrapCause::Syscall);
        assert_eq!(TrapCause::from_vector(3), TrapCause::Other(3));
    }

    #[test]
    fn syscall_result_lands_in_rax_of_stored_frame() {
        let (k, _console) = test_kernel(1);
        let root = k.spawn_root_for_test();
        sched::reschedule(k, 0);

        let mut tf = syscall_frame(SyscallNumber::GetPid as u64, [0; 5]);
        let restored = handle(k, 0, &mut tf);

        let table = k.tasks.lock();
        let stored = &table.slot(root).tf;
        assert_eq!(stored.regs.rax, root as u64);
        // Rebind: the restored frame is the table slot, not the stack frame.
        assert_eq!(restored as *const _, stored as *const Trapframe);
    }

    #[test]
    fn timer_advances_ticks_only_on_coordinator() {
        let (k, _console) = test_kernel(2);
        sched::reschedule(k, 0);
        sched::reschedule(k, 1);

        let mut tf = Trapframe {
            trapno: IRQ_TIMER as u64,
            ..Default::default()
        };
        handle(k, 1, &mut tf);
        assert_eq!(k.current_tick(), 0);

        let mut tf = Trapframe {
            trapno: IRQ_TIMER as u64,
            ..Default::default()
        };
        handle(k, 0, &mut tf);
        assert_eq!(k.current_tick(), 1);
    }

    #[test]
    fn timer_trap_can_switch_the_restored_task() {
        let (k, _console) = test_kernel(1);
        let a = k.spawn_root_for_test();
        let b = k.spawn_root_for_test();
        assert_ne!(a, b);

        sched::reschedule(k, 0);
        assert_eq!(k.tasks.lock().current(0), Some(a));

        // Burn out the quantum, then deliver a timer trap.
        k.ticks.store(
            TIME_QUANTUM + 1,
            core::sync::atomic::Ordering::Relaxed,
        );
        let mut tf = Trapframe {
            trapno: IRQ_TIMER as u64,
            ..Default::default()
        };
        let restored = handle(k, 0, &mut tf);

        let table = k.tasks.lock();
        assert_eq!(table.current(0), Some(b));
        assert_eq!(table.slot(b).state, TaskState::Running);
        assert_eq!(restored as *const _, &table.slot(b).tf as *const Trapframe);
    }

    #[test]
    fn dispatch_records_the_last_trap_per_core() {
        let (k, _console) = test_kernel(1);
        k.spawn_root_for_test();
        sched::reschedule(k, 0);

        let mut tf = Trapframe {
            trapno: IRQ_TIMER as u64,
            ..Default::default()
        };
        handle(k, 0, &mut tf);
        assert_eq!(k.tasks.lock().cpu(0).last_trapno, Some(IRQ_TIMER));
    }

    #[test]
    #[should_panic(expected = "unexpected trap")]
    fn unknown_traps_are_fatal() {
        let (k, _console) = test_kernel(1);
        let mut tf = Trapframe {
            trapno: 6, // invalid opcode
            ..Default::default()
        };
        handle(k, 0, &mut tf);
    }

    #[test]
    #[should_panic(expected = "page fault")]
    fn page_faults_halt() {
        let (k, _console) = test_kernel(1);
        let mut tf = Trapframe {
            trapno: T_PGFLT as u64,
            err: 0x6,
            ..Default::default()
        };
        handle(k, 0, &mut tf);
    }
}
