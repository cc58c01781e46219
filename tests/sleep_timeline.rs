//! Tick-accurate sleep/wake timeline driven entirely by timer traps, the
//! way the hardware would: each trap advances the coordinator's tick and
//! forces a scheduling decision.

mod common;

use core::sync::atomic::Ordering;

use taskos::config::TIME_QUANTUM;
use taskos::sched::reschedule;
use taskos::syscalls::SyscallNumber;
use taskos::task::TaskState;
use taskos::trap::{self, Trapframe, IRQ_TIMER, T_SYSCALL};

fn timer_trap(k: &taskos::kernel::Kernel, cpu: usize) {
    let mut tf = Trapframe {
        trapno: IRQ_TIMER as u64,
        ..Default::default()
    };
    trap::handle(k, cpu, &mut tf);
}

#[test]
fn sleep_50_at_tick_100_wakes_at_exactly_150() {
    let (k, _console) = common::boot(1);
    let a = k.spawn_root(&common::default_image()).unwrap();
    reschedule(k, 0);

    // Give the sleeper company so the core has real work while it waits.
    let mut tf = Trapframe {
        trapno: T_SYSCALL as u64,
        ..Default::default()
    };
    tf.regs.rax = SyscallNumber::Fork as u64;
    trap::handle(k, 0, &mut tf);
    let b = k.tasks.lock().slot(a).tf.regs.rax as usize;

    // Advance to tick 100, then task A sleeps for 50.
    k.ticks.store(100, Ordering::Relaxed);
    let mut tf = Trapframe {
        trapno: T_SYSCALL as u64,
        ..Default::default()
    };
    tf.regs.rax = SyscallNumber::Sleep as u64;
    tf.regs.rdx = 50;
    trap::handle(k, 0, &mut tf);

    {
        let tasks = k.tasks.lock();
        assert_eq!(tasks.slot(a).state, TaskState::Sleeping);
        assert_eq!(tasks.slot(a).wake_tick, 150);
        // The core moved on to the other task.
        assert_eq!(tasks.current(0), Some(b));
    }

    // Drive timer traps; A must stay asleep strictly before tick 150 and
    // be RUNNABLE the moment the coordinator sees tick 150.
    let mut woke_at = None;
    while k.current_tick() < 160 {
        timer_trap(k, 0);
        let state = k.tasks.lock().slot(a).state;
        if woke_at.is_none() && state != TaskState::Sleeping {
            woke_at = Some(k.current_tick());
        }
        if k.current_tick() < 150 {
            assert_eq!(state, TaskState::Sleeping);
        }
    }
    assert_eq!(woke_at, Some(150));

    // Once B's quantum runs out, rotation resumes A with sleep's return
    // value already in place.
    while k.tasks.lock().current(0) != Some(a) {
        assert!(k.current_tick() < 100 + 3 * TIME_QUANTUM, "A never resumed");
        timer_trap(k, 0);
    }
    let tasks = k.tasks.lock();
    assert_eq!(tasks.slot(a).state, TaskState::Running);
    assert_eq!(tasks.slot(a).tf.regs.rax, 0);
}

#[test]
fn sleeping_everyone_leaves_the_idle_task_running() {
    let (k, _console) = common::boot(1);
    let a = k.spawn_root(&common::default_image()).unwrap();
    reschedule(k, 0);

    let mut tf = Trapframe {
        trapno: T_SYSCALL as u64,
        ..Default::default()
    };
    tf.regs.rax = SyscallNumber::Sleep as u64;
    tf.regs.rdx = 30;
    trap::handle(k, 0, &mut tf);

    // Nothing else to run: the idle task (slot 0) takes over.
    {
        let tasks = k.tasks.lock();
        assert_eq!(tasks.current(0), Some(0));
        assert_eq!(tasks.slot(0).state, TaskState::Running);
    }

    // The idle task has no quantum; A preempts it the very tick it wakes.
    while k.tasks.lock().slot(a).state == TaskState::Sleeping {
        assert!(k.current_tick() < 100, "sleeper never woke");
        timer_trap(k, 0);
    }
    timer_trap(k, 0);
    assert_eq!(k.tasks.lock().current(0), Some(a));
}

#[test]
fn get_ticks_observes_timer_driven_time() {
    let (k, _console) = common::boot(1);
    let a = k.spawn_root(&common::default_image()).unwrap();
    reschedule(k, 0);

    for _ in 0..7 {
        timer_trap(k, 0);
    }

    let mut tf = Trapframe {
        trapno: T_SYSCALL as u64,
        ..Default::default()
    };
    tf.regs.rax = SyscallNumber::GetTicks as u64;
    trap::handle(k, 0, &mut tf);
    assert_eq!(k.tasks.lock().slot(a).tf.regs.rax, 7);
}
