//! Interrupt plumbing: GDT/TSS, the IDT, PIC configuration, the assembly
//! entry stubs, and the C-ABI landing point they call into.

pub mod gdt;
pub mod idt;
pub mod pic;
pub mod stubs;

pub use stubs::restore_trapframe;

use pic::{InterruptIndex, PICS, PIC_1_OFFSET};

use crate::config::COORDINATOR_CPU;
use crate::trap::Trapframe;
use crate::{kernel, trap};

/// Full boot-core setup: descriptor tables, PIC remap, timer programming.
/// Interrupts stay disabled; the first `iretq` into a task enables them
/// through the task's RFLAGS.
pub fn init() {
    gdt::init(COORDINATOR_CPU);
    idt::init();
    unsafe { PICS.lock().initialize() };
    pic::init_timer();
    pic::unmask_irqs();
}

/// Per-core table loads for the secondary cores: the shared GDT and IDT,
/// plus the core's own TSS descriptor.
pub fn load_cpu_tables(cpu: usize) {
    gdt::init(cpu);
    idt::init();
}

/// Landing point of `trap_common`: routes the frame through the trap
/// dispatcher and acknowledges PIC interrupts on the way out. Returns the
/// frame the stub must restore.
#[no_mangle]
pub extern "C" fn kernel_trap_handler(frame: *mut Trapframe) -> *mut Trapframe {
    let tf = unsafe { &mut *frame };
    let vector = tf.trapno as u8;

    let next = match kernel::try_global() {
        Some(k) => trap::handle(k, current_cpu(), tf),
        // Traps before the kernel exists have nowhere to go.
        None => frame,
    };

    if (PIC_1_OFFSET..PIC_1_OFFSET + 16).contains(&vector) {
        unsafe { PICS.lock().notify_end_of_interrupt(vector) };
    }
    next
}

/// This core's id, from the APIC id reported by `cpuid`.
///
/// Assumes the boot environment numbers APs densely from 0, matching the
/// kernel's cpu indices.
pub fn current_cpu() -> usize {
    let apic_id: u32;
    unsafe {
        // rbx is reserved by LLVM, so shuffle it around cpuid by hand.
        core::arch::asm!(
            "mov {tmp:r}, rbx",
            "cpuid",
            "mov {out:e}, ebx",
            "mov rbx, {tmp:r}",
            tmp = out(reg) _,
            out = out(reg) apic_id,
            inout("eax") 1u32 => _,
            out("ecx") _,
            out("edx") _,
        );
    }
    (apic_id >> 24) as usize
}

/// Software-interrupt vector user code uses for syscalls.
pub const SYSCALL_VECTOR: u8 = InterruptIndex::Syscall as u8;
