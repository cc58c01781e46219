//! Hand-built IDT.
//!
//! Every vector routes through the shared assembly entry stubs so the full
//! register file is captured into a [`Trapframe`](crate::trap::Trapframe)
//! and the dispatcher can switch tasks on the way out. That rules out the
//! usual per-vector typed handler functions, so the gates are raw
//! descriptors pointing at the stub symbols.

use spin::Lazy;
use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

use crate::interrupts::gdt::KERNEL_CODE_SELECTOR;
use crate::interrupts::pic::InterruptIndex;
use crate::interrupts::stubs;
use crate::trap::T_PGFLT;

/// Exception vectors where the CPU pushes an error code itself; their
/// stubs must not push the placeholder.
const ERROR_CODE_VECTORS: [u8; 8] = [8, 10, 11, 12, 13, 14, 17, 21];

/// 64-bit interrupt gate descriptor.
#[repr(C)]
#[derive(Clone, Copy)]
struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    options: u16,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl GateDescriptor {
    /// Present 64-bit interrupt gate (type 0xE), no IST.
    fn interrupt_gate(handler: usize, dpl: u8) -> Self {
        let addr = handler as u64;
        Self {
            offset_low: addr as u16,
            selector: KERNEL_CODE_SELECTOR,
            options: 0x8E00 | ((dpl as u16) << 13),
            offset_mid: (addr >> 16) as u16,
            offset_high: (addr >> 32) as u32,
            reserved: 0,
        }
    }
}

#[repr(C, align(16))]
pub struct InterruptTable([GateDescriptor; 256]);

static IDT: Lazy<InterruptTable> = Lazy::new(|| {
    let mut gates = [GateDescriptor::interrupt_gate(stubs::entry_default(), 0); 256];

    for &vector in &ERROR_CODE_VECTORS {
        gates[vector as usize] = GateDescriptor::interrupt_gate(stubs::entry_default_err(), 0);
    }

    gates[T_PGFLT as usize] = GateDescriptor::interrupt_gate(stubs::entry_page_fault(), 0);
    gates[InterruptIndex::Timer.as_usize()] =
        GateDescriptor::interrupt_gate(stubs::entry_timer(), 0);
    gates[InterruptIndex::Keyboard.as_usize()] =
        GateDescriptor::interrupt_gate(stubs::entry_keyboard(), 0);
    // The syscall gate is the only one user code may invoke directly.
    gates[InterruptIndex::Syscall.as_usize()] =
        GateDescriptor::interrupt_gate(stubs::entry_syscall(), 3);

    InterruptTable(gates)
});

/// Loads the shared IDT on the calling core.
pub fn init() {
    let ptr = DescriptorTablePointer {
        limit: (core::mem::size_of::<InterruptTable>() - 1) as u16,
        base: VirtAddr::new(&*IDT as *const InterruptTable as u64),
    };
    unsafe { x86_64::instructions::tables::lidt(&ptr) };
}
