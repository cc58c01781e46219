//! # Programmable Interrupt Controller (8259 PIC)
//!
//! Configures the legacy 8259 PIC pair for interrupt routing.
//!
//! ## Vector Remapping
//!
//! By default IRQ 0-15 conflict with CPU exception vectors, so they are
//! remapped:
//! - PIC 1: vectors 32-39 (IRQ 0-7)
//! - PIC 2: vectors 40-47 (IRQ 8-15)
//!
//! ## Interrupt Assignments
//!
//! | IRQ | Vector | Source    |
//! |-----|--------|-----------|
//! | 0   | 32     | Timer     |
//! | 1   | 33     | Keyboard  |
//! | -   | 48     | Syscall (`int 0x30`, software only) |

use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;

pub const PIC_1_OFFSET: u8 = 32; // Primary PIC handles IRQs 0-7
pub const PIC_2_OFFSET: u8 = 40; // Secondary PIC handles IRQs 8-15

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// Actual vector numbers the CPU sees.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,        // 32 - IRQ0
    Keyboard = PIC_1_OFFSET + 1, // 33 - IRQ1
    Syscall = 0x30,              // 48 - software gate, outside PIC range
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }
}

/// PIT divisor for a 100 Hz tick (1193182 Hz input clock).
const PIT_DIVISOR: u16 = 11932;

/// Programs PIT channel 0 as a rate generator so the timer IRQ fires at
/// ~100 Hz, one kernel tick per interrupt.
pub fn init_timer() {
    unsafe {
        let mut command = Port::<u8>::new(0x43);
        let mut channel0 = Port::<u8>::new(0x40);
        // Channel 0, lobyte/hibyte access, mode 2.
        command.write(0x34);
        channel0.write((PIT_DIVISOR & 0xFF) as u8);
        channel0.write((PIT_DIVISOR >> 8) as u8);
    }
}

/// Unmasks the timer and keyboard IRQ lines on the primary PIC.
pub fn unmask_irqs() {
    unsafe {
        let mut pic1_data = Port::<u8>::new(0x21);
        let mask: u8 = pic1_data.read();
        pic1_data.write(mask & !0b11); // IRQ0 timer, IRQ1 keyboard
    }
}
