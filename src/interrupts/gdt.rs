//! GDT with per-core TSS entries.
//!
//! The descriptor layout is ABI for the rest of the kernel: trapframes are
//! stamped with these raw selector values when a task is created, so the
//! append order below must keep matching the constants.
//!
//! Every core loads the same GDT but its own TSS descriptor, each with its
//! own RSP0 stack: `ltr` marks the loaded descriptor busy, and two cores
//! taking ring-3 traps at once must never land on the same kernel stack.

use spin::Lazy;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

use crate::config::NR_CPUS;

pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;

/// Selector of core 0's TSS; each further core's is 16 bytes later (a TSS
/// descriptor spans two GDT slots in long mode).
pub const TSS_BASE_SELECTOR: u16 = 0x28;

const KERNEL_STACK_SIZE: usize = 4 * 4096;

/// Stacks the CPU switches to when a ring-3 task traps into the kernel,
/// one per core.
static mut KERNEL_STACKS: [[u8; KERNEL_STACK_SIZE]; NR_CPUS] =
    [[0; KERNEL_STACK_SIZE]; NR_CPUS];

static TSS: Lazy<[TaskStateSegment; NR_CPUS]> = Lazy::new(|| {
    core::array::from_fn(|cpu| {
        let mut tss = TaskStateSegment::new();
        tss.privilege_stack_table[0] = {
            let start = unsafe { core::ptr::addr_of!(KERNEL_STACKS[cpu]) as u64 };
            VirtAddr::new(start + KERNEL_STACK_SIZE as u64)
        };
        tss
    })
});

struct Selectors {
    code_selector: SegmentSelector,
    data_selector: SegmentSelector,
    tss_selectors: [SegmentSelector; NR_CPUS],
}

static GDT: Lazy<(GlobalDescriptorTable<32>, Selectors)> = Lazy::new(|| {
    let mut gdt = GlobalDescriptorTable::<32>::empty();

    let code_selector = gdt.append(Descriptor::kernel_code_segment());
    let data_selector = gdt.append(Descriptor::kernel_data_segment());
    let user_code = gdt.append(Descriptor::user_code_segment());
    let user_data = gdt.append(Descriptor::user_data_segment());
    let tss_selectors =
        core::array::from_fn(|cpu| gdt.append(Descriptor::tss_segment(&TSS[cpu])));

    debug_assert_eq!(code_selector.0, KERNEL_CODE_SELECTOR);
    debug_assert_eq!(data_selector.0, KERNEL_DATA_SELECTOR);
    debug_assert_eq!(user_code.0 | 3, USER_CODE_SELECTOR);
    debug_assert_eq!(user_data.0 | 3, USER_DATA_SELECTOR);

    (
        gdt,
        Selectors {
            code_selector,
            data_selector,
            tss_selectors,
        },
    )
});

/// Loads the shared GDT, the kernel segment registers, and this core's own
/// TSS descriptor. Called once per core.
pub fn init(cpu: usize) {
    let (ref gdt, ref selectors) = *GDT;
    gdt.load();

    unsafe {
        use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};

        CS::set_reg(selectors.code_selector);
        DS::set_reg(selectors.data_selector);
        ES::set_reg(selectors.data_selector);
        SS::set_reg(selectors.data_selector);

        x86_64::instructions::tables::load_tss(selectors.tss_selectors[cpu]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_core_gets_its_own_tss_descriptor_and_stack() {
        let (_, selectors) = &*GDT;
        for cpu in 0..NR_CPUS {
            assert_eq!(
                selectors.tss_selectors[cpu].0,
                TSS_BASE_SELECTOR + cpu as u16 * 16
            );
        }
        // RSP0 stacks are distinct and adjacent, so no two cores taking
        // ring-3 traps concurrently can overwrite each other's frames.
        for cpu in 1..NR_CPUS {
            let prev = TSS[cpu - 1].privilege_stack_table[0].as_u64();
            let cur = TSS[cpu].privilege_stack_table[0].as_u64();
            assert_eq!(cur, prev + KERNEL_STACK_SIZE as u64);
        }
    }
}
