//! Assembly entry stubs shared by every IDT gate.
//!
//! Each stub normalizes the stack to the [`Trapframe`] layout: the CPU
//! pushes `ss..rip` (plus an error code for some exceptions), the stub
//! pushes a placeholder error code where needed and its cause vector, and
//! `trap_common` saves the register file and segment pair. The dispatcher
//! returns the frame pointer to resume, which `trap_return` restores —
//! switching tasks whenever that pointer is a different task's stored
//! frame.
//!
//! Push order is the layout contract with [`Trapframe`]; the two must
//! change together.
//!
//! [`Trapframe`]: crate::trap::Trapframe

use crate::trap::Trapframe;

core::arch::global_asm!(
    r#"
    .section .text

    .global trap_entry_default
    .global trap_entry_default_err
    .global trap_entry_page_fault
    .global trap_entry_timer
    .global trap_entry_keyboard
    .global trap_entry_syscall
    .global trap_return

trap_entry_default:
    push 0
    push 0xFF
    jmp trap_common

trap_entry_default_err:
    push 0xFF
    jmp trap_common

trap_entry_page_fault:
    push 14
    jmp trap_common

trap_entry_timer:
    push 0
    push 32
    jmp trap_common

trap_entry_keyboard:
    push 0
    push 33
    jmp trap_common

trap_entry_syscall:
    push 0
    push 0x30
    jmp trap_common

trap_common:
    push rax
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push rbp
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    mov rax, ds
    push rax
    mov rax, es
    push rax

    mov rdi, rsp
    call kernel_trap_handler
    mov rsp, rax

trap_return:
    pop rax
    mov es, ax
    pop rax
    mov ds, ax
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rbp
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rbx
    pop rax
    add rsp, 16
    iretq
"#
);

extern "C" {
    fn trap_entry_default();
    fn trap_entry_default_err();
    fn trap_entry_page_fault();
    fn trap_entry_timer();
    fn trap_entry_keyboard();
    fn trap_entry_syscall();
    fn trap_return() -> !;
}

pub fn entry_default() -> usize {
    trap_entry_default as usize
}

pub fn entry_default_err() -> usize {
    trap_entry_default_err as usize
}

pub fn entry_page_fault() -> usize {
    trap_entry_page_fault as usize
}

pub fn entry_timer() -> usize {
    trap_entry_timer as usize
}

pub fn entry_keyboard() -> usize {
    trap_entry_keyboard as usize
}

pub fn entry_syscall() -> usize {
    trap_entry_syscall as usize
}

/// Drops into a task by restoring its stored trapframe. Used for the very
/// first entry on each core; afterwards `trap_common` handles restores.
///
/// # Safety
///
/// `frame` must point at a fully initialized trapframe whose address space
/// is active on this core.
pub unsafe fn restore_trapframe(frame: *mut Trapframe) -> ! {
    let target: unsafe extern "C" fn() -> ! = trap_return;
    core::arch::asm!(
        "mov rsp, {frame}",
        "jmp {target}",
        frame = in(reg) frame as u64,
        target = in(reg) target as usize as u64,
        options(noreturn)
    );
}
