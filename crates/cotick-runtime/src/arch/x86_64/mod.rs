//! x86_64 context switching (System V AMD64)

use std::arch::naked_asm;

use super::EntryFn;

/// Callee-saved registers of a suspended context
///
/// Offsets are fixed; `switch_context` addresses the fields directly.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedRegs {
    pub rsp: u64, // 0x00
    pub rip: u64, // 0x08
    pub rbx: u64, // 0x10
    pub rbp: u64, // 0x18
    pub r12: u64, // 0x20
    pub r13: u64, // 0x28
    pub r14: u64, // 0x30
    pub r15: u64, // 0x38
}

/// Initialize a fresh context
///
/// The first switch into `regs` lands in the trampoline with `rsp` 16-byte
/// aligned, which then `call`s `entry_fn(entry_arg)`.
///
/// # Safety
///
/// `regs` must be valid for writes and `stack_top` must be the exclusive top
/// of a mapped, writable stack.
#[inline]
pub unsafe fn init_context(
    regs: *mut SavedRegs,
    stack_top: *mut u8,
    entry_fn: EntryFn,
    entry_arg: usize,
) {
    // `call` in the trampoline pushes the return address, so the callee
    // sees rsp % 16 == 8 as the ABI requires.
    let aligned_sp = (stack_top as usize) & !0xF;

    let regs = &mut *regs;
    *regs = SavedRegs::default();
    regs.rsp = aligned_sp as u64;
    regs.rip = context_trampoline as usize as u64;
    regs.r12 = entry_fn as usize as u64;
    regs.r13 = entry_arg as u64;
}

#[unsafe(naked)]
unsafe extern "C" fn context_trampoline() {
    naked_asm!(
        "mov rdi, r13",
        "call r12",
        // entry functions never return
        "ud2",
    );
}

/// Save callee-saved registers to `old` and resume the context in `new`
///
/// Returns when some other context switches back into `old`.
///
/// # Safety
///
/// Both pointers must be valid, and `new` must hold either a context saved
/// by this function or one prepared by [`init_context`] whose stack is
/// still mapped.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_old: *mut SavedRegs, _new: *const SavedRegs) {
    naked_asm!(
        // Save into old (RDI)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // Load from new (RSI)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "jmp rax",
        // Saved contexts resume here and return to switch_context's caller
        "1:",
        "ret",
    );
}
