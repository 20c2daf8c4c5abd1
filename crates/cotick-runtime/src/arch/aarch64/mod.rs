//! aarch64 context switching (AAPCS64)

use std::arch::naked_asm;

use super::EntryFn;

/// Callee-saved registers of a suspended context
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedRegs {
    pub sp: u64,       // 0x00
    pub lr: u64,       // 0x08
    pub x19_x28: [u64; 10], // 0x10..0x60
    pub fp: u64,       // 0x60
    pub d8_d15: [u64; 8], // 0x68..0xA8
}

/// Initialize a fresh context
///
/// The first switch `ret`s into the trampoline, which branches to
/// `entry_fn(entry_arg)`.
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
    let regs = &mut *regs;
    *regs = SavedRegs::default();
    regs.sp = ((stack_top as usize) & !0xF) as u64;
    regs.lr = context_trampoline as usize as u64;
    regs.x19_x28[0] = entry_fn as usize as u64;
    regs.x19_x28[1] = entry_arg as u64;
}

#[unsafe(naked)]
unsafe extern "C" fn context_trampoline() {
    naked_asm!(
        "mov x0, x20",
        "blr x19",
        "brk #1",
    );
}

/// Save callee-saved registers to `old` and resume the context in `new`
///
/// # Safety
///
/// Same contract as the x86_64 backend.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_old: *mut SavedRegs, _new: *const SavedRegs) {
    naked_asm!(
        // Save into old (x0)
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "str x30, [x0, #0x08]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "str x29, [x0, #0x60]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        // Load from new (x1)
        "ldr x9, [x1, #0x00]",
        "mov sp, x9",
        "ldr x30, [x1, #0x08]",
        "ldp x19, x20, [x1, #0x10]",
        "ldp x21, x22, [x1, #0x20]",
        "ldp x23, x24, [x1, #0x30]",
        "ldp x25, x26, [x1, #0x40]",
        "ldp x27, x28, [x1, #0x50]",
        "ldr x29, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_layout() {
        assert_eq!(std::mem::size_of::<SavedRegs>(), 0xA8);
        assert_eq!(std::mem::offset_of!(SavedRegs, fp), 0x60);
        assert_eq!(std::mem::offset_of!(SavedRegs, d8_d15), 0x68);
    }
}
