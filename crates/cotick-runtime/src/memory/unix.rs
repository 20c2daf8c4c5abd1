//! Unix stack implementation using mmap

use cotick_core::error::MemoryError;

/// An mmap'd coroutine stack
///
/// Layout, low to high: one `PROT_NONE` guard page, then `usable` bytes of
/// read/write stack. The stack grows down from [`Stack::top`].
pub struct Stack {
    base: *mut u8,
    total: usize,
    guard: usize,
}

impl Stack {
    /// Map a stack with at least `size` usable bytes (rounded up to pages)
    pub fn allocate(size: usize) -> Result<Self, MemoryError> {
        let page = page_size();
        let usable = size
            .checked_add(page - 1)
            .map(|s| s & !(page - 1))
            .ok_or(MemoryError::TooLarge)?;
        let total = usable.checked_add(page).ok_or(MemoryError::TooLarge)?;

        // Reserve everything inaccessible, then open up the usable part
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed);
        }

        let stack = Stack {
            base: base as *mut u8,
            total,
            guard: page,
        };

        let ret = unsafe {
            libc::mprotect(
                stack.base.add(page) as *mut libc::c_void,
                usable,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if ret != 0 {
            // Drop unmaps
            return Err(MemoryError::ProtectionFailed);
        }

        Ok(stack)
    }

    /// Exclusive upper bound of the stack
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.add(self.total) }
    }

    /// Lowest usable address (just above the guard page)
    #[inline]
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.add(self.guard) }
    }

    /// Usable bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.total - self.guard
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.total);
        }
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &self.bottom())
            .field("top", &self.top())
            .field("size", &self.size())
            .finish()
    }
}

/// System page size
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}
