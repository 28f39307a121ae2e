use ox32_syscall::SyscallError;

use crate::{console, proc};

pub fn sys_putchar(c: usize) -> Result<usize, SyscallError> {
    // only the low byte is meaningful
    console::put_byte(c.to_le_bytes()[0]);
    Ok(0)
}

/// Waits for one input byte, letting other processes run between polls.
pub fn sys_getchar() -> Result<usize, SyscallError> {
    loop {
        if let Some(c) = console::try_get_byte() {
            return Ok(usize::from(c));
        }
        proc::yield_now();
    }
}
