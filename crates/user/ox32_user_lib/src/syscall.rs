//! System call wrappers.

use core::ffi::CStr;

use ox32_syscall::{SyscallCode, SyscallError, decode_result};

#[cfg(not(target_arch = "riscv32"))]
fn syscall(_code: SyscallCode, _a0: usize, _a1: usize, _a2: usize) -> usize {
    unimplemented!()
}

#[cfg(target_arch = "riscv32")]
fn syscall(code: SyscallCode, a0: usize, a1: usize, a2: usize) -> usize {
    let ret;
    unsafe {
        core::arch::asm!(
            "ecall",
            inlateout("a0") a0 => ret,
            in("a1") a1,
            in("a2") a2,
            in("a3") code as usize,
            options(nostack),
        );
    }
    ret
}

/// Writes one byte to the console.
pub fn putchar(c: u8) {
    syscall(SyscallCode::Putchar, usize::from(c), 0, 0);
}

/// Reads one byte from the console, waiting until one is available.
pub fn getchar() -> Result<u8, SyscallError> {
    let c = decode_result(syscall(SyscallCode::Getchar, 0, 0, 0))?;
    u8::try_from(c).or(Err(SyscallError::Failed))
}

/// Terminates the calling process.
pub fn exit() -> ! {
    syscall(SyscallCode::Exit, 0, 0, 0);
    unreachable!("exit returned");
}

/// Reads file `name` into `buf`.
///
/// Returns the number of bytes read, which is at most the file size.
pub fn read_file(name: &CStr, buf: &mut [u8]) -> Result<usize, SyscallError> {
    decode_result(syscall(
        SyscallCode::Readfile,
        name.as_ptr().addr(),
        buf.as_mut_ptr().addr(),
        buf.len(),
    ))
}

/// Replaces the contents of file `name` with `data`, creating the file if
/// needed.
///
/// Returns the number of bytes written.
pub fn write_file(name: &CStr, data: &[u8]) -> Result<usize, SyscallError> {
    decode_result(syscall(
        SyscallCode::Writefile,
        name.as_ptr().addr(),
        data.as_ptr().addr(),
        data.len(),
    ))
}
