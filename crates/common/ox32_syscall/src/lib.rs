//! System call ABI shared by the kernel and user programs.
//!
//! A system call is an `ecall` with the call number in `a3` and up to three
//! arguments in `a0`..`a2`. The result is returned in `a0`; failures are
//! reported as `-1`.
#![cfg_attr(not(test), no_std)]

use strum::{Display, EnumString, FromRepr};

pub use self::error::SyscallError;

mod error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, EnumString, Display)]
#[repr(usize)]
#[strum(serialize_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum SyscallCode {
    Putchar = 1,
    Getchar,
    Exit,
    Readfile,
    Writefile,
}

/// Value placed in `a0` when a system call fails.
pub const RETURN_ERROR: usize = usize::MAX;

/// Encodes the result of a system call into the value returned in `a0`.
#[must_use]
pub fn encode_result(res: Result<usize, SyscallError>) -> usize {
    res.unwrap_or(RETURN_ERROR)
}

/// Decodes the value returned in `a0` into a system call result.
///
/// The kernel does not report which error occurred, so every failure is
/// decoded as [`SyscallError::Failed`].
pub fn decode_result(ret: usize) -> Result<usize, SyscallError> {
    if ret == RETURN_ERROR {
        return Err(SyscallError::Failed);
    }
    Ok(ret)
}
