//! Runtime support for ox32 user programs.
//!
//! Provides the `_start` entry point, the system call wrappers, and
//! console printing macros.
#![no_std]

pub use ox32_syscall::SyscallError;

#[macro_use]
mod macros;

pub mod io;
mod rt;
pub mod syscall;

pub use self::syscall::{exit, getchar, putchar, read_file, write_file};
