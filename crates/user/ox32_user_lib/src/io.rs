//! Console output.

use core::fmt::{self, Write as _};

use crate::syscall;

/// Console writer; every byte is one `putchar` system call.
#[derive(Debug, Default)]
pub struct Stdout;

impl fmt::Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            syscall::putchar(b);
        }
        Ok(())
    }
}

pub fn print(args: fmt::Arguments<'_>) {
    let _ = Stdout.write_fmt(args);
}
