//! Console input and output, through the firmware.

use crate::sbi;

pub mod logger;
pub mod print;

/// Sends one byte to the console.
///
/// Called by `println!()` and by the `putchar` system call.
pub fn put_byte(c: u8) {
    sbi::console_putchar(c);
}

/// Polls the console for one input byte.
pub fn try_get_byte() -> Option<u8> {
    sbi::console_getchar()
}

pub fn init() {
    logger::init();
}
