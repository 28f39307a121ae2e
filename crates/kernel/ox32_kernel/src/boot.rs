use core::arch::naked_asm;

use crate::kernel_main;

unsafe extern "C" {
    static __stack_top: [u8; 0];
}

/// The firmware jumps here in supervisor mode, with paging off.
///
/// Sets up the boot stack and enters `kernel_main`.
#[unsafe(naked)]
#[unsafe(no_mangle)]
#[unsafe(link_section = ".text.boot")]
pub extern "C" fn boot() -> ! {
    naked_asm!(
        "la sp, {stack_top}",
        "j {main}",
        stack_top = sym __stack_top,
        main = sym kernel_main,
    )
}
