//! Program entry and panic handling.

#[cfg(target_arch = "riscv32")]
mod entry {
    use core::arch::naked_asm;

    unsafe extern "C" {
        static __stack_top: [u8; 0];
    }

    // The kernel maps the image at the user base and starts at its first
    // byte, which the linker script fills with `.text.start`.
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    #[unsafe(link_section = ".text.start")]
    extern "C" fn _start() -> ! {
        naked_asm!(
            "la sp, {stack_top}",
            "call main",
            "call {exit}",
            stack_top = sym __stack_top,
            exit = sym exit_after_main,
        )
    }

    extern "C" fn exit_after_main() -> ! {
        crate::exit()
    }
}

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    crate::println!("panic: {info}");
    crate::exit()
}
