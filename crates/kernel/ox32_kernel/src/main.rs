#![no_std]
#![no_main]

mod boot;
mod console;
mod device;
mod fs;
mod interrupt;
mod memory;
mod proc;
mod sbi;
mod sync;
mod syscall;

#[cfg(feature = "shell_env")]
static SHELL_IMAGE: &[u8] = include_bytes!(env!("SHELL_BIN_PATH"));
#[cfg(not(feature = "shell_env"))]
static SHELL_IMAGE: &[u8] = &[];

// boot() jumps here on the boot stack.
extern "C" fn kernel_main() -> ! {
    unsafe {
        memory::clear_bss();
    }
    console::init();
    println!();
    println!("ox32 kernel is booting");
    println!();

    memory::init(); // physical page allocator
    interrupt::trap::init(); // install trap vector
    proc::init(); // process table and idle process
    fs::init(); // block device and file table

    if SHELL_IMAGE.is_empty() {
        log::warn!("no shell image embedded");
    } else {
        proc::spawn_user(SHELL_IMAGE);
    }

    proc::idle();
}
