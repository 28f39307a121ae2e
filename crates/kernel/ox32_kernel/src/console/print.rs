//! Formatted console output

use core::{
    fmt::{self, Write as _},
    sync::atomic::{AtomicBool, Ordering},
};

use riscv::asm;

use crate::{
    console,
    sync::{SpinLock, SpinLockGuard},
};

// lock to avoid interleaving print's.
struct Print {
    locking: AtomicBool,
    lock: SpinLock<()>,
}

static PRINT: Print = Print {
    locking: AtomicBool::new(true),
    lock: SpinLock::new(()),
};

impl Print {
    fn lock(&self) -> Writer<'_> {
        let guard = self
            .locking
            .load(Ordering::Relaxed)
            .then(|| self.lock.lock());
        Writer { _guard: guard }
    }
}

struct Writer<'a> {
    _guard: Option<SpinLockGuard<'a, ()>>,
}

impl fmt::Write for Writer<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            console::put_byte(b);
        }
        Ok(())
    }
}

pub fn print_fmt(args: fmt::Arguments) {
    let mut writer = PRINT.lock();
    let _ = writer.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::print::print_fmt(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {
        $crate::print!("{}\n", format_args!($($arg)*))
    };
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    // the panicking code may hold the print lock.
    PRINT.locking.store(false, Ordering::Relaxed);
    match info.location() {
        Some(loc) => println!("PANIC: {}:{}: {}", loc.file(), loc.line(), info.message()),
        None => println!("PANIC: {}", info.message()),
    }
    loop {
        asm::wfi();
    }
}
