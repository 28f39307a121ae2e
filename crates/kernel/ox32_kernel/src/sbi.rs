//! Supervisor Binary Interface calls into the firmware.

use core::arch::asm;

/// Legacy console putchar extension.
const EID_CONSOLE_PUTCHAR: usize = 0x01;
/// Legacy console getchar extension.
const EID_CONSOLE_GETCHAR: usize = 0x02;
/// System Reset extension ("SRST").
const EID_SRST: usize = 0x5352_5354;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SbiRet {
    error: isize,
    value: isize,
}

#[expect(clippy::too_many_arguments)]
fn sbi_call(
    arg0: usize,
    arg1: usize,
    arg2: usize,
    arg3: usize,
    arg4: usize,
    arg5: usize,
    fid: usize,
    eid: usize,
) -> SbiRet {
    let error: isize;
    let value: isize;
    unsafe {
        asm!(
            "ecall",
            inlateout("a0") arg0 => error,
            inlateout("a1") arg1 => value,
            in("a2") arg2,
            in("a3") arg3,
            in("a4") arg4,
            in("a5") arg5,
            in("a6") fid,
            in("a7") eid,
        );
    }
    SbiRet { error, value }
}

/// Emits one byte on the firmware console.
pub fn console_putchar(c: u8) {
    sbi_call(usize::from(c), 0, 0, 0, 0, 0, 0, EID_CONSOLE_PUTCHAR);
}

/// Polls the firmware console.
///
/// Returns `None` if no input is pending.
pub fn console_getchar() -> Option<u8> {
    // legacy extensions return their value in a0
    let ret = sbi_call(0, 0, 0, 0, 0, 0, 0, EID_CONSOLE_GETCHAR);
    u8::try_from(ret.error).ok()
}

/// Powers the machine off.
pub fn shutdown() -> ! {
    const SHUTDOWN: usize = 0;
    const NO_REASON: usize = 0;
    let ret = sbi_call(SHUTDOWN, NO_REASON, 0, 0, 0, 0, 0, EID_SRST);
    panic!("shutdown failed: error={}, value={}", ret.error, ret.value);
}
