//! System call dispatch.

use ox32_syscall::{SyscallCode, SyscallError, encode_result};
use page_table::PageTableError;
use process::TrapFrame;

use crate::proc;

mod console;
mod file;

/// Runs system call `code` with the arguments in `tf` and stores the
/// result in `tf.a0`.
pub fn dispatch(code: SyscallCode, tf: &mut TrapFrame) {
    let res = match code {
        SyscallCode::Putchar => console::sys_putchar(tf.a0),
        SyscallCode::Getchar => console::sys_getchar(),
        SyscallCode::Exit => proc::exit_current(),
        SyscallCode::Readfile => file::sys_readfile(tf.a0, tf.a1, tf.a2),
        SyscallCode::Writefile => file::sys_writefile(tf.a0, tf.a1, tf.a2),
    };
    if let Err(e) = res {
        log::debug!("{code}: {e}");
    }
    tf.a0 = encode_result(res);
}

fn user_access_error(e: PageTableError) -> SyscallError {
    match e {
        PageTableError::StringTooLong => SyscallError::NameTooLong,
        _ => SyscallError::BadAddress,
    }
}
