use file_store::FsError;
use ox32_kernel_params::{FILE_DATA_MAX, FILE_NAME_MAX};
use ox32_syscall::SyscallError;
use page_alloc::DirectMap;
use page_table::PageTable;

use super::user_access_error;
use crate::{fs, proc};

fn fs_error(e: FsError) -> SyscallError {
    match e {
        FsError::NotFound => SyscallError::NotFound,
        FsError::TableFull => SyscallError::TableFull,
        FsError::NameTooLong => SyscallError::NameTooLong,
        FsError::InvalidName => SyscallError::InvalidName,
        _ => SyscallError::Io,
    }
}

/// Copies a NUL-terminated file name from user memory.
fn fetch_name<'a>(
    pt: PageTable,
    name_va: usize,
    buf: &'a mut [u8; FILE_NAME_MAX],
) -> Result<&'a [u8], SyscallError> {
    let len = pt
        .copy_in_str(DirectMap::IDENTITY, buf, name_va)
        .map_err(user_access_error)?;
    Ok(&buf[..len])
}

/// Reads up to `len` bytes of file `name_va` into `buf_va`.
pub fn sys_readfile(name_va: usize, buf_va: usize, len: usize) -> Result<usize, SyscallError> {
    let pt = proc::current_page_table();
    let mut name = [0; FILE_NAME_MAX];
    let name = fetch_name(pt, name_va, &mut name)?;

    let mut data = [0; FILE_DATA_MAX];
    let len = usize::min(len, data.len());
    let n = fs::lock()
        .read(name, &mut data[..len])
        .map_err(fs_error)?;
    pt.copy_out(DirectMap::IDENTITY, buf_va, &data[..n])
        .map_err(user_access_error)?;
    Ok(n)
}

/// Replaces the contents of file `name_va` with `len` bytes at `buf_va`.
pub fn sys_writefile(name_va: usize, buf_va: usize, len: usize) -> Result<usize, SyscallError> {
    let pt = proc::current_page_table();
    let mut name = [0; FILE_NAME_MAX];
    let name = fetch_name(pt, name_va, &mut name)?;

    let mut data = [0; FILE_DATA_MAX];
    let len = usize::min(len, data.len());
    pt.copy_in(DirectMap::IDENTITY, &mut data[..len], buf_va)
        .map_err(user_access_error)?;
    fs::lock().write(name, &data[..len]).map_err(fs_error)
}
