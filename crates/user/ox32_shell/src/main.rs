#![no_std]
#![no_main]

use core::ffi::CStr;

use ox32_kernel_params::{FILE_DATA_MAX, FILE_NAME_MAX};
use ox32_user_lib::{self as ulib, SyscallError, print, println};

const LINE_MAX: usize = 128;

/// Reads one line into `buf`, echoing input.
///
/// Returns the line without its terminator. Input past the buffer size is
/// dropped.
fn read_line(buf: &mut [u8; LINE_MAX]) -> Result<&str, SyscallError> {
    let mut len = 0;
    loop {
        match ulib::getchar()? {
            b'\r' | b'\n' => {
                println!();
                break;
            }
            // backspace or DEL
            0x08 | 0x7f => {
                if len > 0 {
                    len -= 1;
                    print!("\x08 \x08");
                }
            }
            c => {
                if len < buf.len() {
                    buf[len] = c;
                    len += 1;
                    ulib::putchar(c);
                }
            }
        }
    }
    core::str::from_utf8(&buf[..len]).or(Err(SyscallError::Failed))
}

/// Copies `name` into `buf` with a terminating NUL.
fn to_cstr<'a>(name: &str, buf: &'a mut [u8; FILE_NAME_MAX]) -> Option<&'a CStr> {
    let bytes = name.as_bytes();
    if bytes.len() >= buf.len() || bytes.contains(&0) {
        return None;
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    buf[bytes.len()] = 0;
    CStr::from_bytes_until_nul(&buf[..=bytes.len()]).ok()
}

fn read_file(name: &str) {
    let mut name_buf = [0; FILE_NAME_MAX];
    let Some(cname) = to_cstr(name, &mut name_buf) else {
        println!("readfile: invalid file name '{name}'");
        return;
    };
    let mut data = [0; FILE_DATA_MAX];
    match ulib::read_file(cname, &mut data) {
        Ok(n) => {
            for &b in &data[..n] {
                ulib::putchar(b);
            }
            println!();
        }
        Err(e) => println!("readfile: {name}: {e}"),
    }
}

fn write_file(name: &str, text: &str) {
    let mut name_buf = [0; FILE_NAME_MAX];
    let Some(cname) = to_cstr(name, &mut name_buf) else {
        println!("writefile: invalid file name '{name}'");
        return;
    };
    match ulib::write_file(cname, text.as_bytes()) {
        Ok(n) if n < text.len() => println!("writefile: {name}: truncated to {n} bytes"),
        Ok(_) => {}
        Err(e) => println!("writefile: {name}: {e}"),
    }
}

#[unsafe(no_mangle)]
extern "C" fn main() {
    let mut buf = [0; LINE_MAX];
    loop {
        print!("> ");
        let line = match read_line(&mut buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                println!("cannot read console: {e}");
                continue;
            }
        };

        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim_start();
        match cmd {
            "" => {}
            "hello" => println!("Hello world from shell!"),
            "exit" => ulib::exit(),
            "readfile" => {
                let (Some(name), None) = ({
                    let mut parts = rest.split_whitespace();
                    (parts.next(), parts.next())
                }) else {
                    println!("Usage: readfile <name>");
                    continue;
                };
                read_file(name);
            }
            "writefile" => {
                let (name, text) = rest.split_once(' ').unwrap_or((rest, ""));
                if name.is_empty() {
                    println!("Usage: writefile <name> <text>");
                    continue;
                }
                write_file(name, text.trim_start());
            }
            _ => println!("unknown command: {cmd}"),
        }
    }
}
