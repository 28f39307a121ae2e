// Workaround for `cargo doc --workspace --target riscv32imac-unknown-none-elf` to work
#![cfg_attr(target_os = "none", no_std)]
#![cfg(not(target_os = "none"))]

use std::{
    env,
    fs,
    io,
    path::Path,
    process,
};

use dataview::PodMethods as _;
use ox32_fs_types::{BLOCK_SIZE, UstarHeader, entry_size};
use ox32_kernel_params::{DISK_MAX_SIZE, FILE_DATA_MAX, FILES_MAX};

fn main() -> io::Result<()> {
    let args = env::args().collect::<Vec<String>>();
    if args.len() < 2 {
        eprintln!("Usage: {} disk.img files...", args[0]);
        process::exit(1);
    }

    let image_file = &args[1];
    let mut files = vec![];
    for path in &args[2..] {
        let path = Path::new(path);
        let name = path.file_name().unwrap_or(path.as_os_str());
        let data = fs::read(path)?;
        files.push((name.as_encoded_bytes().to_vec(), data));
    }

    let image = build_image(files.iter().map(|(n, d)| (n.as_slice(), d.as_slice())))?;
    fs::write(image_file, image)?;
    Ok(())
}

/// Builds a ustar archive holding `files`, zero-padded to [`DISK_MAX_SIZE`].
fn build_image<'a, I>(files: I) -> io::Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
{
    let mut image = Vec::with_capacity(DISK_MAX_SIZE);
    for (i, (name, data)) in files.into_iter().enumerate() {
        let display = String::from_utf8_lossy(name);
        if i >= FILES_MAX {
            return Err(io::Error::other(format!(
                "too many files: at most {FILES_MAX} are supported"
            )));
        }
        if name.is_empty() {
            return Err(io::Error::other("empty file name"));
        }
        if data.len() > FILE_DATA_MAX {
            return Err(io::Error::other(format!(
                "{display}: file too large: {} > {FILE_DATA_MAX} bytes",
                data.len()
            )));
        }
        let header = UstarHeader::new(name, data.len())
            .map_err(|e| io::Error::other(format!("{display}: {e}")))?;

        let start = image.len();
        image.extend_from_slice(header.as_bytes());
        image.extend_from_slice(data);
        image.resize(start + entry_size(data.len()), 0);
    }
    assert!(image.len() <= DISK_MAX_SIZE);
    // the rest of the range reads as end-of-archive blocks
    image.resize(DISK_MAX_SIZE, 0);
    debug_assert_eq!(image.len() % BLOCK_SIZE, 0);
    Ok(image)
}
