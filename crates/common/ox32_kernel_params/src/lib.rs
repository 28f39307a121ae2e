#![no_std]

/// Size of a physical page and of a virtual page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of processes, including the idle process.
pub const PROCS_MAX: usize = 8;

/// Size of each per-process kernel stack.
pub const KERNEL_STACK_SIZE: usize = 8192;

/// Virtual address where user images are loaded.
///
/// Must match the base address in the user linker script.
pub const USER_BASE: usize = 0x0100_0000;

/// Upper bound of a user image (exclusive).
pub const USER_END: usize = 0x0180_0000;

/// Size of a disk sector.
pub const SECTOR_SIZE: usize = 512;

/// Number of descriptors in the block device's virtqueue.
pub const VIRTQ_ENTRY_NUM: usize = 16;

/// Maximum number of files in the file store.
pub const FILES_MAX: usize = 8;

/// Length of a file name field, including the terminating NUL.
pub const FILE_NAME_MAX: usize = 100;

/// Maximum size of a file's contents.
pub const FILE_DATA_MAX: usize = 1024;

/// Size of the archive range on disk that the file store reads and rewrites.
///
/// Every file takes one header sector plus its data rounded up to sectors,
/// so a full file table always fits.
pub const DISK_MAX_SIZE: usize =
    FILES_MAX * (SECTOR_SIZE + FILE_DATA_MAX.next_multiple_of(SECTOR_SIZE));
