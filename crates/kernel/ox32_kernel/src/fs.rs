//! The file store on the virtio block device.

use file_store::FileStore;
use ox32_kernel_params::SECTOR_SIZE;
use virtio_blk::VirtioBlk;

use crate::{
    device::{MmioTransport, VIRTIO_BLK},
    memory,
    sync::{SpinLock, SpinLockGuard},
};

pub type Disk = VirtioBlk<MmioTransport>;

static FILE_STORE: SpinLock<FileStore<Disk>> = SpinLock::new(FileStore::new());

/// Initializes the block device and loads the file table from it.
pub fn init() {
    let transport = unsafe { MmioTransport::new(VIRTIO_BLK) };
    let disk = match memory::with_allocator(|alloc| VirtioBlk::init(transport, alloc)) {
        Ok(disk) => disk,
        Err(e) => panic!("virtio-blk: {e}"),
    };
    log::info!(
        "virtio-blk: capacity is {} bytes",
        disk.capacity() * SECTOR_SIZE as u64
    );

    let mut fs = FILE_STORE.lock();
    if let Err(e) = fs.mount(disk) {
        panic!("file store: {e}");
    }
    for file in fs.iter() {
        log::info!("file: {}, size={}", file.name().escape_ascii(), file.size());
    }
}

pub fn lock() -> SpinLockGuard<'static, FileStore<Disk>> {
    FILE_STORE.lock()
}
