//! Virtio device definitions for the legacy MMIO interface, and the
//! virtqueue and block-request layouts shared with the device.
//!
//! Virtio 1.1, section 4.2.4 (legacy interface):
//! <https://docs.oasis-open.org/virtio/virtio/v1.1/virtio-v1.1.pdf>

use core::sync::atomic::AtomicU16;

use bitflags::bitflags;
use ox32_kernel_params::{SECTOR_SIZE, VIRTQ_ENTRY_NUM};

// Legacy (version 1) virtio MMIO control registers.
// from qemu virtio_mmio.h
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum MmioRegister {
    MagicValue = 0x000, // 0x74726976
    Version = 0x004,    // version; 1 for legacy
    DeviceId = 0x008,   // device type; 1 is net, 2 is disk
    GuestPageSize = 0x028, // page size for QueuePfn, write-only
    QueueSel = 0x030,      // select queue, write-only
    QueueNumMax = 0x034,   // max size of current queue, read-only
    QueueNum = 0x038,      // size of current queue, write-only
    QueueAlign = 0x03c,    // used ring alignment, write-only
    QueuePfn = 0x040,      // page number of the queue, read/write
    QueueNotify = 0x050,   // write-only
    Status = 0x070,        // read/write
    Config = 0x100,        // device-specific configuration space
}

pub const MAGIC_VALUE: u32 = 0x7472_6976;
pub const LEGACY_VERSION: u32 = 1;
pub const DEVICE_ID_BLOCK: u32 = 2;

bitflags! {
    /// Status register bits, from qemu virtio_config.h
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceStatus: u32 {
        const ACKNOWLEDGE = 1;
        const DRIVER = 2;
        const DRIVER_OK = 4;
        const FEATURES_OK = 8;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct VirtqDescFlags: u16 {
        /// Chained with another descriptor.
        const NEXT = 1;
        /// Device writes (vs read).
        const WRITE = 2;
    }
}

// A single descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VirtqDesc {
    pub addr: u64,
    pub len: u32,
    pub flags: VirtqDescFlags,
    pub next: u16,
}

// The (entire) avail ring.
#[repr(C)]
pub struct VirtqAvail {
    pub flags: u16,                   // always zero
    pub idx: AtomicU16,               // driver will write ring[idx] next
    pub ring: [u16; VIRTQ_ENTRY_NUM], // descriptor numbers of chain heads
    pub used_event: u16,
}

// One entry in the "used" ring, with which the
// device tells the driver about completed requests.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VirtqUsedElem {
    pub id: u32, // index of start of completed descriptor chain
    pub len: u32,
}

#[repr(C, align(4096))]
pub struct VirtqUsed {
    pub flags: u16,     // always zero
    pub idx: AtomicU16, // device increments when it adds a ring[] entry
    pub ring: [VirtqUsedElem; VIRTQ_ENTRY_NUM],
    pub avail_event: u16,
}

/// The legacy virtqueue, laid out the way the device expects for
/// `QueueAlign = 4096`: descriptors and the avail ring first, the used ring
/// on the next page.
#[repr(C, align(4096))]
pub struct VirtQueue {
    pub desc: [VirtqDesc; VIRTQ_ENTRY_NUM],
    pub avail: VirtqAvail,
    pub used: VirtqUsed,
}

pub const BLK_T_IN: u32 = 0; // read the disk
pub const BLK_T_OUT: u32 = 1; // write the disk

/// The single in-flight block request.
///
/// The header (`ty`, `reserved`, `sector`), the data, and the status byte
/// are handed to the device as three chained descriptors.
#[repr(C)]
pub struct VirtioBlkReq {
    pub ty: u32,
    pub reserved: u32,
    pub sector: u64,
    pub data: [u8; SECTOR_SIZE],
    pub status: u8,
}

/// Length of the request header descriptor.
pub const BLK_REQ_HEADER_LEN: usize = 16;

const _: () = {
    assert!(size_of::<VirtqDesc>() == 16);
    assert!(core::mem::offset_of!(VirtQueue, used) == 4096);
    assert!(core::mem::offset_of!(VirtioBlkReq, data) == BLK_REQ_HEADER_LEN);
};
