//! Memory-mapped devices on the QEMU `virt` machine.

use core::ptr;

use vcell::VolatileCell;
use virtio_blk::{Transport, queue::MmioRegister};

/// virtio mmio interface for the block device.
pub const VIRTIO_BLK: usize = 0x1000_1000;

/// Register access to a legacy virtio-mmio device.
#[derive(Debug)]
pub struct MmioTransport {
    base: usize,
}

impl MmioTransport {
    /// # Safety
    ///
    /// `base` must be the address of a virtio-mmio register block, mapped
    /// in every address space the transport is used in.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn reg(&self, reg: MmioRegister, offset: usize) -> &VolatileCell<u32> {
        let addr = self.base + reg as usize + offset;
        unsafe { &*ptr::with_exposed_provenance::<VolatileCell<u32>>(addr) }
    }
}

impl Transport for MmioTransport {
    fn read32(&self, reg: MmioRegister, offset: usize) -> u32 {
        self.reg(reg, offset).get()
    }

    fn write32(&self, reg: MmioRegister, offset: usize, value: u32) {
        self.reg(reg, offset).set(value);
    }
}
