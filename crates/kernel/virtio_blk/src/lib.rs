//! Driver for the legacy virtio-mmio block device.
//!
//! I/O is synchronous: one request is in flight at a time, and the driver
//! spins on the used ring until the device completes it.
#![cfg_attr(not(test), no_std)]

use core::{
    hint,
    mem::offset_of,
    ptr,
    sync::atomic::{self, Ordering},
};

use block_io::BlockDevice;
use ox32_kernel_params::{PAGE_SIZE, SECTOR_SIZE, VIRTQ_ENTRY_NUM};
use page_alloc::{AllocError, DirectMap, PageAllocator, PhysAddr};

use self::queue::{
    BLK_REQ_HEADER_LEN, BLK_T_IN, BLK_T_OUT, DEVICE_ID_BLOCK, DeviceStatus, LEGACY_VERSION,
    MAGIC_VALUE, MmioRegister, VirtQueue, VirtioBlkReq, VirtqDesc, VirtqDescFlags,
};

#[cfg(test)]
mod fake;
pub mod queue;

/// Access to the device's MMIO registers.
pub trait Transport {
    fn read32(&self, reg: MmioRegister, offset: usize) -> u32;
    fn write32(&self, reg: MmioRegister, offset: usize, value: u32);
}

impl<T> Transport for &T
where
    T: Transport + ?Sized,
{
    fn read32(&self, reg: MmioRegister, offset: usize) -> u32 {
        (**self).read32(reg, offset)
    }

    fn write32(&self, reg: MmioRegister, offset: usize, value: u32) {
        (**self).write32(reg, offset, value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VirtioError {
    #[error("invalid magic value {0:#x}")]
    BadMagic(u32),
    #[error("unsupported version {0}")]
    BadVersion(u32),
    #[error("not a block device: device id {0}")]
    NotBlockDevice(u32),
    #[error("queue too small: max {0}")]
    QueueTooSmall(u32),
    #[error("queue address {0} out of range")]
    QueueOutOfRange(PhysAddr),
    #[error("allocation failed: {0}")]
    Alloc(#[from] AllocError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("sector {sector} out of range (capacity {capacity})")]
    SectorOutOfRange { sector: u64, capacity: u64 },
    #[error("device returned status {0}")]
    Device(u8),
}

/// A legacy virtio block device with one virtqueue and one request buffer.
#[derive(Debug)]
pub struct VirtioBlk<T> {
    transport: T,
    map: DirectMap,
    queue: PhysAddr,
    req: PhysAddr,
    /// Capacity in sectors.
    capacity: u64,
    last_used: u16,
}

impl<T> VirtioBlk<T>
where
    T: Transport,
{
    fn read_reg(&self, reg: MmioRegister) -> u32 {
        self.transport.read32(reg, 0)
    }

    fn write_reg(&self, reg: MmioRegister, value: u32) {
        self.transport.write32(reg, 0, value);
    }

    fn write_status(&self, status: DeviceStatus) {
        self.write_reg(MmioRegister::Status, status.bits());
    }

    /// Negotiates with the device and sets up queue 0.
    pub fn init(transport: T, alloc: &mut PageAllocator) -> Result<Self, VirtioError> {
        let magic = transport.read32(MmioRegister::MagicValue, 0);
        if magic != MAGIC_VALUE {
            return Err(VirtioError::BadMagic(magic));
        }
        let version = transport.read32(MmioRegister::Version, 0);
        if version != LEGACY_VERSION {
            return Err(VirtioError::BadVersion(version));
        }
        let device_id = transport.read32(MmioRegister::DeviceId, 0);
        if device_id != DEVICE_ID_BLOCK {
            return Err(VirtioError::NotBlockDevice(device_id));
        }

        let queue = alloc.allocate(size_of::<VirtQueue>().div_ceil(PAGE_SIZE))?;
        let req = alloc.allocate(size_of::<VirtioBlkReq>().div_ceil(PAGE_SIZE))?;
        let pfn = u32::try_from(queue.page_num()).or(Err(VirtioError::QueueOutOfRange(queue)))?;

        let mut blk = Self {
            transport,
            map: alloc.direct_map(),
            queue,
            req,
            capacity: 0,
            last_used: 0,
        };

        let mut status = DeviceStatus::empty();

        // reset device
        blk.write_status(status);

        // set ACKNOWLEDGE status bit
        status |= DeviceStatus::ACKNOWLEDGE;
        blk.write_status(status);

        // set DRIVER status bit
        status |= DeviceStatus::DRIVER;
        blk.write_status(status);

        // no optional features are used
        status |= DeviceStatus::FEATURES_OK;
        blk.write_status(status);

        // initialize queue 0.
        blk.write_reg(MmioRegister::GuestPageSize, PAGE_SIZE as u32);
        blk.write_reg(MmioRegister::QueueSel, 0);
        let max = blk.read_reg(MmioRegister::QueueNumMax);
        if (max as usize) < VIRTQ_ENTRY_NUM {
            return Err(VirtioError::QueueTooSmall(max));
        }
        blk.write_reg(MmioRegister::QueueNum, VIRTQ_ENTRY_NUM as u32);
        blk.write_reg(MmioRegister::QueueAlign, PAGE_SIZE as u32);
        blk.write_reg(MmioRegister::QueuePfn, pfn);

        // tell device we're completely ready.
        status |= DeviceStatus::DRIVER_OK;
        blk.write_status(status);

        let lo = blk.transport.read32(MmioRegister::Config, 0);
        let hi = blk.transport.read32(MmioRegister::Config, 4);
        blk.capacity = (u64::from(hi) << 32) | u64::from(lo);
        log::debug!(
            "virtio-blk: capacity {} sectors, queue at {queue}",
            blk.capacity
        );

        Ok(blk)
    }

    /// Returns the device capacity in sectors.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn queue_ptr(&self) -> *mut VirtQueue {
        self.map.ptr(self.queue)
    }

    fn req_ptr(&self) -> *mut VirtioBlkReq {
        self.map.ptr(self.req)
    }

    /// Reads sector `sector` into `buf`, or writes `buf` to it.
    ///
    /// Blocks until the device completes the request.
    pub fn read_write(
        &mut self,
        buf: &mut [u8; SECTOR_SIZE],
        sector: u64,
        is_write: bool,
    ) -> Result<(), BlockError> {
        if sector >= self.capacity {
            log::warn!(
                "virtio-blk: tried to access sector {sector}, but capacity is {}",
                self.capacity
            );
            return Err(BlockError::SectorOutOfRange {
                sector,
                capacity: self.capacity,
            });
        }

        let req = self.req_ptr();
        unsafe {
            (*req).ty = if is_write { BLK_T_OUT } else { BLK_T_IN };
            (*req).reserved = 0;
            (*req).sector = sector;
            if is_write {
                (*req).data = *buf;
            }
            // device writes 0 on success
            ptr::write_volatile(&raw mut (*req).status, 0xff);
        }

        let req_addr = self.req.addr() as u64;
        let data_flags = if is_write {
            VirtqDescFlags::empty() // device reads data
        } else {
            VirtqDescFlags::WRITE // device writes data
        };
        let chain = [
            VirtqDesc {
                addr: req_addr + offset_of!(VirtioBlkReq, ty) as u64,
                len: BLK_REQ_HEADER_LEN as u32,
                flags: VirtqDescFlags::NEXT,
                next: 1,
            },
            VirtqDesc {
                addr: req_addr + offset_of!(VirtioBlkReq, data) as u64,
                len: SECTOR_SIZE as u32,
                flags: data_flags | VirtqDescFlags::NEXT,
                next: 2,
            },
            VirtqDesc {
                addr: req_addr + offset_of!(VirtioBlkReq, status) as u64,
                len: 1,
                flags: VirtqDescFlags::WRITE,
                next: 0,
            },
        ];

        let queue = self.queue_ptr();
        unsafe {
            (&raw mut (*queue).desc).cast::<[VirtqDesc; 3]>().write(chain);

            // tell the device the first index in our chain of descriptors.
            let idx = (*queue).avail.idx.load(Ordering::Relaxed);
            (&raw mut (*queue).avail.ring[usize::from(idx) % VIRTQ_ENTRY_NUM]).write(0);
            atomic::fence(Ordering::SeqCst);

            // tell the device another avail ring entry is available.
            (*queue).avail.idx.store(idx.wrapping_add(1), Ordering::Release);
        }
        atomic::fence(Ordering::SeqCst);
        self.write_reg(MmioRegister::QueueNotify, 0); // value is queue number

        self.last_used = self.last_used.wrapping_add(1);
        let used_idx = unsafe { &(*queue).used.idx };
        while used_idx.load(Ordering::Acquire) != self.last_used {
            hint::spin_loop();
        }

        let status = unsafe { ptr::read_volatile(&raw const (*req).status) };
        if status != 0 {
            log::warn!("virtio-blk: failed to access sector {sector}: status={status}");
            return Err(BlockError::Device(status));
        }

        if !is_write {
            unsafe {
                *buf = (*req).data;
            }
        }
        Ok(())
    }
}

impl<T> BlockDevice<SECTOR_SIZE> for VirtioBlk<T>
where
    T: Transport,
{
    type Error = BlockError;

    fn block_count(&self) -> usize {
        usize::try_from(self.capacity).unwrap_or(usize::MAX)
    }

    fn read(&mut self, block_index: usize, data: &mut [u8; SECTOR_SIZE]) -> Result<(), Self::Error> {
        self.read_write(data, block_index as u64, false)
    }

    fn write(&mut self, block_index: usize, data: &[u8; SECTOR_SIZE]) -> Result<(), Self::Error> {
        let mut buf = *data;
        self.read_write(&mut buf, block_index as u64, true)
    }
}

#[cfg(test)]
mod tests {
    use page_alloc::arena::Arena;

    use super::*;
    use crate::fake::FakeDevice;

    fn sector(fill: u8) -> [u8; SECTOR_SIZE] {
        let mut buf = [0; SECTOR_SIZE];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = fill ^ (i as u8);
        }
        buf
    }

    #[test]
    fn negotiation_sequence() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let dev = FakeDevice::new(arena.direct_map(), 64);

        let blk = VirtioBlk::init(&dev, &mut alloc).unwrap();
        assert_eq!(blk.capacity(), 64);

        let state = dev.state();
        assert_eq!(state.status_writes, [0, 1, 3, 11, 15]);
        assert_eq!(state.guest_page_size, 4096);
        assert_eq!(state.queue_num, 16);
        assert_eq!(state.queue_align, 4096);
        assert_eq!(state.queue_pfn as usize, blk.queue.page_num());
        assert!(blk.queue.is_page_aligned());
    }

    #[test]
    fn identity_mismatch() {
        let arena = Arena::new(16);

        let dev = FakeDevice::new(arena.direct_map(), 8);
        dev.state_mut().magic = 0x1234;
        let mut alloc = arena.allocator();
        assert_eq!(
            VirtioBlk::init(&dev, &mut alloc).err(),
            Some(VirtioError::BadMagic(0x1234))
        );

        let dev = FakeDevice::new(arena.direct_map(), 8);
        dev.state_mut().version = 2;
        assert_eq!(
            VirtioBlk::init(&dev, &mut alloc).err(),
            Some(VirtioError::BadVersion(2))
        );

        let dev = FakeDevice::new(arena.direct_map(), 8);
        dev.state_mut().device_id = 1;
        assert_eq!(
            VirtioBlk::init(&dev, &mut alloc).err(),
            Some(VirtioError::NotBlockDevice(1))
        );
        // nothing was written to a device that failed identification
        assert!(dev.state().status_writes.is_empty());

        let dev = FakeDevice::new(arena.direct_map(), 8);
        dev.state_mut().queue_num_max = 8;
        assert_eq!(
            VirtioBlk::init(&dev, &mut alloc).err(),
            Some(VirtioError::QueueTooSmall(8))
        );
    }

    #[test]
    fn write_then_read_sector_zero() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let dev = FakeDevice::new(arena.direct_map(), 8);
        let mut blk = VirtioBlk::init(&dev, &mut alloc).unwrap();

        let mut data = sector(0x3c);
        blk.read_write(&mut data, 0, true).unwrap();
        assert_eq!(&dev.state().disk[..SECTOR_SIZE], &sector(0x3c)[..]);

        let mut buf = [0; SECTOR_SIZE];
        blk.read_write(&mut buf, 0, false).unwrap();
        assert_eq!(buf, sector(0x3c));
        assert_eq!(dev.state().notifies, 2);
    }

    #[test]
    fn sectors_are_independent() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let dev = FakeDevice::new(arena.direct_map(), 8);
        let mut blk = VirtioBlk::init(&dev, &mut alloc).unwrap();

        for s in 0..8 {
            BlockDevice::write(&mut blk, s, &sector(s as u8)).unwrap();
        }
        for s in (0..8).rev() {
            let mut buf = [0; SECTOR_SIZE];
            BlockDevice::read(&mut blk, s, &mut buf).unwrap();
            assert_eq!(buf, sector(s as u8));
        }
        // more requests than ring entries: indices wrap
        assert_eq!(dev.state().notifies, 16);
        assert_eq!(blk.block_count(), 8);
    }

    #[test]
    fn descriptor_chain_layout() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let dev = FakeDevice::new(arena.direct_map(), 8);
        let mut blk = VirtioBlk::init(&dev, &mut alloc).unwrap();

        let mut buf = [0; SECTOR_SIZE];
        blk.read_write(&mut buf, 3, false).unwrap();
        let desc = unsafe { (*blk.queue_ptr()).desc };
        let req = blk.req.addr() as u64;
        assert_eq!(desc[0].addr, req);
        assert_eq!(desc[0].len, 16);
        assert_eq!(desc[0].flags, VirtqDescFlags::NEXT);
        assert_eq!(desc[0].next, 1);
        assert_eq!(desc[1].addr, req + 16);
        assert_eq!(desc[1].len, 512);
        assert_eq!(desc[1].flags, VirtqDescFlags::NEXT | VirtqDescFlags::WRITE);
        assert_eq!(desc[1].next, 2);
        assert_eq!(desc[2].addr, req + 16 + 512);
        assert_eq!(desc[2].len, 1);
        assert_eq!(desc[2].flags, VirtqDescFlags::WRITE);

        blk.read_write(&mut buf, 3, true).unwrap();
        let desc = unsafe { (*blk.queue_ptr()).desc };
        assert_eq!(desc[1].flags, VirtqDescFlags::NEXT);
        assert_eq!(dev.state().last_request, Some((BLK_T_OUT, 3)));
    }

    #[test]
    fn out_of_range_sector_leaves_queue_untouched() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let dev = FakeDevice::new(arena.direct_map(), 4);
        let mut blk = VirtioBlk::init(&dev, &mut alloc).unwrap();

        let mut buf = sector(1);
        assert_eq!(
            blk.read_write(&mut buf, 4, true),
            Err(BlockError::SectorOutOfRange {
                sector: 4,
                capacity: 4
            })
        );
        assert_eq!(
            blk.read_write(&mut buf, u64::MAX, false),
            Err(BlockError::SectorOutOfRange {
                sector: u64::MAX,
                capacity: 4
            })
        );
        assert_eq!(buf, sector(1));
        assert_eq!(dev.state().notifies, 0);

        let queue = arena.bytes(blk.queue, size_of::<VirtQueue>());
        assert!(queue.iter().all(|&b| b == 0));
        let req = arena.bytes(blk.req, size_of::<VirtioBlkReq>());
        assert!(req.iter().all(|&b| b == 0));
    }

    #[test]
    fn device_error_is_reported() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let dev = FakeDevice::new(arena.direct_map(), 4);
        let mut blk = VirtioBlk::init(&dev, &mut alloc).unwrap();

        dev.state_mut().fail_with = Some(1);
        let mut buf = [0xee; SECTOR_SIZE];
        assert_eq!(blk.read_write(&mut buf, 0, false), Err(BlockError::Device(1)));
        assert_eq!(buf, [0xee; SECTOR_SIZE]);

        // the driver stays usable
        dev.state_mut().fail_with = None;
        blk.read_write(&mut buf, 0, false).unwrap();
        assert_eq!(buf, [0; SECTOR_SIZE]);
    }
}
