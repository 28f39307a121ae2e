//! A legacy virtio block device emulated in host memory.
//!
//! The device completes requests synchronously when the driver writes
//! `QueueNotify`.

use core::{
    cell::{Ref, RefCell, RefMut},
    mem::offset_of,
    sync::atomic::Ordering,
};

use ox32_kernel_params::{PAGE_SIZE, SECTOR_SIZE, VIRTQ_ENTRY_NUM};
use page_alloc::{DirectMap, PhysAddr};

use crate::{
    Transport,
    queue::{
        BLK_T_IN, BLK_T_OUT, DEVICE_ID_BLOCK, LEGACY_VERSION, MAGIC_VALUE, MmioRegister,
        VirtQueue, VirtqDesc, VirtqDescFlags, VirtqUsedElem,
    },
};

#[derive(Debug)]
pub(crate) struct DeviceState {
    pub(crate) magic: u32,
    pub(crate) version: u32,
    pub(crate) device_id: u32,
    pub(crate) queue_num_max: u32,
    pub(crate) status_writes: Vec<u32>,
    pub(crate) guest_page_size: u32,
    pub(crate) queue_num: u32,
    pub(crate) queue_align: u32,
    pub(crate) queue_pfn: u32,
    pub(crate) notifies: usize,
    pub(crate) fail_with: Option<u8>,
    pub(crate) last_request: Option<(u32, u64)>,
    pub(crate) disk: Vec<u8>,
    last_avail: u16,
}

#[derive(Debug)]
pub(crate) struct FakeDevice {
    map: DirectMap,
    state: RefCell<DeviceState>,
}

impl FakeDevice {
    pub(crate) fn new(map: DirectMap, sectors: usize) -> Self {
        Self {
            map,
            state: RefCell::new(DeviceState {
                magic: MAGIC_VALUE,
                version: LEGACY_VERSION,
                device_id: DEVICE_ID_BLOCK,
                queue_num_max: 64,
                status_writes: vec![],
                guest_page_size: 0,
                queue_num: 0,
                queue_align: 0,
                queue_pfn: 0,
                notifies: 0,
                fail_with: None,
                last_request: None,
                disk: vec![0; sectors * SECTOR_SIZE],
                last_avail: 0,
            }),
        }
    }

    pub(crate) fn state(&self) -> Ref<'_, DeviceState> {
        self.state.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, DeviceState> {
        self.state.borrow_mut()
    }

    fn process_queue(&self, state: &mut DeviceState) {
        let queue_pa = PhysAddr::from_page_num(state.queue_pfn as usize);
        assert_eq!(state.guest_page_size as usize, PAGE_SIZE);
        let queue = self.map.ptr::<VirtQueue>(queue_pa);

        let avail_idx = unsafe { (*queue).avail.idx.load(Ordering::Acquire) };
        while state.last_avail != avail_idx {
            let slot = usize::from(state.last_avail) % VIRTQ_ENTRY_NUM;
            let head = unsafe { (*queue).avail.ring[slot] };
            let len = self.execute(state, queue, head);

            unsafe {
                let used_idx = (*queue).used.idx.load(Ordering::Relaxed);
                (&raw mut (*queue).used.ring[usize::from(used_idx) % VIRTQ_ENTRY_NUM]).write(
                    VirtqUsedElem {
                        id: u32::from(head),
                        len,
                    },
                );
                (*queue)
                    .used
                    .idx
                    .store(used_idx.wrapping_add(1), Ordering::Release);
            }
            state.last_avail = state.last_avail.wrapping_add(1);
        }
    }

    fn desc(queue: *mut VirtQueue, idx: u16) -> VirtqDesc {
        unsafe { (*queue).desc[usize::from(idx)] }
    }

    fn execute(&self, state: &mut DeviceState, queue: *mut VirtQueue, head: u16) -> u32 {
        let header = Self::desc(queue, head);
        assert!(header.flags.contains(VirtqDescFlags::NEXT));
        assert!(!header.flags.contains(VirtqDescFlags::WRITE));
        let data = Self::desc(queue, header.next);
        assert!(data.flags.contains(VirtqDescFlags::NEXT));
        assert_eq!(data.len as usize, SECTOR_SIZE);
        let status = Self::desc(queue, data.next);
        assert!(status.flags.contains(VirtqDescFlags::WRITE));
        assert_eq!(status.len, 1);

        let header_pa = PhysAddr::new(usize::try_from(header.addr).unwrap());
        let ty = unsafe { self.map.ptr::<u32>(header_pa).read() };
        let sector = unsafe {
            self.map
                .ptr::<u64>(header_pa.byte_add(offset_of!(crate::queue::VirtioBlkReq, sector)))
                .read()
        };
        state.last_request = Some((ty, sector));

        let status_ptr = self
            .map
            .ptr::<u8>(PhysAddr::new(usize::try_from(status.addr).unwrap()));
        if let Some(code) = state.fail_with {
            unsafe { status_ptr.write(code) };
            return 1;
        }

        let data_ptr = self
            .map
            .ptr::<u8>(PhysAddr::new(usize::try_from(data.addr).unwrap()));
        let offset = usize::try_from(sector).unwrap() * SECTOR_SIZE;
        let disk = &mut state.disk[offset..offset + SECTOR_SIZE];
        match ty {
            BLK_T_IN => {
                assert!(data.flags.contains(VirtqDescFlags::WRITE));
                unsafe { data_ptr.copy_from_nonoverlapping(disk.as_ptr(), SECTOR_SIZE) };
            }
            BLK_T_OUT => {
                assert!(!data.flags.contains(VirtqDescFlags::WRITE));
                unsafe { data_ptr.copy_to_nonoverlapping(disk.as_mut_ptr(), SECTOR_SIZE) };
            }
            _ => panic!("unexpected request type {ty}"),
        }
        unsafe { status_ptr.write(0) };
        (SECTOR_SIZE + 1) as u32
    }
}

impl Transport for FakeDevice {
    fn read32(&self, reg: MmioRegister, offset: usize) -> u32 {
        let state = self.state.borrow();
        match (reg, offset) {
            (MmioRegister::MagicValue, 0) => state.magic,
            (MmioRegister::Version, 0) => state.version,
            (MmioRegister::DeviceId, 0) => state.device_id,
            (MmioRegister::QueueNumMax, 0) => state.queue_num_max,
            (MmioRegister::Status, 0) => state.status_writes.last().copied().unwrap_or(0),
            (MmioRegister::Config, 0) => (state.disk.len() / SECTOR_SIZE) as u32,
            (MmioRegister::Config, 4) => ((state.disk.len() / SECTOR_SIZE) as u64 >> 32) as u32,
            _ => panic!("unexpected read of {reg:?}+{offset}"),
        }
    }

    fn write32(&self, reg: MmioRegister, offset: usize, value: u32) {
        assert_eq!(offset, 0);
        let mut state = self.state.borrow_mut();
        match reg {
            MmioRegister::Status => state.status_writes.push(value),
            MmioRegister::GuestPageSize => state.guest_page_size = value,
            MmioRegister::QueueSel => assert_eq!(value, 0),
            MmioRegister::QueueNum => state.queue_num = value,
            MmioRegister::QueueAlign => state.queue_align = value,
            MmioRegister::QueuePfn => state.queue_pfn = value,
            MmioRegister::QueueNotify => {
                assert_eq!(value, 0);
                state.notifies += 1;
                self.process_queue(&mut state);
            }
            _ => panic!("unexpected write of {reg:?}"),
        }
    }
}
