//! Physical memory layout and the global page allocator.

use core::ptr;

use ox32_kernel_params::PAGE_SIZE;
use page_alloc::{DirectMap, PageAllocator, PhysAddr};
use page_table::PteFlags;
use process::IdentityRegion;

use crate::{device::VIRTIO_BLK, sync::SpinLock};

unsafe extern "C" {
    static __kernel_base: [u8; 0];
    static __bss: [u8; 0];
    static __bss_end: [u8; 0];
    static __free_ram: [u8; 0];
    static __free_ram_end: [u8; 0];
}

fn symbol_addr(sym: *const [u8; 0]) -> usize {
    sym.expose_provenance()
}

pub fn kernel_base() -> PhysAddr {
    PhysAddr::new(symbol_addr(&raw const __kernel_base))
}

pub fn free_ram() -> core::ops::Range<PhysAddr> {
    PhysAddr::new(symbol_addr(&raw const __free_ram))
        ..PhysAddr::new(symbol_addr(&raw const __free_ram_end))
}

/// Zeroes the `.bss` section.
///
/// # Safety
///
/// Must be called once, before anything reads a zero-initialized static.
pub unsafe fn clear_bss() {
    let start = symbol_addr(&raw const __bss);
    let end = symbol_addr(&raw const __bss_end);
    unsafe {
        ptr::with_exposed_provenance_mut::<u8>(start).write_bytes(0, end - start);
    }
}

static PAGE_ALLOCATOR: SpinLock<Option<PageAllocator>> = SpinLock::new(None);

/// Hands the free RAM region to the page allocator.
pub fn init() {
    let region = free_ram();
    // RAM is identity-mapped in every address space, including before
    // paging is enabled.
    let alloc = unsafe { PageAllocator::new(region.clone(), DirectMap::IDENTITY) };
    log::info!(
        "free ram: {}..{} ({} pages)",
        region.start,
        region.end,
        alloc.remaining_pages()
    );
    *PAGE_ALLOCATOR.lock() = Some(alloc);
}

/// Runs `f` with the page allocator locked.
pub fn with_allocator<F, T>(f: F) -> T
where
    F: FnOnce(&mut PageAllocator) -> T,
{
    let mut alloc = PAGE_ALLOCATOR.lock();
    let Some(alloc) = alloc.as_mut() else {
        panic!("page allocator is not initialized");
    };
    f(alloc)
}

/// Regions mapped at their physical addresses in every address space: the
/// kernel image, its stack, and all free RAM, plus the block device
/// registers.
pub fn identity_regions() -> [IdentityRegion; 2] {
    let base = kernel_base();
    let end = free_ram().end;
    [
        IdentityRegion {
            start: base,
            size: end.addr() - base.addr(),
            flags: PteFlags::RWX,
        },
        IdentityRegion {
            start: PhysAddr::new(VIRTIO_BLK),
            size: PAGE_SIZE,
            flags: PteFlags::RW,
        },
    ]
}
