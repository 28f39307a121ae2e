//! Host-memory stand-in for physical RAM.

use std::alloc::{self, Layout};

use ox32_kernel_params::PAGE_SIZE;

use crate::{DirectMap, PageAllocator, PhysAddr};

/// A page-aligned block of host memory that pretends to be physical RAM.
///
/// The arena appears at physical address [`Arena::PHYS_BASE`], low enough
/// for Sv32 page numbers.
#[derive(Debug)]
pub struct Arena {
    ptr: *mut u8,
    layout: Layout,
}

impl Arena {
    pub const PHYS_BASE: usize = 0x8000_0000;

    /// Allocates `pages` zeroed pages of host memory.
    ///
    /// # Panics
    ///
    /// Panics if the host allocation fails.
    #[must_use]
    pub fn new(pages: usize) -> Self {
        let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "arena allocation failed");
        let _ = ptr.expose_provenance();
        Self { ptr, layout }
    }

    #[must_use]
    pub fn direct_map(&self) -> DirectMap {
        DirectMap::with_offset(self.ptr.addr().wrapping_sub(Self::PHYS_BASE))
    }

    #[must_use]
    pub fn phys_range(&self) -> core::ops::Range<PhysAddr> {
        PhysAddr::new(Self::PHYS_BASE)..PhysAddr::new(Self::PHYS_BASE + self.layout.size())
    }

    /// Returns an allocator over the whole arena.
    ///
    /// The allocator must not be used after the arena is dropped.
    #[must_use]
    pub fn allocator(&self) -> PageAllocator {
        unsafe { PageAllocator::new(self.phys_range(), self.direct_map()) }
    }

    /// Returns a slice over `len` bytes of arena memory starting at `pa`.
    ///
    /// # Panics
    ///
    /// Panics if the range is outside the arena.
    #[must_use]
    pub fn bytes(&self, pa: PhysAddr, len: usize) -> &[u8] {
        let range = self.phys_range();
        assert!(range.start <= pa && pa.addr() + len <= range.end.addr());
        unsafe { core::slice::from_raw_parts(self.direct_map().ptr(pa), len) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr, self.layout) }
    }
}
