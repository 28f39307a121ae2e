use core::ops::Range;

use ox32_kernel_params::PAGE_SIZE;

use crate::{DirectMap, PhysAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("zero pages requested")]
    ZeroPages,
    #[error("out of memory: requested {requested} pages, {remaining} remaining")]
    OutOfMemory { requested: usize, remaining: usize },
}

/// A bump allocator over a fixed range of physical memory.
///
/// The cursor only moves forward. There is no `free`; memory handed out
/// stays allocated until the machine shuts down.
#[derive(Debug)]
pub struct PageAllocator {
    /// The range of physical memory managed by the allocator.
    region: Range<PhysAddr>,
    /// The next free page.
    next: PhysAddr,
    map: DirectMap,
}

impl PageAllocator {
    /// Creates an allocator that manages the given range of physical memory.
    ///
    /// # Safety
    ///
    /// `region` must be unused RAM that is reachable through `map`, and must
    /// not be handed out by any other allocator.
    ///
    /// # Panics
    ///
    /// Panics if either end of `region` is not page-aligned, or if the range
    /// is reversed.
    #[must_use]
    pub unsafe fn new(region: Range<PhysAddr>, map: DirectMap) -> Self {
        assert!(region.start.is_page_aligned(), "{:?}", region.start);
        assert!(region.end.is_page_aligned(), "{:?}", region.end);
        assert!(region.start <= region.end);

        Self {
            next: region.start,
            region,
            map,
        }
    }

    /// Allocates `n` contiguous zero-filled pages.
    ///
    /// Returns the physical address of the first page.
    pub fn allocate(&mut self, n: usize) -> Result<PhysAddr, AllocError> {
        if n == 0 {
            return Err(AllocError::ZeroPages);
        }
        let remaining = self.remaining_pages();
        if n > remaining {
            return Err(AllocError::OutOfMemory {
                requested: n,
                remaining,
            });
        }

        let pa = self.next;
        self.next = pa.byte_add(n * PAGE_SIZE);

        unsafe {
            self.map.ptr::<u8>(pa).write_bytes(0, n * PAGE_SIZE);
        }
        Ok(pa)
    }

    #[must_use]
    pub fn direct_map(&self) -> DirectMap {
        self.map
    }

    /// Returns the number of pages handed out so far.
    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        (self.next.addr() - self.region.start.addr()) / PAGE_SIZE
    }

    #[must_use]
    pub fn remaining_pages(&self) -> usize {
        (self.region.end.addr() - self.next.addr()) / PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::arena::Arena;

    #[test]
    fn allocations_are_aligned_and_disjoint() {
        let arena = Arena::new(32);
        let mut alloc = arena.allocator();

        let mut pages = HashSet::new();
        for n in [1, 3, 2, 5, 1] {
            let pa = alloc.allocate(n).unwrap();
            assert!(pa.is_page_aligned());
            assert!(arena.phys_range().contains(&pa));
            for i in 0..n {
                assert!(pages.insert(pa.page_num() + i), "page reused");
            }
        }
        assert_eq!(alloc.allocated_pages(), 12);
        assert_eq!(alloc.remaining_pages(), 20);
    }

    #[test]
    fn cursor_only_moves_forward() {
        let arena = Arena::new(8);
        let mut alloc = arena.allocator();

        let a = alloc.allocate(2).unwrap();
        let b = alloc.allocate(1).unwrap();
        let c = alloc.allocate(1).unwrap();
        assert_eq!(b, a.byte_add(2 * PAGE_SIZE));
        assert_eq!(c, b.byte_add(PAGE_SIZE));
    }

    #[test]
    fn pages_are_zero_filled() {
        let arena = Arena::new(4);
        let map = arena.direct_map();
        // dirty the whole arena first
        unsafe {
            map.ptr::<u8>(arena.phys_range().start)
                .write_bytes(0xa5, 4 * PAGE_SIZE);
        }

        let mut alloc = arena.allocator();
        let pa = alloc.allocate(2).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(map.ptr::<u8>(pa), 2 * PAGE_SIZE) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn exhaustion() {
        let arena = Arena::new(4);
        let mut alloc = arena.allocator();

        assert_eq!(alloc.allocate(0), Err(AllocError::ZeroPages));
        alloc.allocate(3).unwrap();
        assert_eq!(
            alloc.allocate(2),
            Err(AllocError::OutOfMemory {
                requested: 2,
                remaining: 1
            })
        );
        // a failed request does not consume anything
        assert_eq!(alloc.remaining_pages(), 1);
        alloc.allocate(1).unwrap();
        assert!(alloc.allocate(1).is_err());
    }
}
