//! Sv32 two-level page tables.
//!
//! A virtual address is split into a 10-bit first-level index (`VPN[1]`),
//! a 10-bit second-level index (`VPN[0]`) and a 12-bit page offset. Each
//! table is one page holding 1024 [`Pte`]s. Second-level tables are only
//! allocated when the first page in their 4 MiB range is mapped.
#![cfg_attr(not(test), no_std)]

use ox32_kernel_params::PAGE_SIZE;
use page_alloc::{AllocError, DirectMap, PageAllocator, PhysAddr};

pub use self::entry::{Pte, PteFlags};

mod entry;

/// Number of entries in one table.
pub const ENTRIES: usize = PAGE_SIZE / size_of::<Pte>();

type Table = [Pte; ENTRIES];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PageTableError {
    #[error("virtual address {0:#x} is not page-aligned")]
    MisalignedVirtAddr(usize),
    #[error("physical address {0} is not page-aligned")]
    MisalignedPhysAddr(PhysAddr),
    #[error("virtual address {0:#x} is out of range")]
    VirtAddrOutOfRange(usize),
    #[error("physical address {0} is out of range")]
    PhysAddrOutOfRange(PhysAddr),
    #[error("virtual address {0:#x} is already mapped")]
    AlreadyMapped(usize),
    #[error("no free page for page table: {0}")]
    NoMemory(#[from] AllocError),
    #[error("bad user address {0:#x}")]
    BadUserAddress(usize),
    #[error("string is too long")]
    StringTooLong,
}

fn vpn1(va: usize) -> usize {
    (va >> 22) & 0x3ff
}

fn vpn0(va: usize) -> usize {
    (va >> 12) & 0x3ff
}

/// A handle to the root of an Sv32 page table.
///
/// The table lives in physical memory obtained from a [`PageAllocator`] and
/// is accessed through the allocator's [`DirectMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTable {
    root: PhysAddr,
}

impl PageTable {
    /// Allocates an empty first-level table.
    pub fn allocate(alloc: &mut PageAllocator) -> Result<Self, PageTableError> {
        let root = alloc.allocate(1)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Returns the value of the `satp` register that activates this table.
    #[must_use]
    pub fn satp(&self) -> usize {
        const SATP_SV32: usize = 1 << 31;
        SATP_SV32 | self.root.page_num()
    }

    /// # Safety
    ///
    /// `pa` must be a page table page reachable through `map`, and no other
    /// reference to it may be live.
    unsafe fn table<'a>(map: DirectMap, pa: PhysAddr) -> &'a mut Table {
        unsafe { &mut *map.ptr::<Table>(pa) }
    }

    /// Maps the page at `va` to the physical page at `pa`.
    ///
    /// The leaf entry is written with `flags | V`. A second-level table is
    /// allocated if `va` is the first mapping in its 4 MiB range. Alignment
    /// and range are checked before anything is written or allocated.
    pub fn map(
        &mut self,
        alloc: &mut PageAllocator,
        va: usize,
        pa: PhysAddr,
        flags: PteFlags,
    ) -> Result<(), PageTableError> {
        if va % PAGE_SIZE != 0 {
            return Err(PageTableError::MisalignedVirtAddr(va));
        }
        if !pa.is_page_aligned() {
            return Err(PageTableError::MisalignedPhysAddr(pa));
        }
        if u32::try_from(va).is_err() {
            return Err(PageTableError::VirtAddrOutOfRange(va));
        }
        let leaf = Pte::new(pa, flags | PteFlags::V)
            .ok_or(PageTableError::PhysAddrOutOfRange(pa))?;

        let map = alloc.direct_map();
        let root = unsafe { Self::table(map, self.root) };
        let l1 = &mut root[vpn1(va)];
        if l1.is_leaf() {
            return Err(PageTableError::AlreadyMapped(va));
        }
        if !l1.is_valid() {
            let pt = alloc.allocate(1)?;
            *l1 = Pte::new(pt, PteFlags::V).ok_or(PageTableError::PhysAddrOutOfRange(pt))?;
        }

        let l2 = unsafe { Self::table(map, l1.phys_addr()) };
        let pte = &mut l2[vpn0(va)];
        if pte.is_valid() {
            return Err(PageTableError::AlreadyMapped(va));
        }
        *pte = leaf;
        Ok(())
    }

    /// Maps `size` bytes starting at `va` to the same-sized range at `pa`.
    ///
    /// `size` is rounded up to whole pages.
    pub fn map_range(
        &mut self,
        alloc: &mut PageAllocator,
        va: usize,
        pa: PhysAddr,
        size: usize,
        flags: PteFlags,
    ) -> Result<(), PageTableError> {
        for offset in (0..size).step_by(PAGE_SIZE) {
            self.map(alloc, va + offset, pa.byte_add(offset), flags)?;
        }
        Ok(())
    }

    /// Maps a physical range at the same virtual address.
    pub fn identity_map(
        &mut self,
        alloc: &mut PageAllocator,
        pa: PhysAddr,
        size: usize,
        flags: PteFlags,
    ) -> Result<(), PageTableError> {
        self.map_range(alloc, pa.addr(), pa, size, flags)
    }

    /// Walks the table for `va`.
    ///
    /// Returns the physical address `va` translates to and the leaf's flags,
    /// or `None` if `va` is unmapped.
    #[must_use]
    pub fn translate(&self, map: DirectMap, va: usize) -> Option<(PhysAddr, PteFlags)> {
        if u32::try_from(va).is_err() {
            return None;
        }
        let root = unsafe { &*map.ptr::<Table>(self.root) };
        let l1 = root[vpn1(va)];
        if !l1.is_valid() {
            return None;
        }
        if l1.is_leaf() {
            // 4 MiB megapage
            let offset = va & ((1 << 22) - 1);
            return Some((l1.phys_addr().byte_add(offset), l1.flags()));
        }
        let l2 = unsafe { &*map.ptr::<Table>(l1.phys_addr()) };
        let pte = l2[vpn0(va)];
        if !pte.is_valid() {
            return None;
        }
        Some((pte.phys_addr().byte_add(va % PAGE_SIZE), pte.flags()))
    }

    /// Translates a user address that must carry `U` and `access`.
    fn user_phys(
        &self,
        map: DirectMap,
        va: usize,
        access: PteFlags,
    ) -> Result<PhysAddr, PageTableError> {
        match self.translate(map, va) {
            Some((pa, flags)) if flags.contains(PteFlags::U | access) => Ok(pa),
            _ => Err(PageTableError::BadUserAddress(va)),
        }
    }

    /// Copies `src` into user memory at `dst_va`.
    pub fn copy_out(
        &self,
        map: DirectMap,
        dst_va: usize,
        src: &[u8],
    ) -> Result<(), PageTableError> {
        let mut done = 0;
        while done < src.len() {
            let va = dst_va
                .checked_add(done)
                .ok_or(PageTableError::BadUserAddress(dst_va))?;
            let pa = self.user_phys(map, va, PteFlags::W)?;
            let n = usize::min(PAGE_SIZE - va % PAGE_SIZE, src.len() - done);
            unsafe {
                map.ptr::<u8>(pa)
                    .copy_from_nonoverlapping(src[done..].as_ptr(), n);
            }
            done += n;
        }
        Ok(())
    }

    /// Copies user memory at `src_va` into `dst`.
    pub fn copy_in(
        &self,
        map: DirectMap,
        dst: &mut [u8],
        src_va: usize,
    ) -> Result<(), PageTableError> {
        let mut done = 0;
        while done < dst.len() {
            let va = src_va
                .checked_add(done)
                .ok_or(PageTableError::BadUserAddress(src_va))?;
            let pa = self.user_phys(map, va, PteFlags::R)?;
            let n = usize::min(PAGE_SIZE - va % PAGE_SIZE, dst.len() - done);
            unsafe {
                map.ptr::<u8>(pa)
                    .copy_to_nonoverlapping(dst[done..].as_mut_ptr(), n);
            }
            done += n;
        }
        Ok(())
    }

    /// Copies a NUL-terminated string from user memory into `dst`.
    ///
    /// Returns the length of the string, excluding the NUL. Fails if the
    /// string and its NUL do not fit in `dst`.
    pub fn copy_in_str(
        &self,
        map: DirectMap,
        dst: &mut [u8],
        src_va: usize,
    ) -> Result<usize, PageTableError> {
        let mut len = 0;
        while len < dst.len() {
            let va = src_va
                .checked_add(len)
                .ok_or(PageTableError::BadUserAddress(src_va))?;
            let pa = self.user_phys(map, va, PteFlags::R)?;
            let chunk = usize::min(PAGE_SIZE - va % PAGE_SIZE, dst.len() - len);
            let src = unsafe { core::slice::from_raw_parts(map.ptr::<u8>(pa), chunk) };
            for &b in src {
                dst[len] = b;
                if b == 0 {
                    return Ok(len);
                }
                len += 1;
            }
        }
        Err(PageTableError::StringTooLong)
    }
}

#[cfg(test)]
mod tests {
    use page_alloc::arena::Arena;

    use super::*;

    const USER: PteFlags = PteFlags::URWX;

    #[test]
    fn map_then_translate() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let map = arena.direct_map();
        let mut pt = PageTable::allocate(&mut alloc).unwrap();

        let pa = alloc.allocate(1).unwrap();
        pt.map(&mut alloc, 0x0100_0000, pa, PteFlags::URWX).unwrap();

        assert_eq!(
            pt.translate(map, 0x0100_0000),
            Some((pa, PteFlags::URWX | PteFlags::V))
        );
        assert_eq!(
            pt.translate(map, 0x0100_0123),
            Some((pa.byte_add(0x123), PteFlags::URWX | PteFlags::V))
        );
        assert_eq!(pt.translate(map, 0x0100_1000), None);
        assert_eq!(pt.translate(map, 0x0200_0000), None);
    }

    #[test]
    fn misaligned_requests_write_nothing() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let map = arena.direct_map();
        let mut pt = PageTable::allocate(&mut alloc).unwrap();
        let pa = alloc.allocate(1).unwrap();
        let used = alloc.allocated_pages();

        assert_eq!(
            pt.map(&mut alloc, 0x0100_0010, pa, USER),
            Err(PageTableError::MisalignedVirtAddr(0x0100_0010))
        );
        assert_eq!(
            pt.map(&mut alloc, 0x0100_0000, pa.byte_add(8), USER),
            Err(PageTableError::MisalignedPhysAddr(pa.byte_add(8)))
        );
        // no second-level table was allocated, and nothing is mapped
        assert_eq!(alloc.allocated_pages(), used);
        assert_eq!(pt.translate(map, 0x0100_0000), None);
        let root = arena.bytes(pt.root(), PAGE_SIZE);
        assert!(root.iter().all(|&b| b == 0));
    }

    #[test]
    fn second_level_tables_are_lazy() {
        let arena = Arena::new(32);
        let mut alloc = arena.allocator();
        let mut pt = PageTable::allocate(&mut alloc).unwrap();
        let pages = alloc.allocate(4).unwrap();
        let before = alloc.allocated_pages();

        // same 4 MiB region: one second-level table
        pt.map(&mut alloc, 0x0040_0000, pages, PteFlags::RW).unwrap();
        assert_eq!(alloc.allocated_pages(), before + 1);
        pt.map(&mut alloc, 0x0040_1000, pages.byte_add(PAGE_SIZE), PteFlags::RW)
            .unwrap();
        assert_eq!(alloc.allocated_pages(), before + 1);

        // another region: another table
        pt.map(&mut alloc, 0x0080_0000, pages.byte_add(2 * PAGE_SIZE), PteFlags::RW)
            .unwrap();
        assert_eq!(alloc.allocated_pages(), before + 2);
    }

    #[test]
    fn first_level_entry_points_to_table() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let mut pt = PageTable::allocate(&mut alloc).unwrap();
        let pa = alloc.allocate(1).unwrap();
        pt.map(&mut alloc, 0x8040_0000, pa, PteFlags::RW).unwrap();

        let root = unsafe { &*arena.direct_map().ptr::<Table>(pt.root()) };
        let l1 = root[0x8040_0000 >> 22];
        assert_eq!(l1.flags(), PteFlags::V);
        assert!(!l1.is_leaf());
        assert_eq!(root.iter().filter(|e| e.is_valid()).count(), 1);
    }

    #[test]
    fn double_map_is_rejected() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let mut pt = PageTable::allocate(&mut alloc).unwrap();
        let pa = alloc.allocate(2).unwrap();

        pt.map(&mut alloc, 0x1000, pa, PteFlags::RW).unwrap();
        assert_eq!(
            pt.map(&mut alloc, 0x1000, pa.byte_add(PAGE_SIZE), PteFlags::RW),
            Err(PageTableError::AlreadyMapped(0x1000))
        );
    }

    #[test]
    fn identity_range() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let map = arena.direct_map();
        let mut pt = PageTable::allocate(&mut alloc).unwrap();

        let base = PhysAddr::new(0x1000_1000);
        pt.identity_map(&mut alloc, base, PAGE_SIZE + 1, PteFlags::RW)
            .unwrap();
        assert_eq!(
            pt.translate(map, 0x1000_1004),
            Some((base.byte_add(4), PteFlags::RW | PteFlags::V))
        );
        assert!(pt.translate(map, 0x1000_2000).is_some());
        assert!(pt.translate(map, 0x1000_3000).is_none());
    }

    #[test]
    fn satp_value() {
        let arena = Arena::new(4);
        let mut alloc = arena.allocator();
        let pt = PageTable::allocate(&mut alloc).unwrap();
        assert_eq!(pt.satp(), (1 << 31) | (Arena::PHYS_BASE / PAGE_SIZE));
    }

    #[test]
    fn user_copies_cross_pages() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let map = arena.direct_map();
        let mut pt = PageTable::allocate(&mut alloc).unwrap();

        // two virtually contiguous pages backed by non-adjacent frames
        let a = alloc.allocate(1).unwrap();
        let _gap = alloc.allocate(1).unwrap();
        let b = alloc.allocate(1).unwrap();
        pt.map(&mut alloc, 0x0100_0000, a, USER).unwrap();
        pt.map(&mut alloc, 0x0100_1000, b, USER).unwrap();

        let data: Vec<u8> = (0..64).collect();
        pt.copy_out(map, 0x0100_0ff0, &data).unwrap();
        assert_eq!(arena.bytes(a.byte_add(0xff0), 16), &data[..16]);
        assert_eq!(arena.bytes(b, 48), &data[16..]);

        let mut back = [0; 64];
        pt.copy_in(map, &mut back, 0x0100_0ff0).unwrap();
        assert_eq!(&back[..], &data[..]);
    }

    #[test]
    fn user_copies_check_permissions() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let map = arena.direct_map();
        let mut pt = PageTable::allocate(&mut alloc).unwrap();

        let kernel = alloc.allocate(1).unwrap();
        let read_only = alloc.allocate(1).unwrap();
        pt.map(&mut alloc, 0x2000, kernel, PteFlags::RW).unwrap();
        pt.map(&mut alloc, 0x3000, read_only, PteFlags::UR).unwrap();

        let mut buf = [0; 4];
        assert_eq!(
            pt.copy_in(map, &mut buf, 0x2000),
            Err(PageTableError::BadUserAddress(0x2000))
        );
        assert_eq!(
            pt.copy_in(map, &mut buf, 0x5000),
            Err(PageTableError::BadUserAddress(0x5000))
        );
        assert_eq!(pt.copy_in(map, &mut buf, 0x3000), Ok(()));
        assert_eq!(
            pt.copy_out(map, 0x3000, &buf),
            Err(PageTableError::BadUserAddress(0x3000))
        );
        // a range running off the end of the mapped page fails too
        assert_eq!(
            pt.copy_in(map, &mut buf, 0x3ffe),
            Err(PageTableError::BadUserAddress(0x4000))
        );
    }

    #[test]
    fn user_strings() {
        let arena = Arena::new(16);
        let mut alloc = arena.allocator();
        let map = arena.direct_map();
        let mut pt = PageTable::allocate(&mut alloc).unwrap();
        let pages = alloc.allocate(2).unwrap();
        pt.map_range(&mut alloc, 0x0100_0000, pages, 2 * PAGE_SIZE, USER)
            .unwrap();

        pt.copy_out(map, 0x0100_0ffc, b"hello.txt\0").unwrap();
        let mut name = [0; 100];
        assert_eq!(pt.copy_in_str(map, &mut name, 0x0100_0ffc), Ok(9));
        assert_eq!(&name[..9], b"hello.txt");

        let mut short = [0; 4];
        assert_eq!(
            pt.copy_in_str(map, &mut short, 0x0100_0ffc),
            Err(PageTableError::StringTooLong)
        );

        let mut empty = [0; 1];
        pt.copy_out(map, 0x0100_0000, b"\0").unwrap();
        assert_eq!(pt.copy_in_str(map, &mut empty, 0x0100_0000), Ok(0));
    }
}
