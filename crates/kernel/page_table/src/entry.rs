use bitflags::bitflags;
use page_alloc::PhysAddr;

bitflags! {
    /// Flags for page table entries.
    ///
    /// These flags define the properties and permissions of a page table entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        /// Valid Bit of page table entry.
        ///
        /// If set, an entry for this virtual address exists.
        const V = 1 << 0;

        /// Read Bit of page table entry.
        const R = 1 << 1;

        /// Write Bit of page table entry.
        const W = 1 << 2;

        /// Executable Bit of page table entry.
        const X = 1 << 3;

        /// UserMode Bit of page table entry.
        ///
        /// If set, userspace can access this virtual address.
        const U = 1 << 4;

        /// Global Mapping Bit of page table entry.
        const G = 1 << 5;

        /// Access Bit of page table entry.
        const A = 1 << 6;

        /// Dirty Bit of page table entry.
        const D = 1 << 7;

        const RW = Self::R.bits() | Self::W.bits();
        const RWX = Self::R.bits() | Self::W.bits() | Self::X.bits();
        const UR = Self::U.bits() | Self::R.bits();
        const URWX = Self::U.bits() | Self::RWX.bits();
    }
}

/// A single Sv32 page table entry.
///
/// Bits 10..32 hold the physical page number, bits 0..10 the flags.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pte(u32);

impl Pte {
    const FLAGS_MASK: u32 = 0x3ff;
    const PPN_SHIFT: u32 = 10;
    /// Sv32 physical page numbers are 22 bits wide.
    pub const PPN_MAX: usize = (1 << 22) - 1;

    pub const INVALID: Self = Self(0);

    /// Creates an entry pointing at the page containing `pa`.
    ///
    /// Returns `None` if the page number does not fit in 22 bits.
    #[must_use]
    pub fn new(pa: PhysAddr, flags: PteFlags) -> Option<Self> {
        let ppn = pa.page_num();
        if ppn > Self::PPN_MAX {
            return None;
        }
        let ppn = u32::try_from(ppn).ok()?;
        Some(Self((ppn << Self::PPN_SHIFT) | (flags.bits() & Self::FLAGS_MASK)))
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_retain(self.0 & Self::FLAGS_MASK)
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.flags().contains(PteFlags::V)
    }

    /// Returns `true` if this entry maps a page rather than pointing at the
    /// next-level table.
    #[must_use]
    pub fn is_leaf(self) -> bool {
        self.is_valid() && self.flags().intersects(PteFlags::RWX)
    }

    #[must_use]
    pub fn phys_addr(self) -> PhysAddr {
        PhysAddr::from_page_num((self.0 >> Self::PPN_SHIFT) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding() {
        let pte = Pte::new(PhysAddr::new(0x8020_1000), PteFlags::V | PteFlags::RW).unwrap();
        assert_eq!(pte.bits(), (0x80201 << 10) | 0b111);
        assert_eq!(pte.phys_addr(), PhysAddr::new(0x8020_1000));
        assert_eq!(pte.flags(), PteFlags::V | PteFlags::RW);
        assert!(pte.is_valid());
        assert!(pte.is_leaf());

        let table = Pte::new(PhysAddr::new(0x8030_0000), PteFlags::V).unwrap();
        assert!(table.is_valid());
        assert!(!table.is_leaf());

        assert!(!Pte::INVALID.is_valid());
    }

    #[test]
    fn page_number_limit() {
        let top = PhysAddr::from_page_num(Pte::PPN_MAX);
        assert!(Pte::new(top, PteFlags::V).is_some());
        assert!(Pte::new(top.byte_add(4096), PteFlags::V).is_none());
    }
}
