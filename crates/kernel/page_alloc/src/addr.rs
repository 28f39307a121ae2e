use core::{fmt, ptr};

use ox32_kernel_params::PAGE_SIZE;

/// A physical address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl PhysAddr {
    #[must_use]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    #[must_use]
    pub const fn addr(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0 % PAGE_SIZE == 0
    }

    /// Returns the physical page number.
    #[must_use]
    pub const fn page_num(self) -> usize {
        self.0 / PAGE_SIZE
    }

    #[must_use]
    pub const fn from_page_num(ppn: usize) -> Self {
        Self(ppn * PAGE_SIZE)
    }

    /// Returns the address `offset` bytes after `self`.
    #[must_use]
    pub const fn byte_add(self, offset: usize) -> Self {
        Self(self.0 + offset)
    }
}

/// Translation from physical addresses to kernel pointers.
///
/// The kernel keeps all of RAM identity-mapped, so on the target the
/// offset is zero. Host tests place "physical" memory at an arbitrary
/// host address and use a non-zero offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectMap {
    offset: usize,
}

impl DirectMap {
    pub const IDENTITY: Self = Self { offset: 0 };

    /// Creates a map that places physical address `pa` at kernel address
    /// `pa + offset` (wrapping).
    #[must_use]
    pub const fn with_offset(offset: usize) -> Self {
        Self { offset }
    }

    /// Returns a kernel pointer to the physical address `pa`.
    ///
    /// The pointer is only valid to dereference if `pa` refers to memory
    /// covered by this map.
    #[must_use]
    pub fn ptr<T>(&self, pa: PhysAddr) -> *mut T {
        ptr::with_exposed_provenance_mut(pa.addr().wrapping_add(self.offset))
    }

    /// Returns the physical address of the kernel pointer `p`.
    #[must_use]
    pub fn phys<T>(&self, p: *const T) -> PhysAddr {
        PhysAddr(p.addr().wrapping_sub(self.offset))
    }
}
