use arrayvec::ArrayVec;
use ox32_kernel_params::{KERNEL_STACK_SIZE, PAGE_SIZE, PROCS_MAX, USER_BASE, USER_END};
use page_alloc::{PageAllocator, PhysAddr};
use page_table::{PageTable, PteFlags};

use crate::{Context, ContextSwitch, ProcError, ProcId, ProcState};

/// Maximum number of regions identity-mapped into every address space.
const IDENTITY_REGIONS_MAX: usize = 4;

/// A physical range mapped at the same virtual address in every process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRegion {
    pub start: PhysAddr,
    pub size: usize,
    pub flags: PteFlags,
}

/// Where a new process starts executing.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    /// A raw user image, loaded at [`USER_BASE`] and entered through the
    /// user-mode trampoline.
    User(&'a [u8]),
    /// A kernel function, entered directly in supervisor mode.
    Kernel(usize),
}

/// Process control block.
#[derive(Debug)]
pub struct Process {
    pid: ProcId,
    state: ProcState,
    /// Saved kernel stack pointer while the process is switched out.
    sp: usize,
    page_table: Option<PageTable>,
    /// Lowest address of the kernel stack, as a kernel pointer.
    stack_base: usize,
}

impl Process {
    const fn unused(slot: usize) -> Self {
        Self {
            pid: ProcId::new(slot),
            state: ProcState::Unused,
            sp: 0,
            page_table: None,
            stack_base: 0,
        }
    }

    #[must_use]
    pub fn pid(&self) -> ProcId {
        self.pid
    }

    #[must_use]
    pub fn state(&self) -> ProcState {
        self.state
    }

    #[must_use]
    pub fn saved_sp(&self) -> usize {
        self.sp
    }

    #[must_use]
    pub fn page_table(&self) -> Option<PageTable> {
        self.page_table
    }

    /// Returns one past the highest address of the kernel stack.
    #[must_use]
    pub fn stack_top(&self) -> usize {
        self.stack_base + KERNEL_STACK_SIZE
    }
}

/// Owner of the process table.
///
/// Created empty in a `const` context, then [`boot`](Self::boot)ed once
/// with the allocator. After that, processes change state only through
/// [`create_process`](Self::create_process),
/// [`schedule`](Self::schedule), and
/// [`exit_current`](Self::exit_current).
#[derive(Debug)]
pub struct Scheduler {
    procs: [Process; PROCS_MAX],
    current: usize,
    booted: bool,
    identity: ArrayVec<IdentityRegion, IDENTITY_REGIONS_MAX>,
    user_entry: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub const fn new() -> Self {
        let mut procs = [const { Process::unused(0) }; PROCS_MAX];
        let mut i = 0;
        while i < PROCS_MAX {
            procs[i].pid = ProcId::new(i);
            i += 1;
        }
        Self {
            procs,
            current: 0,
            booted: false,
            identity: ArrayVec::new_const(),
            user_entry: 0,
        }
    }

    /// Records the kernel address-space layout and creates the idle process.
    ///
    /// `identity` lists the regions every process maps at their physical
    /// addresses. `user_entry` is the kernel address of the trampoline that
    /// drops a new user process into user mode. The caller continues as the
    /// idle process; its stack pointer is saved by the first switch away.
    pub fn boot(
        &mut self,
        alloc: &mut PageAllocator,
        identity: &[IdentityRegion],
        user_entry: usize,
    ) -> Result<ProcId, ProcError> {
        if self.booted {
            return Err(ProcError::AlreadyBooted);
        }
        if identity.len() > IDENTITY_REGIONS_MAX {
            return Err(ProcError::TooManyRegions);
        }
        self.identity = identity.iter().copied().collect();
        self.user_entry = user_entry;

        let idle = &mut self.procs[0];
        let (stack_base, page_table) = Self::new_address_space(alloc, &self.identity)?;
        idle.stack_base = stack_base;
        idle.page_table = Some(page_table);
        idle.state = ProcState::Runnable;
        self.current = 0;
        self.booted = true;
        Ok(ProcId::IDLE)
    }

    /// Allocates a kernel stack and a page table with the identity regions
    /// mapped.
    fn new_address_space(
        alloc: &mut PageAllocator,
        identity: &[IdentityRegion],
    ) -> Result<(usize, PageTable), ProcError> {
        let stack = alloc.allocate(KERNEL_STACK_SIZE / PAGE_SIZE)?;
        let stack_base = alloc.direct_map().ptr::<u8>(stack).addr();

        let mut page_table = PageTable::allocate(alloc)?;
        for region in identity {
            page_table.identity_map(alloc, region.start, region.size, region.flags)?;
        }
        Ok((stack_base, page_table))
    }

    /// Creates a runnable process in the first unused slot.
    pub fn create_process(
        &mut self,
        alloc: &mut PageAllocator,
        entry: Entry<'_>,
    ) -> Result<ProcId, ProcError> {
        if !self.booted {
            return Err(ProcError::NotBooted);
        }
        if let Entry::User(image) = entry {
            if image.len() > USER_END - USER_BASE {
                return Err(ProcError::ImageTooLarge(image.len()));
            }
        }
        let slot = (1..PROCS_MAX)
            .find(|&i| self.procs[i].state == ProcState::Unused)
            .ok_or(ProcError::NoFreeSlot)?;

        let (stack_base, mut page_table) = Self::new_address_space(alloc, &self.identity)?;

        let ra = match entry {
            Entry::User(image) => {
                Self::load_image(alloc, &mut page_table, image)?;
                self.user_entry
            }
            Entry::Kernel(pc) => pc,
        };

        // pre-push the registers the first switch to this process pops
        let sp = stack_base + KERNEL_STACK_SIZE - size_of::<Context>();
        unsafe {
            core::ptr::with_exposed_provenance_mut::<Context>(sp).write(Context::returning_to(ra));
        }

        let p = &mut self.procs[slot];
        p.sp = sp;
        p.stack_base = stack_base;
        p.page_table = Some(page_table);
        p.state = ProcState::Runnable;

        log::debug!("created process {} (entry={ra:#x}, sp={sp:#x})", p.pid);
        Ok(p.pid)
    }

    /// Copies `image` page by page into fresh pages mapped at [`USER_BASE`].
    fn load_image(
        alloc: &mut PageAllocator,
        page_table: &mut PageTable,
        image: &[u8],
    ) -> Result<(), ProcError> {
        let map = alloc.direct_map();
        for (i, chunk) in image.chunks(PAGE_SIZE).enumerate() {
            let page = alloc.allocate(1)?;
            unsafe {
                map.ptr::<u8>(page)
                    .copy_from_nonoverlapping(chunk.as_ptr(), chunk.len());
            }
            page_table.map(alloc, USER_BASE + i * PAGE_SIZE, page, PteFlags::URWX)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn current(&self) -> &Process {
        &self.procs[self.current]
    }

    #[must_use]
    pub fn process(&self, pid: ProcId) -> Option<&Process> {
        self.procs.get(pid.get())
    }

    /// Returns `true` if any process other than idle can run.
    #[must_use]
    pub fn has_runnable(&self) -> bool {
        self.procs[1..]
            .iter()
            .any(|p| p.state == ProcState::Runnable)
    }

    /// Picks the next process to run.
    ///
    /// The search starts just after the current process and wraps around
    /// the table, skipping the idle process; idle is chosen only when no
    /// other process is runnable. Returns `None` if the choice is the
    /// current process.
    pub fn schedule(&mut self) -> Option<ContextSwitch> {
        let current = self.current;
        let next = (1..=PROCS_MAX)
            .map(|i| (current + i) % PROCS_MAX)
            .find(|&i| i != 0 && self.procs[i].state == ProcState::Runnable)
            .unwrap_or(0);
        if next == current {
            return None;
        }

        // the idle process is runnable from boot; anything else was checked
        // above, and every runnable process has a page table
        let next_table = self.procs[next].page_table?;
        let next_stack_top = self.procs[next].stack_top();
        self.current = next;

        Some(ContextSwitch {
            prev_sp: &raw mut self.procs[current].sp,
            next_sp: &raw const self.procs[next].sp,
            next_table,
            next_stack_top,
        })
    }

    /// Marks the current process exited.
    ///
    /// The slot is not reused and its memory is not reclaimed. The caller
    /// must switch away afterwards.
    pub fn exit_current(&mut self) -> Result<ProcId, ProcError> {
        if self.current == 0 {
            return Err(ProcError::IdleCannotExit);
        }
        let p = &mut self.procs[self.current];
        p.state = ProcState::Exited;
        Ok(p.pid)
    }
}
