use page_table::PageTable;

/// Machine operations the scheduler needs in order to switch processes.
pub trait Platform {
    /// Installs `table` as the active address space, with TLB flushes
    /// before and after.
    ///
    /// # Safety
    ///
    /// `table` must map the currently executing kernel code and stack.
    unsafe fn activate_address_space(&self, table: PageTable);

    /// Sets the stack the next trap will land on.
    ///
    /// # Safety
    ///
    /// `top` must be the top of a kernel stack not otherwise in use by a
    /// trap.
    unsafe fn set_trap_stack(&self, top: usize);

    /// Saves the callee-saved registers on the current stack, stores the
    /// stack pointer in `*prev_sp`, loads the stack pointer from `*next_sp`
    /// and restores the registers saved there.
    ///
    /// Returns when another switch names `prev_sp` as its target.
    ///
    /// # Safety
    ///
    /// `*next_sp` must point at a [`Context`](crate::Context) saved by a
    /// previous switch or pre-pushed at process creation.
    unsafe fn switch_context(&self, prev_sp: *mut usize, next_sp: *const usize);
}

/// A scheduling decision, ready to be carried out.
///
/// Produced by [`Scheduler::schedule`](crate::Scheduler::schedule) while the
/// scheduler is locked, and performed after the lock is released.
#[derive(Debug)]
#[must_use]
pub struct ContextSwitch {
    pub(crate) prev_sp: *mut usize,
    pub(crate) next_sp: *const usize,
    pub(crate) next_table: PageTable,
    pub(crate) next_stack_top: usize,
}

impl ContextSwitch {
    #[must_use]
    pub fn next_table(&self) -> PageTable {
        self.next_table
    }

    #[must_use]
    pub fn next_stack_top(&self) -> usize {
        self.next_stack_top
    }

    /// Switches address space, trap stack, and kernel stack.
    ///
    /// # Safety
    ///
    /// The scheduler that produced this switch must still be alive and
    /// must not be borrowed while the switch is in progress.
    pub unsafe fn perform<P>(self, platform: &P)
    where
        P: Platform + ?Sized,
    {
        unsafe {
            platform.activate_address_space(self.next_table);
            platform.set_trap_stack(self.next_stack_top);
            platform.switch_context(self.prev_sp, self.next_sp);
        }
    }
}
