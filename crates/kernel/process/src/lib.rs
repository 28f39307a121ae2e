//! Process table and cooperative round-robin scheduling.
//!
//! The [`Scheduler`] owns every process control block. It decides which
//! process runs next and describes the switch as a [`ContextSwitch`]; the
//! machine-specific half (writing `satp`, staging the trap stack, swapping
//! stacks) is done by a [`Platform`] implementation.
#![cfg_attr(not(test), no_std)]

use core::fmt;

use page_alloc::AllocError;
use page_table::PageTableError;

pub use self::{
    context::{Context, TrapFrame},
    scheduler::{Entry, IdentityRegion, Process, Scheduler},
    switch::{ContextSwitch, Platform},
};

mod context;
mod scheduler;
mod switch;

/// Process identifier. Equal to the process's slot in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcId(usize);

impl fmt::Display for ProcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ProcId {
    /// The idle process.
    pub const IDLE: Self = Self(0);

    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_idle(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Runnable,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProcError {
    #[error("no free process slot")]
    NoFreeSlot,
    #[error("scheduler is not booted")]
    NotBooted,
    #[error("scheduler is already booted")]
    AlreadyBooted,
    #[error("too many identity regions")]
    TooManyRegions,
    #[error("user image too large: {0} bytes")]
    ImageTooLarge(usize),
    #[error("idle process cannot exit")]
    IdleCannotExit,
    #[error("allocation failed: {0}")]
    Alloc(#[from] AllocError),
    #[error("page table: {0}")]
    PageTable(#[from] PageTableError),
}
