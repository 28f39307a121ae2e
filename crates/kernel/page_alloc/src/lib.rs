//! Physical page allocation.
//!
//! Pages are handed out by a bump allocator and are never returned. Physical
//! memory is accessed through a [`DirectMap`], which translates physical
//! addresses into pointers the kernel can dereference.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub use self::{
    addr::{DirectMap, PhysAddr},
    page_frame_allocator::{AllocError, PageAllocator},
};

mod addr;
#[cfg(any(test, feature = "std"))]
pub mod arena;
mod page_frame_allocator;
