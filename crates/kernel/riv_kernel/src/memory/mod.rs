//! Physical memory management glue.
//!
//! [`page`] owns the kernel's buddy allocator, fed from the device tree's
//! memory nodes; [`cache`] bootstraps the object caches on top of it. Both
//! reach physical memory through the higher-half direct map.

use core::ptr::NonNull;

use buddy_alloc::PhysMapper;

pub use buddy_alloc::{PAGE_SHIFT, PAGE_SIZE};

pub mod cache;
pub mod page;

/// Base of the higher-half direct map: the bottom of the sv39 upper half,
/// one gigapage-mapped window over physical memory.
pub const HHDM_BASE: usize = 0xFFFF_FFC0_0000_0000;

/// The higher-half direct map as a [`PhysMapper`] lens.
#[derive(Debug, Clone, Copy)]
pub struct Hhdm;

impl PhysMapper for Hhdm {
    fn phys_to_virt(&self, pa: usize) -> NonNull<u8> {
        phys_to_virt(pa)
    }
}

/// Kernel-virtual pointer for a physical address.
#[must_use]
pub fn phys_to_virt(pa: usize) -> NonNull<u8> {
    NonNull::new(core::ptr::with_exposed_provenance_mut(HHDM_BASE + pa))
        .expect("physical address outside the direct map")
}

/// Physical address behind a direct-mapped pointer.
#[must_use]
pub fn virt_to_phys(ptr: NonNull<u8>) -> usize {
    ptr.addr().get() - HHDM_BASE
}
