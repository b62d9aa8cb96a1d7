//! The kernel's physical page allocator.
//!
//! Built once at boot from the device tree's `/memory` nodes, minus the
//! kernel image, the FDT blob, and whatever the firmware's reservation
//! block claims.

use core::ops::Range;

use arrayvec::ArrayVec;
use buddy_alloc::{AllocError, BuddyAllocator, PAGE_SHIFT, PAGE_SIZE, PhysMapper};
use riv_fdt::DeviceTree;

use super::Hhdm;
use crate::{KernelError, println, sync::{BootCell, SpinLock}};

const MAX_RESERVATIONS: usize = 16;

static PAGE_ALLOCATOR: BootCell<SpinLock<BuddyAllocator<Hhdm>>> = BootCell::new();

/// Feeds every usable RAM region to the buddy allocator.
///
/// `kernel_image` and `fdt_blob` are physical ranges to withhold, on top
/// of the blob's own memory-reservation block.
pub fn init(
    dt: &DeviceTree,
    kernel_image: Range<usize>,
    fdt_blob: Range<usize>,
) -> Result<(), KernelError> {
    let mut reserved: ArrayVec<Range<usize>, MAX_RESERVATIONS> = ArrayVec::new();
    reserved.push(kernel_image);
    reserved.push(fdt_blob);
    for region in dt.reserved_regions() {
        let start = usize::try_from(region.addr).unwrap_or(usize::MAX);
        let end = start.saturating_add(usize::try_from(region.size).unwrap_or(0));
        if reserved.try_push(start..end).is_err() {
            println!("memory: reservation table full, dropping {start:#x}..{end:#x}");
            break;
        }
    }

    let mut buddy = BuddyAllocator::new(Hhdm);
    let mut memory_nodes = 0;
    for (name, id) in dt.root().children() {
        if name.split('@').next() != Some("memory") {
            continue;
        }
        memory_nodes += 1;
        for entry in dt.reg(id)? {
            let start = usize::try_from(entry.addr).unwrap();
            let end = start + usize::try_from(entry.size).unwrap();
            unsafe {
                ingest_excluding(&mut buddy, start..end, &reserved);
            }
        }
    }
    if memory_nodes == 0 {
        return Err(KernelError::DeviceNotFound);
    }

    println!(
        "memory: {} pages usable ({} KiB)",
        buddy.total_pages(),
        buddy.total_pages() * PAGE_SIZE / 1024
    );
    PAGE_ALLOCATOR.set(SpinLock::new(buddy));
    Ok(())
}

/// Ingests the page-aligned interior of `region`, splitting around any
/// reserved ranges. Returns the number of pages handed over.
///
/// # Safety
///
/// Same contract as [`BuddyAllocator::ingest`] for the unreserved parts
/// of `region`.
pub(crate) unsafe fn ingest_excluding<M: PhysMapper>(
    buddy: &mut BuddyAllocator<M>,
    region: Range<usize>,
    reserved: &[Range<usize>],
) -> usize {
    // lowest-starting reservation overlapping the region
    let hole = reserved
        .iter()
        .filter(|r| r.start < region.end && r.end > region.start && !r.is_empty())
        .min_by_key(|r| r.start);

    if let Some(hole) = hole {
        let mut pages = 0;
        if region.start < hole.start {
            pages += unsafe { ingest_excluding(buddy, region.start..hole.start, reserved) };
        }
        if hole.end < region.end {
            pages += unsafe { ingest_excluding(buddy, hole.end..region.end, reserved) };
        }
        return pages;
    }

    let first_page = region.start.div_ceil(PAGE_SIZE);
    let end_page = region.end / PAGE_SIZE;
    if first_page >= end_page {
        return 0;
    }
    unsafe {
        buddy.ingest(first_page, end_page - first_page);
    }
    end_page - first_page
}

/// Allocates a block of `2^order` pages, returning its physical address.
pub fn alloc_block(order: usize) -> Result<usize, AllocError> {
    PAGE_ALLOCATOR.get().lock().alloc(order)
}

/// Frees a block from [`alloc_block`].
///
/// # Safety
///
/// Same contract as [`BuddyAllocator::free`].
pub unsafe fn free_block(pa: usize, order: usize) {
    unsafe {
        PAGE_ALLOCATOR.get().lock().free(pa, order);
    }
}

/// `(free, total)` page counts.
#[must_use]
pub fn stats() -> (usize, usize) {
    let allocator = PAGE_ALLOCATOR.get().lock();
    (allocator.free_pages(), allocator.total_pages())
}

/// Page index of the first page at or above `addr`.
#[must_use]
pub const fn page_index(addr: usize) -> usize {
    addr >> PAGE_SHIFT
}
