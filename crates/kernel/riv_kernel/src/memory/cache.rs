//! Object cache bootstrap.
//!
//! The first cache describes `Cache` itself: a statically-initialized
//! cache-of-caches, so every other cache is an object allocated from a
//! slab like anything else. Slabs draw their backing blocks from the page
//! allocator through [`BuddySource`].

use core::ptr::NonNull;

use buddy_alloc::AllocError;
use object_cache::{Cache, SlabSource};

use super::page;
use crate::{KernelError, sync::SpinLock};

/// The page allocator as a slab backing store.
pub struct BuddySource;

impl SlabSource for BuddySource {
    fn alloc_block(&mut self, order: usize) -> Result<usize, AllocError> {
        page::alloc_block(order)
    }

    fn phys_to_virt(&self, pa: usize) -> NonNull<u8> {
        super::phys_to_virt(pa)
    }
}

/// Caches hand out locked objects, so the cache-of-caches serves
/// `SpinLock<Cache>` values.
type CacheObject = SpinLock<Cache>;

static CACHE_CACHE: SpinLock<Cache> = SpinLock::new(Cache::new(
    "cache",
    0,
    size_of::<CacheObject>(),
    align_of::<CacheObject>().trailing_zeros(),
));

/// Creates an object cache, itself allocated from the cache-of-caches.
/// Caches live for the rest of the kernel's life.
pub fn new_cache(
    name: &'static str,
    slab_order: usize,
    object_size: usize,
    align_log: u32,
) -> Result<&'static SpinLock<Cache>, KernelError> {
    let object = CACHE_CACHE.lock().alloc(&mut BuddySource)?;
    let cache = object.cast::<CacheObject>();
    unsafe {
        cache.write(SpinLock::new(Cache::new(name, slab_order, object_size, align_log)));
        Ok(cache.as_ref())
    }
}
