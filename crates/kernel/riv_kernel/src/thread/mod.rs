//! Kernel threads.
//!
//! Threads are objects from a slab cache; their stacks are buddy blocks.
//! The sentinel thread (id 0) is statically allocated, always live, and
//! parks the hart in `wfi`; it is the thread the boot path becomes.

use core::{fmt, ptr::NonNull};

use buddy_alloc::{AllocError, block_bytes};
use object_cache::Cache;

use crate::{
    arch::{Arch, Port as _, Registers},
    error::KernelError,
    interrupt,
    memory::{self, cache, page},
    param::STACK_ORDER,
    sync::{BootCell, SpinLock},
};

pub mod scheduler;

pub use scheduler::Scheduler;

/// Thread identifier; dense, drawn from a bitset of
/// [`NTHREAD`](crate::param::NTHREAD) ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(u16);

impl ThreadId {
    /// The statically-allocated sentinel's id.
    pub const SENTINEL: Self = Self(0);

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    pub(crate) const fn new(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadLevel {
    Kernel,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThreadState {
    Runnable,
    /// Marked by [`exit`]; reaped by the next scheduling round. The frame
    /// and stack stay valid until then because the next trap still saves
    /// into them.
    Exiting,
}

/// A kernel thread.
///
/// The register frame comes first so a thread pointer doubles as the
/// frame pointer `sscratch` carries.
#[repr(C)]
pub struct Thread {
    pub(crate) registers: Registers,
    pub(crate) id: ThreadId,
    pub(crate) level: ThreadLevel,
    pub(crate) state: ThreadState,
    pub(crate) stack_top: usize,
    /// Run-queue link; a thread is on the queue at most once.
    pub(crate) next: Option<NonNull<Thread>>,
}

impl Thread {
    pub(crate) const fn sentinel() -> Self {
        Self {
            registers: Registers::zeroed(),
            id: ThreadId::SENTINEL,
            level: ThreadLevel::Kernel,
            state: ThreadState::Runnable,
            stack_top: 0,
            next: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[must_use]
    pub fn level(&self) -> ThreadLevel {
        self.level
    }

    pub(crate) fn frame(&self) -> NonNull<Registers> {
        NonNull::from(&self.registers)
    }
}

/// Backing store for threads: thread objects and their stacks.
///
/// The scheduler stays storage-agnostic so its queue logic runs under
/// host tests against plain heap memory.
pub trait ThreadStore {
    fn alloc_thread(&mut self) -> Result<NonNull<Thread>, AllocError>;

    /// # Safety
    ///
    /// `thread` must come from [`Self::alloc_thread`] and be dead.
    unsafe fn free_thread(&mut self, thread: NonNull<Thread>);

    /// Allocates a stack, returning the address of its top.
    fn alloc_stack(&mut self) -> Result<usize, AllocError>;

    /// # Safety
    ///
    /// `stack_top` must come from [`Self::alloc_stack`] and the stack must
    /// no longer be in use.
    unsafe fn free_stack(&mut self, stack_top: usize);
}

/// The kernel's store: `Thread` objects from their cache, stacks from the
/// buddy allocator.
pub struct KernelThreadStore;

static THREAD_CACHE: BootCell<&'static SpinLock<Cache>> = BootCell::new();

impl ThreadStore for KernelThreadStore {
    fn alloc_thread(&mut self) -> Result<NonNull<Thread>, AllocError> {
        let object = THREAD_CACHE.get().lock().alloc(&mut cache::BuddySource)?;
        Ok(object.cast())
    }

    unsafe fn free_thread(&mut self, thread: NonNull<Thread>) {
        unsafe {
            THREAD_CACHE.get().lock().free(thread.cast());
        }
    }

    fn alloc_stack(&mut self) -> Result<usize, AllocError> {
        let pa = page::alloc_block(STACK_ORDER)?;
        let base = memory::phys_to_virt(pa);
        Ok(base.addr().get() + block_bytes(STACK_ORDER))
    }

    unsafe fn free_stack(&mut self, stack_top: usize) {
        let base = stack_top - block_bytes(STACK_ORDER);
        let pa = memory::virt_to_phys(NonNull::new(core::ptr::with_exposed_provenance_mut(base)).unwrap());
        unsafe {
            page::free_block(pa, STACK_ORDER);
        }
    }
}

static SCHEDULER: SpinLock<Scheduler<Arch>> = SpinLock::new(Scheduler::new(Arch::new()));

static mut SENTINEL: Thread = Thread::sentinel();

#[repr(C, align(16))]
struct SentinelStack([u8; 4096]);
static mut SENTINEL_STACK: SentinelStack = SentinelStack([0; 4096]);

/// Entry the sentinel parks in.
extern "C" fn idle_main() -> ! {
    let arch = Arch::new();
    loop {
        arch.wait_for_interrupt();
    }
}

/// Brings up the thread subsystem: the thread cache, then the scheduler
/// with the sentinel installed and dispatched.
pub fn init() -> Result<(), KernelError> {
    THREAD_CACHE.set(cache::new_cache(
        "thread",
        0,
        size_of::<Thread>(),
        align_of::<Thread>().trailing_zeros(),
    )?);

    let sentinel = NonNull::new(&raw mut SENTINEL).unwrap();
    let stack_top = (&raw const SENTINEL_STACK).addr() + size_of::<SentinelStack>();
    SCHEDULER.lock().init(sentinel, stack_top, idle_main);
    Ok(())
}

/// Spawns a kernel thread running `entry`.
pub fn spawn_kernel(entry: extern "C" fn() -> !) -> Result<ThreadId, KernelError> {
    SCHEDULER.lock().spawn_kernel(&mut KernelThreadStore, entry)
}

/// Timer-driven scheduling round: reap an exiting head, else rotate the
/// run queue; then dispatch.
pub fn tick() {
    SCHEDULER.lock().tick(&mut KernelThreadStore);
}

/// The currently dispatched thread.
#[must_use]
pub fn current() -> Option<ThreadId> {
    SCHEDULER.lock().current()
}

/// Terminates the calling thread.
///
/// Does not return: the thread is marked and keeps idling on its own
/// stack until the next tick reaps it. Its frame must stay valid up to
/// that point, since the reaping trap still saves registers into it.
pub fn exit() -> ! {
    SCHEDULER.lock().mark_exit_current();
    interrupt::enable();
    let arch = Arch::new();
    loop {
        arch.wait_for_interrupt();
    }
}
