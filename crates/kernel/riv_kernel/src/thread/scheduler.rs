//! Cooperative round-robin scheduler.
//!
//! One singly linked run queue of live threads; the head is the running
//! thread. A tick rotates the head to the tail and dispatches the new
//! head. Dispatching is nothing but retargeting the trap frame pointer
//! through the arch port, so the switch takes effect when the current
//! trap returns.

use core::ptr::NonNull;

use super::{Thread, ThreadId, ThreadLevel, ThreadState, ThreadStore};
use crate::{
    arch::Port,
    error::KernelError,
    param::NTHREAD,
};

/// Availability bitset for thread ids: a set bit means the id is free.
struct IdSet {
    bits: [u64; NTHREAD / 64],
}

impl IdSet {
    const fn full() -> Self {
        Self {
            bits: [u64::MAX; NTHREAD / 64],
        }
    }

    /// Claims the lowest available id.
    fn claim_first(&mut self) -> Option<u16> {
        for (word_index, word) in self.bits.iter_mut().enumerate() {
            if *word == 0 {
                continue;
            }
            let bit = word.trailing_zeros();
            *word &= !(1 << bit);
            return Some((word_index * 64) as u16 + bit as u16);
        }
        None
    }

    /// Claims a specific id; `false` if it is already taken.
    fn claim(&mut self, id: u16) -> bool {
        let word = &mut self.bits[usize::from(id) / 64];
        let mask = 1 << (id % 64);
        if *word & mask == 0 {
            return false;
        }
        *word &= !mask;
        true
    }

    fn release(&mut self, id: u16) {
        let word = &mut self.bits[usize::from(id) / 64];
        let mask = 1 << (id % 64);
        debug_assert_eq!(*word & mask, 0, "releasing a free id");
        *word |= mask;
    }
}

pub struct Scheduler<P> {
    port: P,
    ids: IdSet,
    /// The running thread.
    head: Option<NonNull<Thread>>,
    tail: Option<NonNull<Thread>>,
    live: usize,
}

unsafe impl<P: Send> Send for Scheduler<P> {}

impl<P: Port> Scheduler<P> {
    #[must_use]
    pub const fn new(port: P) -> Self {
        Self {
            port,
            ids: IdSet::full(),
            head: None,
            tail: None,
            live: 0,
        }
    }

    #[must_use]
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Installs and dispatches the statically-allocated sentinel. The
    /// sentinel takes id 0, never exits, and never leaves the queue.
    pub fn init(
        &mut self,
        sentinel: NonNull<Thread>,
        stack_top: usize,
        idle: extern "C" fn() -> !,
    ) {
        assert!(self.head.is_none(), "scheduler initialized twice");
        assert!(self.ids.claim(ThreadId::SENTINEL.get()));

        {
            let sentinel = unsafe { &mut *sentinel.as_ptr() };
            assert_eq!(sentinel.id, ThreadId::SENTINEL);
            self.port
                .setup_thread(&mut sentinel.registers, idle, stack_top);
            sentinel.stack_top = stack_top;
            sentinel.next = None;
        }

        self.head = Some(sentinel);
        self.tail = Some(sentinel);
        self.live = 1;
        self.dispatch();
    }

    /// Number of live threads, sentinel included.
    #[must_use]
    pub fn live(&self) -> usize {
        self.live
    }

    /// Id of the running thread.
    #[must_use]
    pub fn current(&self) -> Option<ThreadId> {
        self.head.map(|head| unsafe { head.as_ref() }.id)
    }

    /// Creates a kernel thread and appends it to the run queue.
    pub fn spawn_kernel(
        &mut self,
        store: &mut dyn ThreadStore,
        entry: extern "C" fn() -> !,
    ) -> Result<ThreadId, KernelError> {
        assert!(self.head.is_some(), "spawn before scheduler init");

        let id = self
            .ids
            .claim_first()
            .ok_or(KernelError::NoAvailableThreads)?;

        let thread = match store.alloc_thread() {
            Ok(thread) => thread,
            Err(err) => {
                self.ids.release(id);
                return Err(err.into());
            }
        };
        let stack_top = match store.alloc_stack() {
            Ok(stack_top) => stack_top,
            Err(err) => {
                unsafe {
                    store.free_thread(thread);
                }
                self.ids.release(id);
                return Err(err.into());
            }
        };

        let mut registers = crate::arch::Registers::zeroed();
        self.port.setup_thread(&mut registers, entry, stack_top);
        unsafe {
            thread.write(Thread {
                registers,
                id: ThreadId::new(id),
                level: ThreadLevel::Kernel,
                state: ThreadState::Runnable,
                stack_top,
                next: None,
            });
        }

        self.append(thread);
        self.live += 1;
        Ok(ThreadId::new(id))
    }

    /// One scheduling round. An exiting head is reaped and its successor
    /// dispatched; otherwise the head rotates to the tail and the new
    /// head is dispatched.
    pub fn tick(&mut self, store: &mut dyn ThreadStore) {
        let Some(head) = self.head else {
            return;
        };

        if unsafe { head.as_ref() }.state == ThreadState::Exiting {
            self.reap_head(store);
        } else {
            self.rotate();
        }
        self.dispatch();
    }

    /// Marks the running thread for reaping at the next round.
    ///
    /// # Panics
    ///
    /// Panics if the running thread is the sentinel.
    pub fn mark_exit_current(&mut self) {
        let head = self.head.expect("no running thread");
        let head = unsafe { &mut *head.as_ptr() };
        assert_ne!(head.id, ThreadId::SENTINEL, "sentinel cannot exit");
        head.state = ThreadState::Exiting;
    }

    fn append(&mut self, thread: NonNull<Thread>) {
        let mut tail = self.tail.expect("append to empty queue");
        unsafe {
            debug_assert!(tail.as_ref().next.is_none());
            tail.as_mut().next = Some(thread);
        }
        self.tail = Some(thread);
    }

    /// Moves the head to the tail.
    fn rotate(&mut self) {
        let mut head = self.head.expect("rotate on empty queue");
        if self.tail == Some(head) {
            return;
        }
        unsafe {
            self.head = head.as_ref().next;
            head.as_mut().next = None;
        }
        self.append(head);
    }

    /// Unlinks and frees the exiting head. The sentinel can never be in
    /// this state, so the queue stays non-empty.
    fn reap_head(&mut self, store: &mut dyn ThreadStore) {
        let head = self.head.expect("reap on empty queue");
        let (id, stack_top, next) = {
            let thread = unsafe { head.as_ref() };
            debug_assert_ne!(thread.id, ThreadId::SENTINEL);
            (thread.id, thread.stack_top, thread.next)
        };

        self.head = next;
        if self.tail == Some(head) {
            self.tail = next;
        }

        unsafe {
            store.free_stack(stack_top);
            store.free_thread(head);
        }
        self.ids.release(id.get());
        self.live -= 1;
    }

    /// Makes the head the thread the next trap return resumes.
    fn dispatch(&self) {
        if let Some(head) = self.head {
            self.port.switch_to(unsafe { head.as_ref() }.frame());
        }
    }
}
