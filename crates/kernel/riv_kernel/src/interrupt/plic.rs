//! Platform-Level Interrupt Controller driver.
//!
//! Implements the interrupt-controller facade over the PLIC's MMIO block.
//! Register map (byte offsets from the `reg` base, all accesses 32-bit):
//!
//! ```text
//! 0x00_0000  per-source priority, 4 bytes each (source 0 unused)
//! 0x00_1000  pending bits, one per source
//! 0x00_2000  per-context enable bits, 0x80 stride
//! 0x20_0000  per-context block, 0x1000 stride:
//!              +0 priority threshold, +4 claim/complete
//! ```
//!
//! The driver binds through the module registry on the node's `compatible`
//! and serves the supervisor context of hart 0.

use core::ptr::NonNull;

use riv_fdt::{DeviceTree, NodeId, Property};

use crate::{
    error::KernelError,
    interrupt::{self, InterruptController},
    memory,
    param::NIRQ,
    println,
    sync::{BootCell, SpinLock},
};

const PRIORITY_BASE: usize = 0x0;
const PENDING_BASE: usize = 0x1000;
const ENABLE_BASE: usize = 0x2000;
const ENABLE_STRIDE: usize = 0x80;
const CONTEXT_BASE: usize = 0x20_0000;
const CONTEXT_STRIDE: usize = 0x1000;
const CLAIM_OFFSET: usize = 0x4;

/// Highest representable source priority; 0 masks the source.
pub const MAX_PRIORITY: u32 = 7;

/// Sources the priority array has room for (source 0 is reserved).
const MAX_NDEV: u32 = 1023;

/// Supervisor-mode context of hart 0 on qemu-virt (context 0 is its
/// machine-mode twin).
const HART0_SUPERVISOR_CONTEXT: usize = 1;

pub struct Plic {
    base: NonNull<u32>,
    ndev: u32,
    context_count: usize,
    /// The context this kernel claims from.
    context: usize,
    handlers: [Option<fn(u32)>; NIRQ],
}

unsafe impl Send for Plic {}

impl Plic {
    /// # Safety
    ///
    /// `base` must point at a mapped PLIC register block covering
    /// `context_count` contexts.
    pub unsafe fn new(base: NonNull<u32>, ndev: u32, context_count: usize, context: usize) -> Self {
        assert!(ndev > 0 && ndev <= MAX_NDEV);
        assert!(context < context_count);
        Self {
            base,
            ndev,
            context_count,
            context,
            handlers: [None; NIRQ],
        }
    }

    fn word(&self, byte_offset: usize) -> NonNull<u32> {
        unsafe { self.base.byte_add(byte_offset) }
    }

    fn read_word(&self, byte_offset: usize) -> u32 {
        unsafe { self.word(byte_offset).read_volatile() }
    }

    fn write_word(&self, byte_offset: usize, value: u32) {
        unsafe {
            self.word(byte_offset).write_volatile(value);
        }
    }

    fn check_id(&self, id: u32) -> Result<(), KernelError> {
        if id == 0 || id > self.ndev {
            return Err(KernelError::InvalidInterruptId(id));
        }
        Ok(())
    }

    fn check_context(&self, context: usize) -> Result<(), KernelError> {
        if context >= self.context_count {
            return Err(KernelError::InvalidContext(context));
        }
        Ok(())
    }

    fn enable_word_offset(&self, context: usize, id: u32) -> usize {
        ENABLE_BASE + context * ENABLE_STRIDE + (id as usize / 32) * 4
    }

    /// Sets the source's bit in this kernel's context enable bitmap. The
    /// source also needs a nonzero priority to fire.
    pub fn enable(&self, id: u32) -> Result<(), KernelError> {
        self.check_id(id)?;
        let offset = self.enable_word_offset(self.context, id);
        self.write_word(offset, self.read_word(offset) | (1 << (id % 32)));
        Ok(())
    }

    pub fn disable(&self, id: u32) -> Result<(), KernelError> {
        self.check_id(id)?;
        let offset = self.enable_word_offset(self.context, id);
        self.write_word(offset, self.read_word(offset) & !(1 << (id % 32)));
        Ok(())
    }

    pub fn set_priority(&self, id: u32, priority: u32) -> Result<(), KernelError> {
        self.check_id(id)?;
        if priority > MAX_PRIORITY {
            return Err(KernelError::InvalidPriority(priority));
        }
        self.write_word(PRIORITY_BASE + id as usize * 4, priority);
        Ok(())
    }

    pub fn get_priority(&self, id: u32) -> Result<u32, KernelError> {
        self.check_id(id)?;
        Ok(self.read_word(PRIORITY_BASE + id as usize * 4))
    }

    #[must_use]
    pub fn pending(&self, id: u32) -> bool {
        self.read_word(PENDING_BASE + (id as usize / 32) * 4) & (1 << (id % 32)) != 0
    }

    /// Masks sources below `threshold` for a context.
    pub fn set_threshold(&self, context: usize, threshold: u32) -> Result<(), KernelError> {
        self.check_context(context)?;
        if threshold > MAX_PRIORITY {
            return Err(KernelError::InvalidThreshold(threshold));
        }
        self.write_word(CONTEXT_BASE + context * CONTEXT_STRIDE, threshold);
        Ok(())
    }

    pub fn set_handler(&mut self, id: u32, handler: fn(u32)) -> Result<(), KernelError> {
        self.check_id(id)?;
        let slot = self
            .handlers
            .get_mut(id as usize)
            .ok_or(KernelError::InvalidInterruptId(id))?;
        *slot = Some(handler);
        Ok(())
    }

    /// Claims the highest-priority pending source, if any, together with
    /// its registered handler. A claim of 0 means no source was above the
    /// threshold (spurious wakeup).
    pub fn claim_source(&self) -> Option<(u32, Option<fn(u32)>)> {
        let id = self.read_word(CONTEXT_BASE + self.context * CONTEXT_STRIDE + CLAIM_OFFSET);
        if id == 0 {
            return None;
        }
        let handler = self.handlers.get(id as usize).copied().flatten();
        Some((id, handler))
    }

    /// Signals the claimed source as served; must echo the claimed id.
    pub fn complete(&self, id: u32) {
        self.write_word(
            CONTEXT_BASE + self.context * CONTEXT_STRIDE + CLAIM_OFFSET,
            id,
        );
    }
}

static PLIC: BootCell<SpinLock<Plic>> = BootCell::new();

/// Supervisor external interrupt path: claim, dispatch, complete.
///
/// The handler runs with the PLIC lock dropped so it may call back into
/// the facade.
pub(crate) fn handle_external() {
    let Some(plic) = PLIC.try_get() else {
        println!("external interrupt before PLIC init");
        return;
    };

    let Some((id, handler)) = plic.lock().claim_source() else {
        return;
    };
    match handler {
        Some(handler) => handler(id),
        None => println!("unexpected interrupt irq={id}"),
    }
    plic.lock().complete(id);
}

fn with_plic<R>(op: impl FnOnce(&mut Plic) -> Result<R, KernelError>) -> Result<R, KernelError> {
    let plic = PLIC.try_get().ok_or(KernelError::ControllerInternalError)?;
    op(&mut plic.lock())
}

fn facade_enable(id: u32) -> Result<(), KernelError> {
    with_plic(|p| p.enable(id))
}

fn facade_disable(id: u32) -> Result<(), KernelError> {
    with_plic(|p| p.disable(id))
}

fn facade_set_priority(id: u32, priority: u32) -> Result<(), KernelError> {
    with_plic(|p| p.set_priority(id, priority))
}

fn facade_get_priority(id: u32) -> Result<u32, KernelError> {
    with_plic(|p| p.get_priority(id))
}

fn facade_set_handler(id: u32, handler: fn(u32)) -> Result<(), KernelError> {
    with_plic(|p| p.set_handler(id, handler))
}

/// Module-registry driver init: map the register block from `reg`, size
/// the controller from its properties, quiesce it, and register the
/// facade.
pub fn init_driver(dt: &DeviceTree, node_id: NodeId) -> Result<(), KernelError> {
    if PLIC.try_get().is_some() {
        return Err(KernelError::AlreadyRegistered);
    }

    let node = dt.node(node_id);
    let reg = dt
        .reg(node_id)?
        .next()
        .ok_or(KernelError::MissingProperty("reg"))?;

    let ndev = match node.property("riscv,ndev") {
        Some(&Property::Other { value, .. }) if value.len() == 4 => {
            u32::from_be_bytes(value.try_into().unwrap())
        }
        _ => MAX_NDEV,
    };

    let reg_size = usize::try_from(reg.size).map_err(|_| KernelError::DeviceNotFound)?;
    let context_count = reg_size
        .checked_sub(CONTEXT_BASE)
        .map_or(HART0_SUPERVISOR_CONTEXT + 1, |block| block / CONTEXT_STRIDE)
        .max(HART0_SUPERVISOR_CONTEXT + 1);

    let base = memory::phys_to_virt(usize::try_from(reg.addr).unwrap()).cast::<u32>();
    let plic = unsafe { Plic::new(base, ndev, context_count, HART0_SUPERVISOR_CONTEXT) };

    // quiesce: all sources masked, no threshold filtering
    for id in 1..=ndev {
        plic.set_priority(id, 0)?;
    }
    for word in 0..(ndev as usize + 31) / 32 {
        plic.write_word(
            ENABLE_BASE + plic.context * ENABLE_STRIDE + word * 4,
            0,
        );
    }
    plic.set_threshold(HART0_SUPERVISOR_CONTEXT, 0)?;

    PLIC.set(SpinLock::new(plic));

    interrupt::register(InterruptController {
        name: "plic",
        enable: facade_enable,
        disable: facade_disable,
        set_priority: facade_set_priority,
        get_priority: facade_get_priority,
        set_handler: facade_set_handler,
    })?;

    println!("plic: {ndev} sources, {context_count} contexts");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARENA_WORDS: usize = (CONTEXT_BASE + 2 * CONTEXT_STRIDE) / 4;

    struct Fixture {
        arena: Vec<u32>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                arena: vec![0; ARENA_WORDS],
            }
        }

        fn plic(&mut self, ndev: u32) -> Plic {
            let base = NonNull::new(self.arena.as_mut_ptr()).unwrap();
            unsafe { Plic::new(base, ndev, 2, HART0_SUPERVISOR_CONTEXT) }
        }

        fn word(&self, byte_offset: usize) -> u32 {
            self.arena[byte_offset / 4]
        }

        fn set_word(&mut self, byte_offset: usize, value: u32) {
            self.arena[byte_offset / 4] = value;
        }
    }

    #[test]
    fn enable_sets_the_context_bitmap_bit() {
        let mut f = Fixture::new();
        let plic = f.plic(95);
        plic.enable(53).unwrap();
        drop(plic);

        // context 1 enable base, second word for sources 32..63
        let offset = ENABLE_BASE + ENABLE_STRIDE + 4;
        assert_eq!(f.word(offset), 1 << (53 % 32));
        assert_eq!(f.word(ENABLE_BASE + 4), 0, "context 0 untouched");
    }

    #[test]
    fn disable_clears_only_its_bit() {
        let mut f = Fixture::new();
        let plic = f.plic(95);
        plic.enable(33).unwrap();
        plic.enable(34).unwrap();
        plic.disable(33).unwrap();
        drop(plic);

        let offset = ENABLE_BASE + ENABLE_STRIDE + 4;
        assert_eq!(f.word(offset), 1 << (34 % 32));
    }

    #[test]
    fn id_zero_and_out_of_range_are_rejected() {
        let mut f = Fixture::new();
        let plic = f.plic(95);
        assert_eq!(plic.enable(0), Err(KernelError::InvalidInterruptId(0)));
        assert_eq!(plic.enable(96), Err(KernelError::InvalidInterruptId(96)));
        assert_eq!(
            plic.get_priority(200),
            Err(KernelError::InvalidInterruptId(200))
        );
    }

    #[test]
    fn priorities_round_trip_and_validate() {
        let mut f = Fixture::new();
        let plic = f.plic(95);
        plic.set_priority(10, 7).unwrap();
        assert_eq!(plic.get_priority(10), Ok(7));
        assert_eq!(
            plic.set_priority(10, 8),
            Err(KernelError::InvalidPriority(8))
        );
        drop(plic);
        assert_eq!(f.word(PRIORITY_BASE + 10 * 4), 7);
    }

    #[test]
    fn thresholds_validate_context_and_level() {
        let mut f = Fixture::new();
        let plic = f.plic(95);
        plic.set_threshold(1, 3).unwrap();
        assert_eq!(plic.set_threshold(2, 0), Err(KernelError::InvalidContext(2)));
        assert_eq!(
            plic.set_threshold(1, 8),
            Err(KernelError::InvalidThreshold(8))
        );
        drop(plic);
        assert_eq!(f.word(CONTEXT_BASE + CONTEXT_STRIDE), 3);
    }

    #[test]
    fn claim_zero_is_spurious() {
        let mut f = Fixture::new();
        let plic = f.plic(95);
        assert!(plic.claim_source().is_none());
    }

    fn noop_handler(_id: u32) {}

    #[test]
    fn claim_reads_and_complete_echoes() {
        let mut f = Fixture::new();
        let claim_offset = CONTEXT_BASE + CONTEXT_STRIDE + CLAIM_OFFSET;
        f.set_word(claim_offset, 42);

        let mut plic = f.plic(95);
        plic.set_handler(42, noop_handler).unwrap();
        let (id, handler) = plic.claim_source().unwrap();
        assert_eq!(id, 42);
        assert!(handler.is_some());

        plic.complete(id);
        drop(plic);
        assert_eq!(f.word(claim_offset), 42);
    }

    #[test]
    fn pending_bit_lookup() {
        let mut f = Fixture::new();
        f.set_word(PENDING_BASE + 4, 1 << 1); // source 33
        let plic = f.plic(95);
        assert!(plic.pending(33));
        assert!(!plic.pending(32));
    }
}
