//! Interrupt enable control and the external-interrupt-controller facade.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::{arch::{Arch, Port as _}, error::KernelError, sync::SpinLock};

#[cfg(target_arch = "riscv64")]
pub mod kernel_vec;
pub mod plic;
pub mod timer;
pub mod trap;

/// Enables supervisor interrupts.
pub fn enable() {
    Arch::new().enable_interrupts();
}

/// Disables supervisor interrupts.
pub fn disable() {
    Arch::new().disable_interrupts();
}

/// Returns `true` if supervisor interrupts are enabled.
#[must_use]
pub fn is_enabled() -> bool {
    Arch::new().interrupts_enabled()
}

static NOFF: AtomicU32 = AtomicU32::new(0);
static INTENA: AtomicBool = AtomicBool::new(false);

/// Saves the interrupt enable state and disables interrupts. Calls nest;
/// the state saved by the outermost call is restored when the matching
/// [`pop_disabled`] runs.
pub fn push_disabled() {
    let was_enabled = is_enabled();
    disable();
    if NOFF.fetch_add(1, Ordering::Relaxed) == 0 {
        INTENA.store(was_enabled, Ordering::Relaxed);
    }
}

/// Undoes one [`push_disabled`].
///
/// # Safety
///
/// Must pair with a prior `push_disabled` on this hart.
pub unsafe fn pop_disabled() {
    let depth = NOFF.fetch_sub(1, Ordering::Relaxed);
    debug_assert!(depth > 0, "unbalanced pop_disabled");
    if depth == 1 && INTENA.load(Ordering::Relaxed) {
        enable();
    }
}

/// An external interrupt controller, as a record of function pointers.
///
/// At most one controller is registered at a time; the driver that owns
/// the hardware fills the record in and hands it to [`register`].
#[derive(Clone, Copy)]
pub struct InterruptController {
    pub name: &'static str,
    pub enable: fn(u32) -> Result<(), KernelError>,
    pub disable: fn(u32) -> Result<(), KernelError>,
    pub set_priority: fn(u32, u32) -> Result<(), KernelError>,
    pub get_priority: fn(u32) -> Result<u32, KernelError>,
    pub set_handler: fn(u32, fn(u32)) -> Result<(), KernelError>,
}

/// Holder of the single registered controller.
pub struct ControllerSlot {
    controller: SpinLock<Option<InterruptController>>,
}

impl ControllerSlot {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            controller: SpinLock::new(None),
        }
    }

    pub fn register(&self, controller: InterruptController) -> Result<(), KernelError> {
        let mut slot = self.controller.lock();
        if slot.is_some() {
            return Err(KernelError::AlreadyRegistered);
        }
        *slot = Some(controller);
        Ok(())
    }

    fn with<R>(
        &self,
        op: impl FnOnce(&InterruptController) -> Result<R, KernelError>,
    ) -> Result<R, KernelError> {
        let slot = self.controller.lock();
        let controller = slot.as_ref().ok_or(KernelError::NoController)?;
        op(controller)
    }

    pub fn enable_source(&self, id: u32) -> Result<(), KernelError> {
        self.with(|c| (c.enable)(id))
    }

    pub fn disable_source(&self, id: u32) -> Result<(), KernelError> {
        self.with(|c| (c.disable)(id))
    }

    pub fn set_source_priority(&self, id: u32, priority: u32) -> Result<(), KernelError> {
        self.with(|c| (c.set_priority)(id, priority))
    }

    pub fn get_source_priority(&self, id: u32) -> Result<u32, KernelError> {
        self.with(|c| (c.get_priority)(id))
    }

    pub fn set_source_handler(&self, id: u32, handler: fn(u32)) -> Result<(), KernelError> {
        self.with(|c| (c.set_handler)(id, handler))
    }
}

impl Default for ControllerSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// The kernel's controller slot. Drivers call through these wrappers.
pub static CONTROLLER: ControllerSlot = ControllerSlot::new();

pub fn register(controller: InterruptController) -> Result<(), KernelError> {
    CONTROLLER.register(controller)
}

pub fn enable_source(id: u32) -> Result<(), KernelError> {
    CONTROLLER.enable_source(id)
}

pub fn disable_source(id: u32) -> Result<(), KernelError> {
    CONTROLLER.disable_source(id)
}

pub fn set_source_priority(id: u32, priority: u32) -> Result<(), KernelError> {
    CONTROLLER.set_source_priority(id, priority)
}

pub fn get_source_priority(id: u32) -> Result<u32, KernelError> {
    CONTROLLER.get_source_priority(id)
}

pub fn set_source_handler(id: u32, handler: fn(u32)) -> Result<(), KernelError> {
    CONTROLLER.set_source_handler(id, handler)
}
