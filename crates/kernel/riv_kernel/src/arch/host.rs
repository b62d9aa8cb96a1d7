//! Inert port for host builds. Lets the portable kernel compile and
//! unit-test on a non-riscv toolchain; nothing here touches hardware.

use core::ptr::NonNull;

use super::{Port, Registers};

pub struct Host;

impl Host {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for Host {
    fn interrupts_enabled(&self) -> bool {
        false
    }

    fn enable_interrupts(&self) {}

    fn disable_interrupts(&self) {}

    fn install_trap_vector(&self) {}

    fn wait_for_interrupt(&self) {}

    fn switch_to(&self, _frame: NonNull<Registers>) {}
}
