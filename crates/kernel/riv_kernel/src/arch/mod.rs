//! Architecture port.
//!
//! Everything the portable kernel needs from the hardware goes through
//! [`Port`]: interrupt masking, trap vector installation, thread frame
//! setup, and the context switch. The riscv64 implementation talks CSRs;
//! host builds get an inert stub so the rest of the kernel unit-tests off
//! target.

use core::ptr::NonNull;

use dataview::Pod;

#[cfg(not(target_arch = "riscv64"))]
mod host;
#[cfg(target_arch = "riscv64")]
pub mod riscv64;

#[cfg(not(target_arch = "riscv64"))]
pub use self::host::Host as Arch;
#[cfg(target_arch = "riscv64")]
pub use self::riscv64::RiscV64 as Arch;

/// Fill pattern for registers a fresh thread never received; a stray read
/// of one shows up unmistakably in a panic dump.
pub const REGISTER_FILL: usize = 0xDEAD_BEEF_DEAD_BEEF_u64 as usize;

/// Saved register frame of a thread.
///
/// `sscratch` points at the current thread's frame; the trap vector saves
/// all GPRs plus the interrupted pc here and restores from whatever frame
/// `sscratch` holds on the way out, which is how a context switch takes
/// effect.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod)]
pub struct Registers {
    pub pc: usize,
    pub ra: usize,
    pub sp: usize,
    pub gp: usize,
    pub tp: usize,
    pub t0: usize,
    pub t1: usize,
    pub t2: usize,
    pub s0: usize,
    pub s1: usize,
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub a3: usize,
    pub a4: usize,
    pub a5: usize,
    pub a6: usize,
    pub a7: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
    pub t3: usize,
    pub t4: usize,
    pub t5: usize,
    pub t6: usize,
}

impl Registers {
    #[must_use]
    pub const fn zeroed() -> Self {
        // Pod guarantees all-zero bytes are a valid value.
        unsafe { core::mem::zeroed() }
    }

    fn filled() -> Self {
        let mut registers = Self::zeroed();
        let words = unsafe {
            core::slice::from_raw_parts_mut(
                (&raw mut registers).cast::<usize>(),
                size_of::<Self>() / size_of::<usize>(),
            )
        };
        words.fill(REGISTER_FILL);
        registers
    }
}

/// The architecture port.
pub trait Port {
    fn interrupts_enabled(&self) -> bool;

    fn enable_interrupts(&self);

    fn disable_interrupts(&self);

    /// Installs the supervisor trap vector (direct mode).
    fn install_trap_vector(&self);

    /// Parks the hart until the next interrupt.
    fn wait_for_interrupt(&self);

    /// Makes `frame` the register frame the next trap return restores.
    /// This is the context switch: the only observable side effect of
    /// picking the next thread.
    fn switch_to(&self, frame: NonNull<Registers>);

    /// Prepares a fresh thread frame: pc at the entry point, sp at the
    /// stack top, everything else the debug fill.
    fn setup_thread(
        &self,
        registers: &mut Registers,
        entry: extern "C" fn() -> !,
        stack_top: usize,
    ) {
        *registers = Registers {
            pc: entry as usize,
            sp: stack_top,
            ..Registers::filled()
        };
    }
}

/// The kernel image range, for keeping the allocator off the kernel's own
/// pages. Comes from linker symbols on target; empty on host builds.
#[must_use]
pub fn kernel_image_range() -> core::ops::Range<usize> {
    #[cfg(target_arch = "riscv64")]
    {
        riscv64::kernel_image_range()
    }
    #[cfg(not(target_arch = "riscv64"))]
    {
        0..0
    }
}

/// Feeds each return address on the current call stack to `log`,
/// innermost first. Yields nothing off target.
pub fn walk_stack(log: &mut dyn FnMut(usize)) {
    #[cfg(target_arch = "riscv64")]
    riscv64::walk_stack(log);
    #[cfg(not(target_arch = "riscv64"))]
    let _ = log;
}
