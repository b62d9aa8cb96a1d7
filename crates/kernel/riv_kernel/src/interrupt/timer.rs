//! Timer tick plumbing.
//!
//! The timer device itself is firmware territory (SBI `set_timer`); the
//! kernel only counts ticks and rearms the next one. Tick length derives
//! from the device tree's `timebase-frequency`.

use crate::sync::{BootCell, SpinLock};

pub const TICKS_PER_SEC: u64 = 10;

pub static TICKS: SpinLock<u64> = SpinLock::new(0);

static CLOCKS_PER_TICK: BootCell<u64> = BootCell::new();

/// Arms the first tick. `timebase_frequency` is the `time` CSR rate from
/// the device tree.
pub fn init(timebase_frequency: u64) {
    CLOCKS_PER_TICK.set(timebase_frequency / TICKS_PER_SEC);
    rearm();
}

/// Seconds-of-uptime counter, in ticks.
#[must_use]
pub fn ticks() -> u64 {
    *TICKS.lock()
}

pub(super) fn handle_interrupt() {
    let mut ticks = TICKS.lock();
    *ticks += 1;
    drop(ticks);

    rearm();
}

fn rearm() {
    #[cfg(target_arch = "riscv64")]
    {
        use crate::arch::riscv64;
        riscv64::set_timer(riscv64::read_time() + *CLOCKS_PER_TICK.get());
    }
}
