pub use self::{
    boot_cell::BootCell,
    spin_lock::{SpinLock, SpinLockGuard},
};

mod boot_cell;
mod spin_lock;
