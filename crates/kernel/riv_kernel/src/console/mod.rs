//! Kernel console contract.
//!
//! Actual console hardware (the UART) lives outside this tree; drivers
//! register a backend here and the highest-priority one drains every
//! write. Until a backend registers, output is dropped.

use arrayvec::ArrayVec;

use crate::{error::KernelError, param::NCONSOLE, sync::SpinLock};

pub mod print;
pub mod uart;

/// One console sink.
#[derive(Clone, Copy)]
pub struct Backend {
    pub name: &'static str,
    pub priority: u8,
    pub write_bytes: fn(&[u8]),
}

pub(crate) struct BackendTable {
    backends: ArrayVec<Backend, NCONSOLE>,
}

impl BackendTable {
    pub(crate) const fn new() -> Self {
        Self {
            backends: ArrayVec::new_const(),
        }
    }

    pub(crate) fn add(&mut self, backend: Backend) -> Result<(), KernelError> {
        self.backends
            .try_push(backend)
            .map_err(|_| KernelError::TooManyConsoleBackends)
    }

    /// The backend every write drains through: highest priority, earliest
    /// registration breaking ties.
    pub(crate) fn best(&self) -> Option<&Backend> {
        self.backends.iter().reduce(|best, candidate| {
            if candidate.priority > best.priority {
                candidate
            } else {
                best
            }
        })
    }

    pub(crate) fn write(&self, bytes: &[u8]) {
        if let Some(backend) = self.best() {
            (backend.write_bytes)(bytes);
        }
    }
}

static CONSOLE: SpinLock<BackendTable> = SpinLock::new(BackendTable::new());

/// Registers a console backend.
pub fn add_backend(backend: Backend) -> Result<(), KernelError> {
    CONSOLE.lock().add(backend)
}

/// Locks the backend table; print holds this across a whole message so
/// output never interleaves.
pub(crate) fn table() -> crate::sync::SpinLockGuard<'static, BackendTable> {
    CONSOLE.lock()
}

/// Panic-path view of the table, no lock taken: the panicking hart may
/// already hold the lock mid-print, and nothing will release it again.
///
/// # Safety
///
/// Only callable once the hart is committed to dying; the table is never
/// mutated after boot, so the unlocked read stays consistent.
pub(crate) unsafe fn table_unlocked() -> &'static BackendTable {
    unsafe { &*CONSOLE.raw_value() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_a(_bytes: &[u8]) {}
    fn sink_b(_bytes: &[u8]) {}

    #[test]
    fn highest_priority_backend_wins() {
        let mut table = BackendTable::new();
        assert!(table.best().is_none());

        table
            .add(Backend {
                name: "early",
                priority: 1,
                write_bytes: sink_a,
            })
            .unwrap();
        table
            .add(Backend {
                name: "uart",
                priority: 10,
                write_bytes: sink_b,
            })
            .unwrap();

        assert_eq!(table.best().unwrap().name, "uart");
    }

    #[test]
    fn earliest_backend_wins_ties() {
        let mut table = BackendTable::new();
        for name in ["first", "second"] {
            table
                .add(Backend {
                    name,
                    priority: 5,
                    write_bytes: sink_a,
                })
                .unwrap();
        }
        assert_eq!(table.best().unwrap().name, "first");
    }

    #[test]
    fn table_capacity_is_bounded() {
        let mut table = BackendTable::new();
        for _ in 0..NCONSOLE {
            table
                .add(Backend {
                    name: "sink",
                    priority: 0,
                    write_bytes: sink_a,
                })
                .unwrap();
        }
        assert_eq!(
            table.add(Backend {
                name: "overflow",
                priority: 0,
                write_bytes: sink_a,
            }),
            Err(KernelError::TooManyConsoleBackends)
        );
    }
}
