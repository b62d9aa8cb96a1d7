use buddy_alloc::AllocError;
use riv_fdt::DtError;

/// Kernel-wide error type.
///
/// Parse and format errors are fatal at boot; resource errors surface to
/// the caller; hardware errors return to driver code (the boot path treats
/// them as fatal too).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("device tree: {0}")]
    DeviceTree(#[from] DtError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("no free thread id")]
    NoAvailableThreads,
    #[error("no interrupt controller registered")]
    NoController,
    #[error("interrupt controller already registered")]
    AlreadyRegistered,
    #[error("invalid interrupt id {0}")]
    InvalidInterruptId(u32),
    #[error("invalid interrupt priority {0}")]
    InvalidPriority(u32),
    #[error("invalid interrupt context {0}")]
    InvalidContext(usize),
    #[error("invalid interrupt threshold {0}")]
    InvalidThreshold(u32),
    #[error("interrupt controller internal error")]
    ControllerInternalError,
    #[error("missing device tree property {0}")]
    MissingProperty(&'static str),
    #[error("device not found")]
    DeviceNotFound,
    #[error("console backend table full")]
    TooManyConsoleBackends,
}
