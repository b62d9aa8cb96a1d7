/// Maximum number of threads, including the sentinel.
pub const NTHREAD: usize = 8192;
/// Kernel thread stacks are one buddy block of this order (16 KiB).
pub const STACK_ORDER: usize = 2;
/// Size of the dedicated trap stack.
pub const TRAP_STACK_SIZE: usize = 16 * 1024;
/// Console backend table capacity.
pub const NCONSOLE: usize = 4;
/// Interrupt sources the kernel keeps handler slots for.
pub const NIRQ: usize = 96;
