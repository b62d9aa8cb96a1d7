//! Formatted console output.
//!
//! A message is formatted straight into the selected backend while the
//! backend-table lock is held, so whole messages never interleave. A
//! panicking hart flips [`IN_PANIC`] and switches to the unlocked table
//! view, since it may be dying with the lock in hand.

use core::{
    fmt::{self, Write as _},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::console::{self, BackendTable};

static IN_PANIC: AtomicBool = AtomicBool::new(false);

struct TableWriter<'a> {
    table: &'a BackendTable,
}

impl fmt::Write for TableWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.table.write(s.as_bytes());
        Ok(())
    }
}

pub fn _print(args: fmt::Arguments) {
    if IN_PANIC.load(Ordering::Relaxed) {
        let table = unsafe { console::table_unlocked() };
        let _ = TableWriter { table }.write_fmt(args);
    } else {
        let guard = console::table();
        let _ = TableWriter { table: &*guard }.write_fmt(args);
    }
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::print::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {
        $crate::print!("{}\n", format_args!($($arg)*))
    };
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use crate::arch::{self, Arch, Port as _};

    IN_PANIC.store(true, Ordering::Relaxed);
    crate::println!("KERNEL PANIC: {info}");

    crate::println!("call trace:");
    let mut depth = 0;
    arch::walk_stack(&mut |return_address| {
        crate::println!("  #{depth} {return_address:#x}");
        depth += 1;
    });

    let arch = Arch::new();
    loop {
        arch.disable_interrupts();
        arch.wait_for_interrupt();
    }
}
