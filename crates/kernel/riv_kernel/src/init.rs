//! Kernel bring-up.
//!
//! The out-of-tree boot stub lands here in supervisor mode with the hart
//! id and the firmware's FDT pointer (the SBI calling convention). Once
//! everything is up, this boot context becomes the sentinel thread and
//! parks in `wfi`.

use riv_fdt::DeviceTree;

use crate::{
    arch::{self, Arch, Port as _},
    interrupt, memory, module, println, thread,
};

/// Supervisor-mode entry point.
pub extern "C" fn kernel_main(hartid: usize, fdt_ptr: *const u8) -> ! {
    let arch_port = Arch::new();
    interrupt::disable();

    // identity + direct map first; everything after goes through the HHDM
    #[cfg(target_arch = "riscv64")]
    arch::riscv64::init_memory();

    let dt = match unsafe { DeviceTree::from_ptr(fdt_ptr) } {
        Ok(dt) => dt,
        Err(err) => panic!("device tree rejected: {err}"),
    };

    println!();
    println!("riv kernel booting on hart {hartid}");

    let fdt_start = fdt_ptr as usize;
    let fdt_blob = fdt_start..fdt_start + dt.blob().len();
    if let Err(err) = memory::page::init(&dt, arch::kernel_image_range(), fdt_blob) {
        panic!("memory init failed: {err}");
    }

    arch_port.install_trap_vector();

    // interrupt controllers bind in the early pass, so by the time any
    // other driver initializes the facade is live
    if let Err(err) = module::bind(&dt, module::MODULES) {
        panic!("module binding failed: {err}");
    }

    if let Err(err) = thread::init() {
        panic!("scheduler init failed: {err}");
    }
    match thread::spawn_kernel(kmain) {
        Ok(id) => println!("spawned kmain as thread {id}"),
        Err(err) => panic!("spawning kmain failed: {err}"),
    }

    interrupt::enable();

    // from here on this context is the sentinel: always live, always
    // runnable, halting between interrupts
    loop {
        arch_port.wait_for_interrupt();
    }
}

/// First kernel thread: report the post-boot state, then retire.
extern "C" fn kmain() -> ! {
    let (free, total) = memory::page::stats();
    println!("memory after boot: {free}/{total} pages free");
    println!("uptime: {} ticks", interrupt::timer::ticks());
    thread::exit()
}
