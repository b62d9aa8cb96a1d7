//! Supervisor trap dispatch.
//!
//! The naked vector in [`super::kernel_vec`] saves the interrupted
//! thread's registers into the frame `sscratch` points at, switches to the
//! dedicated trap stack, and calls [`trap_kernel`]. Dispatch itself is
//! portable: it works on the raw `scause`/`sepc`/`stval` values.

use strum::FromRepr;

use super::{plic, timer};
use crate::{println, thread};

/// High bit of `scause`: set for interrupts, clear for exceptions.
pub const CAUSE_INTERRUPT_FLAG: usize = 1 << (usize::BITS - 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(usize)]
pub enum InterruptCause {
    SupervisorSoftware = 1,
    SupervisorTimer = 5,
    SupervisorExternal = 9,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(usize)]
pub enum ExceptionCause {
    InstructionAddressMisaligned = 0,
    InstructionAccessFault = 1,
    IllegalInstruction = 2,
    Breakpoint = 3,
    LoadAddressMisaligned = 4,
    LoadAccessFault = 5,
    StoreAddressMisaligned = 6,
    StoreAccessFault = 7,
    EnvironmentCallFromUser = 8,
    EnvironmentCallFromSupervisor = 9,
    InstructionPageFault = 12,
    LoadPageFault = 13,
    StorePageFault = 15,
}

/// Raw trap CSR values captured at entry.
#[derive(Debug, Clone, Copy)]
pub struct TrapState {
    pub cause: usize,
    pub epc: usize,
    pub tval: usize,
}

/// Routes one trap. Returns `Some(pc)` when the interrupted thread must
/// resume at a different pc than the one it trapped at (the ecall path);
/// interrupt handling leaves the saved pc alone.
///
/// Unknown causes panic with the register dump the panic handler prints.
pub fn dispatch(state: &TrapState) -> Option<usize> {
    if state.cause & CAUSE_INTERRUPT_FLAG != 0 {
        let code = state.cause & !CAUSE_INTERRUPT_FLAG;
        match InterruptCause::from_repr(code) {
            Some(InterruptCause::SupervisorTimer) => {
                timer::handle_interrupt();
                thread::tick();
            }
            Some(InterruptCause::SupervisorExternal) => {
                plic::handle_external();
            }
            Some(InterruptCause::SupervisorSoftware) | None => {
                panic!(
                    "unexpected interrupt: cause={code} sepc={:#x} stval={:#x}",
                    state.epc, state.tval
                );
            }
        }
        None
    } else {
        match ExceptionCause::from_repr(state.cause) {
            Some(
                fault @ (ExceptionCause::InstructionPageFault
                | ExceptionCause::LoadPageFault
                | ExceptionCause::StorePageFault),
            ) => {
                panic!(
                    "{fault:?} at sepc={:#x}, fault address {:#x}",
                    state.epc, state.tval
                );
            }
            Some(ExceptionCause::EnvironmentCallFromUser) => {
                // reserved for the future syscall path; skip the ecall
                println!("ecall from user mode at {:#x} (no syscall layer)", state.epc);
                Some(state.epc + 4)
            }
            cause => {
                panic!(
                    "unexpected exception {cause:?}: scause={} sepc={:#x} stval={:#x}",
                    state.cause, state.epc, state.tval
                );
            }
        }
    }
}

/// Rust side of the supervisor trap vector.
#[cfg(target_arch = "riscv64")]
pub extern "C" fn trap_kernel() {
    use riscv::register::{scause, sepc, sstatus, stval};

    use crate::arch::riscv64;

    // the frame of the thread that trapped; a tick may retarget sscratch,
    // so grab it before dispatching
    let frame = riscv64::current_frame();

    let state = TrapState {
        cause: scause::read().bits(),
        epc: sepc::read(),
        tval: stval::read(),
    };

    if let Some(pc) = dispatch(&state) {
        unsafe {
            (*frame.as_ptr()).pc = pc;
        }
    }

    // sret must land in supervisor mode with interrupts re-enabled
    unsafe {
        sstatus::set_spp(sstatus::SPP::Supervisor);
        sstatus::set_spie();
    }
}
