//! riscv64 implementation of the architecture port.
//!
//! Single hart, supervisor mode under SBI firmware. The trap vector lives
//! in [`crate::interrupt::kernel_vec`]; this module owns the CSR surface,
//! the SBI timer call, and the boot page table (identity map for the boot
//! window plus the higher-half direct map).

use core::{
    arch::{asm, global_asm},
    ops::Range,
    ptr::{self, NonNull},
};

use riscv::register::{
    sscratch, sstatus,
    stvec::{self, Stvec, TrapMode},
};

use super::{Port, Registers};
use crate::{interrupt::kernel_vec, memory::HHDM_BASE};

pub struct RiscV64;

impl RiscV64 {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for RiscV64 {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for RiscV64 {
    fn interrupts_enabled(&self) -> bool {
        sstatus::read().sie()
    }

    fn enable_interrupts(&self) {
        unsafe {
            sstatus::set_sie();
        }
    }

    fn disable_interrupts(&self) {
        unsafe {
            sstatus::clear_sie();
        }
    }

    fn install_trap_vector(&self) {
        let address = kernel_vec::kernel_vec as usize;
        // direct mode borrows the low two bits
        assert_eq!(address % 4, 0, "trap vector must be 4-byte aligned");
        let mut stvec = Stvec::from_bits(0);
        stvec.set_address(address);
        stvec.set_trap_mode(TrapMode::Direct);
        unsafe {
            stvec::write(stvec);
        }
    }

    fn wait_for_interrupt(&self) {
        riscv::asm::wfi();
    }

    fn switch_to(&self, frame: NonNull<Registers>) {
        unsafe {
            sscratch::write(frame.addr().get());
        }
    }
}

/// The register frame `sscratch` currently points at.
///
/// # Panics
///
/// Panics if no thread frame has been installed yet.
#[must_use]
pub fn current_frame() -> NonNull<Registers> {
    NonNull::new(ptr::with_exposed_provenance_mut(sscratch::read()))
        .expect("sscratch holds no frame")
}

// ---------------------------------------------------------------------------
// stack walking

/// Standard frame record, relative to the frame pointer: the return
/// address one doubleword below it, the caller's frame pointer two.
const FRAME_RA_OFFSET: usize = 8;
const FRAME_FP_OFFSET: usize = 16;
/// Backstop for the panic path; real kernel stacks are nowhere this deep.
const MAX_STACK_FRAMES: usize = 64;

/// Walks the frame-record chain from the caller outwards, handing each
/// return address to `log`.
///
/// Built for the panic path, so it trusts nothing: the walk stops at a
/// null or misaligned frame pointer, and at a chain that fails to move
/// toward the stack base (frames of live callers always sit at higher
/// addresses on a downward-growing stack).
pub(crate) fn walk_stack(log: &mut dyn FnMut(usize)) {
    let mut fp: usize;
    unsafe {
        asm!("mv {}, fp", out(reg) fp);
    }

    for _ in 0..MAX_STACK_FRAMES {
        if fp == 0 || fp % 8 != 0 {
            break;
        }
        let (Some(ra_slot), Some(fp_slot)) = (
            fp.checked_sub(FRAME_RA_OFFSET),
            fp.checked_sub(FRAME_FP_OFFSET),
        ) else {
            break;
        };

        let ra = unsafe { *ptr::with_exposed_provenance::<usize>(ra_slot) };
        let caller_fp = unsafe { *ptr::with_exposed_provenance::<usize>(fp_slot) };
        if ra != 0 {
            log(ra);
        }
        if caller_fp <= fp {
            break;
        }
        fp = caller_fp;
    }
}

// ---------------------------------------------------------------------------
// timer (SBI TIME extension)

const SBI_EXT_TIME: usize = 0x5449_4D45;

/// Programs the next timer interrupt via SBI.
pub fn set_timer(when: u64) {
    unsafe {
        asm!(
            "ecall",
            in("a7") SBI_EXT_TIME,
            in("a6") 0,
            in("a0") when as usize,
            lateout("a0") _,
            lateout("a1") _,
        );
    }
}

/// Current value of the `time` CSR.
#[must_use]
pub fn read_time() -> u64 {
    let time: u64;
    unsafe {
        asm!("csrr {}, time", out(reg) time);
    }
    time
}

// ---------------------------------------------------------------------------
// boot page table

const PTE_V: u64 = 1 << 0;
const PTE_R: u64 = 1 << 1;
const PTE_W: u64 = 1 << 2;
const PTE_X: u64 = 1 << 3;
const PTE_G: u64 = 1 << 5;
const PTE_A: u64 = 1 << 6;
const PTE_D: u64 = 1 << 7;

const GIGAPAGE: usize = 1 << 30;
const SATP_MODE_SV39: u64 = 8 << 60;

#[repr(C, align(4096))]
struct RootPageTable([u64; 512]);

static mut ROOT_PAGE_TABLE: RootPageTable = RootPageTable([0; 512]);

const fn gigapage_pte(pa: usize) -> u64 {
    ((pa as u64 >> 12) << 10) | PTE_V | PTE_R | PTE_W | PTE_X | PTE_G | PTE_A | PTE_D
}

/// Builds and enables the boot address space: the low 4 GiB identity
/// mapped (kernel image, MMIO, the FDT), and the same window direct-mapped
/// at [`HHDM_BASE`]. Gigapages only; finer-grained policy is a non-goal.
pub fn init_memory() {
    let table = &raw mut ROOT_PAGE_TABLE;
    for giga in 0..4 {
        let pa = giga * GIGAPAGE;
        let identity = (pa >> 30) & 0x1FF;
        let hhdm = ((HHDM_BASE + pa) >> 30) & 0x1FF;
        unsafe {
            (*table).0[identity] = gigapage_pte(pa);
            (*table).0[hhdm] = gigapage_pte(pa);
        }
    }

    let ppn = (table as usize >> 12) as u64;
    unsafe {
        riscv::register::satp::write(riscv::register::satp::Satp::from_bits(
            (SATP_MODE_SV39 | ppn) as usize,
        ));
    }
    riscv::asm::sfence_vma_all();
}

// ---------------------------------------------------------------------------
// kernel image bounds (linker script symbols)

global_asm!(
    "
        .global _riv_kernel_base_addr
        _riv_kernel_base_addr: .dword _riv_kernel_base
        .global _riv_kernel_end_addr
        _riv_kernel_end_addr: .dword _riv_kernel_end
    "
);

unsafe extern "C" {
    #[link_name = "_riv_kernel_base_addr"]
    static KERNEL_BASE: usize;
    #[link_name = "_riv_kernel_end_addr"]
    static KERNEL_END: usize;
}

#[must_use]
pub fn kernel_image_range() -> Range<usize> {
    unsafe { KERNEL_BASE..KERNEL_END }
}
