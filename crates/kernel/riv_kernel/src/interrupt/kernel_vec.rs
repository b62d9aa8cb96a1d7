use core::{arch::naked_asm, mem::offset_of};

use crate::{arch::Registers, interrupt::trap, param::TRAP_STACK_SIZE};

#[repr(C, align(16))]
struct TrapStack([u8; TRAP_STACK_SIZE]);

/// Dedicated stack the dispatcher runs on, whatever the interrupted
/// thread's sp was.
static mut TRAP_STACK: TrapStack = TrapStack([0; TRAP_STACK_SIZE]);

/// Supervisor trap vector (direct mode).
///
/// Saves all GPRs and the interrupted pc into the register frame
/// `sscratch` points at, calls [`trap::trap_kernel`] on the trap stack,
/// then restores from the frame `sscratch` holds on the way out. The
/// scheduler switches threads by retargeting `sscratch` between those two
/// points.
#[unsafe(naked)]
pub extern "C" fn kernel_vec() {
    naked_asm!(
        // t6 <- frame, sscratch <- interrupted t6
        "csrrw t6, sscratch, t6",

        "sd ra, {r_ra}(t6)",
        "sd sp, {r_sp}(t6)",
        "sd gp, {r_gp}(t6)",
        "sd tp, {r_tp}(t6)",
        "sd t0, {r_t0}(t6)",
        "sd t1, {r_t1}(t6)",
        "sd t2, {r_t2}(t6)",
        "sd s0, {r_s0}(t6)",
        "sd s1, {r_s1}(t6)",
        "sd a0, {r_a0}(t6)",
        "sd a1, {r_a1}(t6)",
        "sd a2, {r_a2}(t6)",
        "sd a3, {r_a3}(t6)",
        "sd a4, {r_a4}(t6)",
        "sd a5, {r_a5}(t6)",
        "sd a6, {r_a6}(t6)",
        "sd a7, {r_a7}(t6)",
        "sd s2, {r_s2}(t6)",
        "sd s3, {r_s3}(t6)",
        "sd s4, {r_s4}(t6)",
        "sd s5, {r_s5}(t6)",
        "sd s6, {r_s6}(t6)",
        "sd s7, {r_s7}(t6)",
        "sd s8, {r_s8}(t6)",
        "sd s9, {r_s9}(t6)",
        "sd s10, {r_s10}(t6)",
        "sd s11, {r_s11}(t6)",
        "sd t3, {r_t3}(t6)",
        "sd t4, {r_t4}(t6)",
        "sd t5, {r_t5}(t6)",

        // the interrupted t6 is parked in sscratch; move it into the
        // frame and point sscratch back at the frame
        "csrr t5, sscratch",
        "sd t5, {r_t6}(t6)",
        "csrw sscratch, t6",

        // interrupted pc
        "csrr t5, sepc",
        "sd t5, {r_pc}(t6)",

        // dispatch on the dedicated trap stack
        "la sp, {trap_stack}",
        "li t0, {trap_stack_size}",
        "add sp, sp, t0",
        "call {trap_kernel}",

        // restore from whatever frame sscratch now holds
        "csrr t6, sscratch",
        "ld t5, {r_pc}(t6)",
        "csrw sepc, t5",

        "ld ra, {r_ra}(t6)",
        "ld sp, {r_sp}(t6)",
        "ld gp, {r_gp}(t6)",
        "ld tp, {r_tp}(t6)",
        "ld t0, {r_t0}(t6)",
        "ld t1, {r_t1}(t6)",
        "ld t2, {r_t2}(t6)",
        "ld s0, {r_s0}(t6)",
        "ld s1, {r_s1}(t6)",
        "ld a0, {r_a0}(t6)",
        "ld a1, {r_a1}(t6)",
        "ld a2, {r_a2}(t6)",
        "ld a3, {r_a3}(t6)",
        "ld a4, {r_a4}(t6)",
        "ld a5, {r_a5}(t6)",
        "ld a6, {r_a6}(t6)",
        "ld a7, {r_a7}(t6)",
        "ld s2, {r_s2}(t6)",
        "ld s3, {r_s3}(t6)",
        "ld s4, {r_s4}(t6)",
        "ld s5, {r_s5}(t6)",
        "ld s6, {r_s6}(t6)",
        "ld s7, {r_s7}(t6)",
        "ld s8, {r_s8}(t6)",
        "ld s9, {r_s9}(t6)",
        "ld s10, {r_s10}(t6)",
        "ld s11, {r_s11}(t6)",
        "ld t3, {r_t3}(t6)",
        "ld t4, {r_t4}(t6)",
        "ld t5, {r_t5}(t6)",
        "ld t6, {r_t6}(t6)",

        "sret",
        r_pc = const offset_of!(Registers, pc),
        r_ra = const offset_of!(Registers, ra),
        r_sp = const offset_of!(Registers, sp),
        r_gp = const offset_of!(Registers, gp),
        r_tp = const offset_of!(Registers, tp),
        r_t0 = const offset_of!(Registers, t0),
        r_t1 = const offset_of!(Registers, t1),
        r_t2 = const offset_of!(Registers, t2),
        r_s0 = const offset_of!(Registers, s0),
        r_s1 = const offset_of!(Registers, s1),
        r_a0 = const offset_of!(Registers, a0),
        r_a1 = const offset_of!(Registers, a1),
        r_a2 = const offset_of!(Registers, a2),
        r_a3 = const offset_of!(Registers, a3),
        r_a4 = const offset_of!(Registers, a4),
        r_a5 = const offset_of!(Registers, a5),
        r_a6 = const offset_of!(Registers, a6),
        r_a7 = const offset_of!(Registers, a7),
        r_s2 = const offset_of!(Registers, s2),
        r_s3 = const offset_of!(Registers, s3),
        r_s4 = const offset_of!(Registers, s4),
        r_s5 = const offset_of!(Registers, s5),
        r_s6 = const offset_of!(Registers, s6),
        r_s7 = const offset_of!(Registers, s7),
        r_s8 = const offset_of!(Registers, s8),
        r_s9 = const offset_of!(Registers, s9),
        r_s10 = const offset_of!(Registers, s10),
        r_s11 = const offset_of!(Registers, s11),
        r_t3 = const offset_of!(Registers, t3),
        r_t4 = const offset_of!(Registers, t4),
        r_t5 = const offset_of!(Registers, t5),
        r_t6 = const offset_of!(Registers, t6),
        trap_stack = sym TRAP_STACK,
        trap_stack_size = const TRAP_STACK_SIZE,
        trap_kernel = sym trap::trap_kernel,
    )
}
