use core::{arch::naked_asm, mem::offset_of};

use ox32_kernel_params::USER_BASE;
use page_table::PageTable;
use process::{Context, Platform};
use riscv::{
    asm,
    register::{
        satp::{self, Satp},
        sscratch,
    },
};

/// `sstatus.SPIE`: enable interrupts after `sret`.
const SSTATUS_SPIE: usize = 1 << 5;

/// The machine half of a context switch.
pub struct RiscvPlatform;

impl Platform for RiscvPlatform {
    unsafe fn activate_address_space(&self, table: PageTable) {
        // wait for any previous writes to the page table memory to finish.
        asm::sfence_vma_all();

        unsafe {
            satp::write(Satp::from_bits(table.satp()));
        }

        // flush stale entries from the TLB.
        asm::sfence_vma_all();
    }

    unsafe fn set_trap_stack(&self, top: usize) {
        unsafe {
            sscratch::write(top);
        }
    }

    unsafe fn switch_context(&self, prev_sp: *mut usize, next_sp: *const usize) {
        unsafe { switch_context(prev_sp, next_sp) }
    }
}

/// Pushes the callee-saved registers as a [`Context`], stores `sp` to
/// `*prev_sp`, loads `sp` from `*next_sp` and pops the [`Context`] there.
#[unsafe(naked)]
unsafe extern "C" fn switch_context(prev_sp: *mut usize, next_sp: *const usize) {
    naked_asm!(
        "addi sp, sp, -{size}",
        "sw ra, {c_ra}(sp)",
        "sw s0, {c_s0}(sp)",
        "sw s1, {c_s1}(sp)",
        "sw s2, {c_s2}(sp)",
        "sw s3, {c_s3}(sp)",
        "sw s4, {c_s4}(sp)",
        "sw s5, {c_s5}(sp)",
        "sw s6, {c_s6}(sp)",
        "sw s7, {c_s7}(sp)",
        "sw s8, {c_s8}(sp)",
        "sw s9, {c_s9}(sp)",
        "sw s10, {c_s10}(sp)",
        "sw s11, {c_s11}(sp)",
        "sw sp, (a0)",
        "lw sp, (a1)",
        "lw ra, {c_ra}(sp)",
        "lw s0, {c_s0}(sp)",
        "lw s1, {c_s1}(sp)",
        "lw s2, {c_s2}(sp)",
        "lw s3, {c_s3}(sp)",
        "lw s4, {c_s4}(sp)",
        "lw s5, {c_s5}(sp)",
        "lw s6, {c_s6}(sp)",
        "lw s7, {c_s7}(sp)",
        "lw s8, {c_s8}(sp)",
        "lw s9, {c_s9}(sp)",
        "lw s10, {c_s10}(sp)",
        "lw s11, {c_s11}(sp)",
        "addi sp, sp, {size}",
        "ret",
        size = const size_of::<Context>(),
        c_ra = const offset_of!(Context, ra),
        c_s0 = const offset_of!(Context, s),
        c_s1 = const offset_of!(Context, s) + size_of::<usize>(),
        c_s2 = const offset_of!(Context, s) + 2 * size_of::<usize>(),
        c_s3 = const offset_of!(Context, s) + 3 * size_of::<usize>(),
        c_s4 = const offset_of!(Context, s) + 4 * size_of::<usize>(),
        c_s5 = const offset_of!(Context, s) + 5 * size_of::<usize>(),
        c_s6 = const offset_of!(Context, s) + 6 * size_of::<usize>(),
        c_s7 = const offset_of!(Context, s) + 7 * size_of::<usize>(),
        c_s8 = const offset_of!(Context, s) + 8 * size_of::<usize>(),
        c_s9 = const offset_of!(Context, s) + 9 * size_of::<usize>(),
        c_s10 = const offset_of!(Context, s) + 10 * size_of::<usize>(),
        c_s11 = const offset_of!(Context, s) + 11 * size_of::<usize>(),
    )
}

/// First code run by a new user process, "returned" to by the first
/// switch into it.
///
/// Enters user mode at the start of the image.
#[unsafe(naked)]
pub extern "C" fn user_entry() -> ! {
    naked_asm!(
        "li t0, {user_base}",
        "csrw sepc, t0",
        "li t0, {spie}",
        "csrw sstatus, t0",
        "sret",
        user_base = const USER_BASE,
        spie = const SSTATUS_SPIE,
    )
}
