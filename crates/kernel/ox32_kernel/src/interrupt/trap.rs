use core::{arch::global_asm, mem::offset_of};

use ox32_syscall::SyscallCode;
use process::TrapFrame;
use riscv::{
    interrupt::{
        Trap,
        supervisor::{Exception, Interrupt},
    },
    register::{
        scause, sepc, stval,
        stvec::{self, Stvec, TrapMode},
    },
};

use crate::syscall;

// Traps from user mode come here. `sscratch` holds the top of the running
// process's kernel stack; the user registers are saved there as a
// `TrapFrame`, `handle_trap()` is called, and the registers are restored.
global_asm!(
    r#"
.section .text
.balign 4
.global kernel_entry
kernel_entry:
    # switch to the kernel stack, keeping the user sp in sscratch.
    csrrw sp, sscratch, sp
    addi sp, sp, -{tf_size}

    sw ra, {tf_ra}(sp)
    sw gp, {tf_gp}(sp)
    sw tp, {tf_tp}(sp)
    sw t0, {tf_t0}(sp)
    sw t1, {tf_t1}(sp)
    sw t2, {tf_t2}(sp)
    sw t3, {tf_t3}(sp)
    sw t4, {tf_t4}(sp)
    sw t5, {tf_t5}(sp)
    sw t6, {tf_t6}(sp)
    sw a0, {tf_a0}(sp)
    sw a1, {tf_a1}(sp)
    sw a2, {tf_a2}(sp)
    sw a3, {tf_a3}(sp)
    sw a4, {tf_a4}(sp)
    sw a5, {tf_a5}(sp)
    sw a6, {tf_a6}(sp)
    sw a7, {tf_a7}(sp)
    sw s0, {tf_s0}(sp)
    sw s1, {tf_s1}(sp)
    sw s2, {tf_s2}(sp)
    sw s3, {tf_s3}(sp)
    sw s4, {tf_s4}(sp)
    sw s5, {tf_s5}(sp)
    sw s6, {tf_s6}(sp)
    sw s7, {tf_s7}(sp)
    sw s8, {tf_s8}(sp)
    sw s9, {tf_s9}(sp)
    sw s10, {tf_s10}(sp)
    sw s11, {tf_s11}(sp)

    # save the user sp and reset sscratch to the kernel stack top.
    csrr a0, sscratch
    sw a0, {tf_sp}(sp)
    addi a0, sp, {tf_size}
    csrw sscratch, a0

    mv a0, sp
    call {handle_trap}

    lw ra, {tf_ra}(sp)
    lw gp, {tf_gp}(sp)
    lw tp, {tf_tp}(sp)
    lw t0, {tf_t0}(sp)
    lw t1, {tf_t1}(sp)
    lw t2, {tf_t2}(sp)
    lw t3, {tf_t3}(sp)
    lw t4, {tf_t4}(sp)
    lw t5, {tf_t5}(sp)
    lw t6, {tf_t6}(sp)
    lw a0, {tf_a0}(sp)
    lw a1, {tf_a1}(sp)
    lw a2, {tf_a2}(sp)
    lw a3, {tf_a3}(sp)
    lw a4, {tf_a4}(sp)
    lw a5, {tf_a5}(sp)
    lw a6, {tf_a6}(sp)
    lw a7, {tf_a7}(sp)
    lw s0, {tf_s0}(sp)
    lw s1, {tf_s1}(sp)
    lw s2, {tf_s2}(sp)
    lw s3, {tf_s3}(sp)
    lw s4, {tf_s4}(sp)
    lw s5, {tf_s5}(sp)
    lw s6, {tf_s6}(sp)
    lw s7, {tf_s7}(sp)
    lw s8, {tf_s8}(sp)
    lw s9, {tf_s9}(sp)
    lw s10, {tf_s10}(sp)
    lw s11, {tf_s11}(sp)
    lw sp, {tf_sp}(sp)
    sret
"#,
    tf_size = const size_of::<TrapFrame>(),
    tf_ra = const offset_of!(TrapFrame, ra),
    tf_gp = const offset_of!(TrapFrame, gp),
    tf_tp = const offset_of!(TrapFrame, tp),
    tf_t0 = const offset_of!(TrapFrame, t0),
    tf_t1 = const offset_of!(TrapFrame, t1),
    tf_t2 = const offset_of!(TrapFrame, t2),
    tf_t3 = const offset_of!(TrapFrame, t3),
    tf_t4 = const offset_of!(TrapFrame, t4),
    tf_t5 = const offset_of!(TrapFrame, t5),
    tf_t6 = const offset_of!(TrapFrame, t6),
    tf_a0 = const offset_of!(TrapFrame, a0),
    tf_a1 = const offset_of!(TrapFrame, a1),
    tf_a2 = const offset_of!(TrapFrame, a2),
    tf_a3 = const offset_of!(TrapFrame, a3),
    tf_a4 = const offset_of!(TrapFrame, a4),
    tf_a5 = const offset_of!(TrapFrame, a5),
    tf_a6 = const offset_of!(TrapFrame, a6),
    tf_a7 = const offset_of!(TrapFrame, a7),
    tf_s0 = const offset_of!(TrapFrame, s0),
    tf_s1 = const offset_of!(TrapFrame, s1),
    tf_s2 = const offset_of!(TrapFrame, s2),
    tf_s3 = const offset_of!(TrapFrame, s3),
    tf_s4 = const offset_of!(TrapFrame, s4),
    tf_s5 = const offset_of!(TrapFrame, s5),
    tf_s6 = const offset_of!(TrapFrame, s6),
    tf_s7 = const offset_of!(TrapFrame, s7),
    tf_s8 = const offset_of!(TrapFrame, s8),
    tf_s9 = const offset_of!(TrapFrame, s9),
    tf_s10 = const offset_of!(TrapFrame, s10),
    tf_s11 = const offset_of!(TrapFrame, s11),
    tf_sp = const offset_of!(TrapFrame, sp),
    handle_trap = sym handle_trap,
);

unsafe extern "C" {
    fn kernel_entry();
}

/// Installs the trap vector.
pub fn init() {
    let mut stvec = Stvec::from_bits(0);
    stvec.set_address(kernel_entry as usize);
    stvec.set_trap_mode(TrapMode::Direct);
    unsafe {
        stvec::write(stvec);
    }
}

/// Handles a trap from user space.
///
/// Only system calls are expected; anything else halts the machine.
extern "C" fn handle_trap(tf: &mut TrapFrame) {
    let scause = scause::read();
    let stval = stval::read();
    // another process may trap while this one is switched out inside a
    // system call, so keep the return address here.
    let sepc = sepc::read();

    let cause: Result<Trap<Interrupt, Exception>, _> = scause.cause().try_into();
    match cause {
        Ok(Trap::Exception(Exception::UserEnvCall)) => {
            let Some(code) = SyscallCode::from_repr(tf.a3) else {
                panic!("unexpected syscall a3={:#x}", tf.a3);
            };
            syscall::dispatch(code, tf);
        }
        _ => panic!(
            "unexpected trap scause={:#x}, stval={stval:#x}, sepc={sepc:#x}",
            scause.bits()
        ),
    }

    // return to the instruction after the ecall.
    unsafe {
        sepc::write(sepc + 4);
    }
}
