/// Callee-saved registers, as pushed onto a kernel stack by the context
/// switch.
///
/// The switch pushes `ra` at the lowest address, then `s0` through `s11`.
/// A new process starts with one of these pre-pushed so that the first
/// switch to it "returns" to `ra`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub ra: usize,
    pub s: [usize; 12],
}

const _: () = assert!(size_of::<Context>() == 13 * size_of::<usize>());

impl Context {
    #[must_use]
    pub const fn returning_to(ra: usize) -> Self {
        Self { ra, s: [0; 12] }
    }
}

/// All general-purpose registers except `zero`, as saved by the trap entry.
///
/// The field order is the push order of the trap vector; the two must be
/// kept in sync.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub ra: usize,
    pub gp: usize,
    pub tp: usize,
    pub t0: usize,
    pub t1: usize,
    pub t2: usize,
    pub t3: usize,
    pub t4: usize,
    pub t5: usize,
    pub t6: usize,
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub a3: usize,
    pub a4: usize,
    pub a5: usize,
    pub a6: usize,
    pub a7: usize,
    pub s0: usize,
    pub s1: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
    pub sp: usize,
}

impl TrapFrame {
    /// Number of saved registers.
    pub const REGS: usize = 31;
}

const _: () = assert!(size_of::<TrapFrame>() == TrapFrame::REGS * size_of::<usize>());
