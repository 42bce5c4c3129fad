//! MIPS register bank used by the finch backend.
//!
//! Only identities live here; occupancy state is owned by the allocators.
//! `$fp` is reserved for frame addressing and is never allocatable.

use once_cell::sync::Lazy;

use crate::instr::Reg;

pub const ZERO: Reg = Reg::new(0, "$zero");
pub const V0: Reg = Reg::new(2, "$v0");
// $v1 is a second return-value register by convention, but finch uses it as
// an additional temporary.
pub const V1: Reg = Reg::new(3, "$v1");
pub const A0: Reg = Reg::new(4, "$a0");
pub const A1: Reg = Reg::new(5, "$a1");
pub const A2: Reg = Reg::new(6, "$a2");
pub const A3: Reg = Reg::new(7, "$a3");
pub const T0: Reg = Reg::new(8, "$t0");
pub const T1: Reg = Reg::new(9, "$t1");
pub const T2: Reg = Reg::new(10, "$t2");
pub const T3: Reg = Reg::new(11, "$t3");
pub const T4: Reg = Reg::new(12, "$t4");
pub const T5: Reg = Reg::new(13, "$t5");
pub const T6: Reg = Reg::new(14, "$t6");
pub const T7: Reg = Reg::new(15, "$t7");
pub const S0: Reg = Reg::new(16, "$s0");
pub const S1: Reg = Reg::new(17, "$s1");
pub const S2: Reg = Reg::new(18, "$s2");
pub const S3: Reg = Reg::new(19, "$s3");
pub const S4: Reg = Reg::new(20, "$s4");
pub const S5: Reg = Reg::new(21, "$s5");
pub const S6: Reg = Reg::new(22, "$s6");
pub const S7: Reg = Reg::new(23, "$s7");
pub const T8: Reg = Reg::new(24, "$t8");
pub const T9: Reg = Reg::new(25, "$t9");
pub const SP: Reg = Reg::new(29, "$sp");
pub const FP: Reg = Reg::new(30, "$fp");
pub const RA: Reg = Reg::new(31, "$ra");

pub const CALLER_SAVED: [Reg; 11] = [T0, T1, T2, T3, T4, T5, T6, T7, T8, T9, V1];

pub const CALLEE_SAVED: [Reg; 8] = [S0, S1, S2, S3, S4, S5, S6, S7];

pub static ALLOCATABLE: Lazy<Vec<Reg>> = Lazy::new(|| {
    CALLER_SAVED
        .iter()
        .chain(CALLEE_SAVED.iter())
        .copied()
        .collect()
});
