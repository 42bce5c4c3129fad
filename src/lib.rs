//! Backend of the finch teaching-language compiler.
//!
//! The backend receives one subroutine at a time as a flat stream of
//! [`PseudoInstr`] over virtual registers, partitions it into a control-flow
//! graph, runs liveness analysis, and rewrites it into native instructions
//! with one of two register allocation strategies:
//!
//! - [`BruteRegAlloc`], a greedy per-block allocator that spills a random
//!   victim under pressure and therefore always succeeds;
//! - [`ColorRegAlloc`], a per-block graph-coloring allocator that refuses
//!   blocks needing more colors than there are registers.
//!
//! [`PseudoInstr`]: instr::PseudoInstr
//! [`BruteRegAlloc`]: regalloc::BruteRegAlloc
//! [`ColorRegAlloc`]: regalloc::ColorRegAlloc

pub mod dataflow;
pub mod error;
pub mod frame;
pub mod instr;
pub mod mips;
pub mod regalloc;

pub use error::{Error, Result};

use crate::dataflow::{liveness, Cfg, CfgBuilder};
use crate::frame::CallingConv;
use crate::instr::{NativeInstr, PseudoInstr, SubroutineInfo};
use crate::regalloc::RegAlloc;

/// Run the whole backend pipeline for one subroutine: build the CFG, analyze
/// liveness, and allocate registers.
pub fn lower<C, A>(
    instrs: Vec<PseudoInstr>,
    conv: &mut C,
    info: SubroutineInfo,
    allocator: &mut A,
) -> Result<(Vec<NativeInstr>, SubroutineInfo)>
where
    C: CallingConv,
    A: RegAlloc,
{
    let cfg = analyze(instrs)?;
    allocator.alloc(&cfg, conv, info)
}

/// The analysis half of the pipeline, exposed separately so a caller can
/// inspect or dump the CFG before committing to an allocator.
pub fn analyze(instrs: Vec<PseudoInstr>) -> Result<Cfg> {
    let mut cfg = CfgBuilder::build_from(instrs)?;
    liveness::analyze(&mut cfg);
    Ok(cfg)
}
