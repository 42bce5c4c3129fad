//! Register allocation: the shared contract plus two strategies.
//!
//! Both allocators consume an analyzed [`Cfg`] and a [`CallingConv`] and
//! produce the native instruction stream for one subroutine. Register values
//! never survive a block boundary; only stack slots do.

pub mod brute;
pub mod color;

use std::collections::BTreeMap;

use crate::dataflow::Cfg;
use crate::error::{Error, Result};
use crate::frame::CallingConv;
use crate::instr::{Label, NativeInstr, Reg, SubroutineInfo, Temp};

pub use brute::BruteRegAlloc;
pub use color::{ColorRegAlloc, InterferenceGraph};

/// Current register binding of each temp, reset per block.
pub type Bindings = BTreeMap<Temp, Reg>;

/// Shared contract of the allocation strategies: rewrite every temp operand
/// to a concrete register, inserting spill stores and reloads as needed, and
/// complete the subroutine's frame facts.
pub trait RegAlloc {
    fn alloc<C: CallingConv>(
        &mut self,
        cfg: &Cfg,
        conv: &mut C,
        info: SubroutineInfo,
    ) -> Result<(Vec<NativeInstr>, SubroutineInfo)>;
}

/// Allocator-owned state of the allocatable registers: the occupant temp and
/// a sticky `used` flag for callee-save bookkeeping. A register is occupied
/// iff it has an occupant recorded here, so the flag cannot drift away from
/// the binding table as long as all mutation goes through the allocator's
/// bind/unbind pair.
#[derive(Debug)]
pub struct RegFile {
    regs: Vec<Reg>,
    occupants: Vec<Option<Temp>>,
    used: Vec<bool>,
}

impl RegFile {
    pub fn new(regs: Vec<Reg>) -> Self {
        let len = regs.len();
        RegFile {
            regs,
            occupants: vec![None; len],
            used: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn regs(&self) -> &[Reg] {
        &self.regs
    }

    pub fn reg(&self, idx: usize) -> Reg {
        self.regs[idx]
    }

    pub fn occupant(&self, idx: usize) -> Option<Temp> {
        self.occupants[idx]
    }

    pub fn occupant_of(&self, reg: Reg) -> Option<Temp> {
        self.index_of(reg).and_then(|idx| self.occupants[idx])
    }

    pub fn bind(&mut self, reg: Reg, temp: Temp) {
        if let Some(idx) = self.index_of(reg) {
            self.occupants[idx] = Some(temp);
            self.used[idx] = true;
        }
    }

    pub fn unbind(&mut self, reg: Reg) {
        if let Some(idx) = self.index_of(reg) {
            self.occupants[idx] = None;
        }
    }

    /// Free every register at a block boundary; `used` flags survive.
    pub fn reset(&mut self) {
        self.occupants.iter_mut().for_each(|occ| *occ = None);
    }

    /// Start a fresh function: nothing occupied, nothing used yet.
    pub fn clear_used(&mut self) {
        self.reset();
        self.used.iter_mut().for_each(|used| *used = false);
    }

    /// Registers ever assigned during the current function, for the
    /// emitter's callee-save prologue decisions.
    pub fn used_regs(&self) -> Vec<Reg> {
        self.regs
            .iter()
            .zip(&self.used)
            .filter(|(_, &used)| used)
            .map(|(&reg, _)| reg)
            .collect()
    }

    fn index_of(&self, reg: Reg) -> Option<usize> {
        self.regs.iter().position(|&r| r == reg)
    }
}

/// Accumulates the native instructions of one subroutine and owns the spill
/// slot interaction with the calling convention.
pub struct SubroutineEmitter<'a, C: CallingConv> {
    info: SubroutineInfo,
    conv: &'a mut C,
    buf: Vec<NativeInstr>,
}

impl<'a, C: CallingConv> SubroutineEmitter<'a, C> {
    pub fn new(conv: &'a mut C, info: SubroutineInfo) -> Self {
        SubroutineEmitter {
            info,
            conv,
            buf: Vec::new(),
        }
    }

    pub fn conv(&mut self) -> &mut C {
        self.conv
    }

    pub fn emit_label(&mut self, label: Label) {
        self.buf.push(NativeInstr::Label(label));
    }

    /// Store `temp` (currently held by `src`) to its spill slot, assigning
    /// the slot first if the temp does not have one yet.
    pub fn emit_store_to_stack(&mut self, src: Reg, temp: Temp) {
        let offset = self.conv.spill_to_stack(temp);
        self.buf.push(NativeInstr::StoreToStack { src, temp, offset });
    }

    /// Reload `temp` from its spill slot. A temp without a fixed slot was
    /// used before being defined, which is a defect in the input stream.
    pub fn emit_load_from_stack(&mut self, dst: Reg, temp: Temp) -> Result<()> {
        let offset = self
            .conv
            .offset_of(temp)
            .ok_or(Error::NoStackSlot(temp))?;
        self.buf.push(NativeInstr::LoadFromStack { dst, temp, offset });
        Ok(())
    }

    pub fn emit_param(&mut self, src: Reg, offset: i32) {
        self.buf.push(NativeInstr::Param { src, offset });
    }

    pub fn emit_native(&mut self, instr: NativeInstr) {
        self.buf.push(instr);
    }

    /// Fold the convention's high-water marks into the subroutine info and
    /// hand back the finished stream.
    pub fn finish(self) -> (Vec<NativeInstr>, SubroutineInfo) {
        let mut info = self.info;
        if self.conv.args_size() > info.args_size {
            info.args_size = self.conv.args_size();
        }
        info.frame_size = self.conv.frame_size();
        (self.buf, info)
    }
}
