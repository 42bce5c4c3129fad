//! Block-local register allocation by graph coloring.
//!
//! Each basic block gets its own interference graph, colored with Kempe
//! simplification. Because every block starts from the stack (live-in temps
//! are reloaded on entry, live-out temps stored on exit), the coloring never
//! has to agree across blocks. A block whose graph needs more colors than
//! there are allocatable registers is reported as an error; this strategy
//! has no spilling fallback.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use crate::dataflow::{BasicBlock, Cfg, Loc, TempSet};
use crate::error::{Error, Result};
use crate::frame::CallingConv;
use crate::instr::{NativeInstr, Op, Operand, Reg, SubroutineInfo, Temp};
use crate::regalloc::{RegAlloc, SubroutineEmitter};

/// Undirected interference relation between the temps of one basic block.
///
/// Nodes are every temp the block references plus every temp alive after any
/// of its locations; two temps interfere when one is written while the other
/// is alive, or when both are alive at the same point.
#[derive(Debug, Default)]
pub struct InterferenceGraph {
    adj: BTreeMap<Temp, TempSet>,
}

impl InterferenceGraph {
    pub fn build(bb: &BasicBlock) -> Self {
        let mut graph = InterferenceGraph::default();

        // Entry reloads materialize every live-in value at once, so live-in
        // temps are simultaneously alive at block entry even when one of
        // them dies at the first instruction.
        for &temp in &bb.live_in {
            graph.ensure(temp);
        }
        for (&a, &b) in bb.live_in.iter().tuple_combinations() {
            graph.link(a, b);
        }

        for loc in &bb.locs {
            for temp in loc.instr.read_temps().chain(loc.instr.written_temps()) {
                graph.ensure(temp);
            }
            for &temp in &loc.live_out {
                graph.ensure(temp);
            }
            for (&a, &b) in loc.live_out.iter().tuple_combinations() {
                graph.link(a, b);
            }
            for written in loc.instr.written_temps() {
                for &alive in &loc.live_out {
                    graph.link(written, alive);
                }
            }
        }

        graph
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = Temp> + '_ {
        self.adj.keys().copied()
    }

    pub fn degree(&self, temp: Temp) -> usize {
        self.adj.get(&temp).map_or(0, TempSet::len)
    }

    pub fn interferes(&self, a: Temp, b: Temp) -> bool {
        self.adj.get(&a).map_or(false, |set| set.contains(&b))
    }

    fn ensure(&mut self, temp: Temp) {
        self.adj.entry(temp).or_default();
    }

    fn link(&mut self, a: Temp, b: Temp) {
        if a == b {
            return;
        }
        self.adj.entry(a).or_default().insert(b);
        self.adj.entry(b).or_default().insert(a);
    }

    /// Kempe's heuristic with an explicit select stack: repeatedly remove a
    /// node of degree below the register count, then color the stack in
    /// reverse removal order. A graph where every remaining node has full
    /// degree is rejected.
    pub fn color(&self, regs: &[Reg]) -> Result<BTreeMap<Temp, Reg>> {
        let available = regs.len();

        let mut remaining: TempSet = self.adj.keys().copied().collect();
        let mut degrees: BTreeMap<Temp, usize> = self
            .adj
            .iter()
            .map(|(&temp, neighbors)| (temp, neighbors.len()))
            .collect();
        let mut stack = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let picked = remaining
                .iter()
                .copied()
                .find(|temp| degrees[temp] < available)
                .ok_or(Error::NotColorable { available })?;

            remaining.remove(&picked);
            for neighbor in &self.adj[&picked] {
                if remaining.contains(neighbor) {
                    if let Some(degree) = degrees.get_mut(neighbor) {
                        *degree -= 1;
                    }
                }
            }
            stack.push(picked);
        }

        let mut assignment = BTreeMap::new();
        while let Some(temp) = stack.pop() {
            let taken: Vec<Reg> = self.adj[&temp]
                .iter()
                .filter_map(|neighbor| assignment.get(neighbor).copied())
                .collect();
            let reg = regs
                .iter()
                .copied()
                .find(|reg| !taken.contains(reg))
                .ok_or(Error::NotColorable { available })?;
            assignment.insert(temp, reg);
        }

        Ok(assignment)
    }
}

/// Where the per-block register assignment comes from.
pub enum ColorMode {
    /// Color each block's interference graph from scratch.
    Scratch,
    /// Reuse one fixed assignment for every block; temps outside the map are
    /// reported as [`Error::UnassignedTemp`].
    Rebind(BTreeMap<Temp, Reg>),
}

pub struct ColorRegAlloc {
    regs: Vec<Reg>,
    caller_saved: Vec<Reg>,
    mode: ColorMode,
    used: BTreeSet<Reg>,
}

impl ColorRegAlloc {
    pub fn new(regs: Vec<Reg>, caller_saved: Vec<Reg>) -> Self {
        ColorRegAlloc {
            regs,
            caller_saved,
            mode: ColorMode::Scratch,
            used: BTreeSet::new(),
        }
    }

    pub fn with_assignment(
        regs: Vec<Reg>,
        caller_saved: Vec<Reg>,
        assignment: BTreeMap<Temp, Reg>,
    ) -> Self {
        ColorRegAlloc {
            regs,
            caller_saved,
            mode: ColorMode::Rebind(assignment),
            used: BTreeSet::new(),
        }
    }

    /// Registers ever assigned during the last allocated function, for the
    /// emitter's callee-save prologue decisions.
    pub fn used_regs(&self) -> Vec<Reg> {
        self.used.iter().copied().collect()
    }

    fn rewrite_block<C: CallingConv>(
        &mut self,
        bb: &BasicBlock,
        emitter: &mut SubroutineEmitter<'_, C>,
    ) -> Result<()> {
        let assignment = match &self.mode {
            ColorMode::Scratch => InterferenceGraph::build(bb).color(&self.regs)?,
            ColorMode::Rebind(map) => map.clone(),
        };
        self.used.extend(assignment.values().copied());

        // Every live-in value enters the block through its stack slot.
        for &temp in &bb.live_in {
            if let Some(&reg) = assignment.get(&temp) {
                emitter.emit_load_from_stack(reg, temp)?;
            }
        }

        let mut caller_need_save: Vec<(Reg, Temp)> = Vec::new();

        for loc in bb.seq_locs() {
            match loc.instr.op {
                Op::CallerSave => {
                    emitter.conv().finish_param();
                    for (&temp, &reg) in &assignment {
                        if self.caller_saved.contains(&reg) && loc.live_out.contains(&temp) {
                            caller_need_save.push((reg, temp));
                            emitter.emit_store_to_stack(reg, temp);
                        }
                    }
                }
                Op::CallerRestore => {
                    for (reg, temp) in caller_need_save.drain(..) {
                        emitter.emit_load_from_stack(reg, temp)?;
                    }
                }
                Op::Param => {
                    let operand = loc
                        .instr
                        .srcs
                        .first()
                        .copied()
                        .ok_or(Error::UnsupportedInstr(Op::Param))?;
                    let temp = operand
                        .temp()
                        .ok_or(Error::UnsupportedInstr(Op::Param))?;
                    let reg = reg_of(&assignment, operand)?;
                    let offset = emitter.conv().add_param(temp);
                    emitter.emit_param(reg, offset);
                }
                Op::Binary | Op::Unary | Op::Memory | Op::Call => {
                    rewrite_loc(&assignment, loc, emitter)?;
                }
                Op::Jump | Op::CondJump | Op::Ret | Op::Label => {
                    return Err(Error::UnsupportedInstr(loc.instr.op));
                }
            }
        }

        // And leaves it the same way.
        for &temp in &bb.live_out {
            if let Some(&reg) = assignment.get(&temp) {
                emitter.emit_store_to_stack(reg, temp);
            }
        }

        if let Some(loc) = bb.terminator() {
            rewrite_loc(&assignment, loc, emitter)?;
        }

        Ok(())
    }
}

fn reg_of(assignment: &BTreeMap<Temp, Reg>, operand: Operand) -> Result<Reg> {
    match operand {
        Operand::Reg(reg) => Ok(reg),
        Operand::Temp(temp) => assignment
            .get(&temp)
            .copied()
            .ok_or(Error::UnassignedTemp(temp)),
    }
}

fn rewrite_loc<C: CallingConv>(
    assignment: &BTreeMap<Temp, Reg>,
    loc: &Loc,
    emitter: &mut SubroutineEmitter<'_, C>,
) -> Result<()> {
    let instr = &loc.instr;

    let mut src_regs = Vec::with_capacity(instr.srcs.len());
    for &operand in &instr.srcs {
        src_regs.push(reg_of(assignment, operand)?);
    }
    let mut dst_regs = Vec::with_capacity(instr.dsts.len());
    for &operand in &instr.dsts {
        dst_regs.push(reg_of(assignment, operand)?);
    }

    emitter.emit_native(instr.to_native(dst_regs, src_regs));
    Ok(())
}

impl RegAlloc for ColorRegAlloc {
    fn alloc<C: CallingConv>(
        &mut self,
        cfg: &Cfg,
        conv: &mut C,
        info: SubroutineInfo,
    ) -> Result<(Vec<NativeInstr>, SubroutineInfo)> {
        self.used.clear();
        let mut emitter = SubroutineEmitter::new(conv, info);

        for bb in cfg.iter() {
            if let Some(label) = &bb.label {
                emitter.emit_label(label.clone());
            }
            self.rewrite_block(bb, &mut emitter)?;
        }

        Ok(emitter.finish())
    }
}
