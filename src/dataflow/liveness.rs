//! Liveness analysis over a control-flow graph.
//!
//! Three stages: per-block `def`/`liveUse` collection, the backward dataflow
//! fixed point on block-level `liveIn`/`liveOut`, and a per-instruction
//! refinement walking each block backward from its `liveOut`. Termination of
//! the fixed point is guaranteed because the sets grow monotonically inside
//! a finite temp universe.

use crate::dataflow::cfg::{BasicBlock, Cfg, TempSet};

pub fn analyze(cfg: &mut Cfg) {
    for bb in &mut cfg.blocks {
        compute_def_and_live_use(bb);
        bb.live_in = bb.live_use.clone();
        bb.live_out = TempSet::new();
    }

    let mut changed = true;
    while changed {
        changed = false;
        for id in 0..cfg.len() {
            let mut live_out = TempSet::new();
            for &next in cfg.succ(id) {
                live_out.extend(cfg.block(next).live_in.iter().copied());
            }

            let bb = cfg.block_mut(id);
            let mut live_in = bb.live_use.clone();
            live_in.extend(live_out.difference(&bb.def).copied());

            if live_in != bb.live_in {
                bb.live_in = live_in;
                changed = true;
            }
            bb.live_out = live_out;
        }
    }

    for bb in &mut cfg.blocks {
        analyze_per_loc(bb);
    }
}

/// `def`: every temp written anywhere in the block. `liveUse`: every temp
/// read before any write to it within the block — NOT simply the union of
/// all reads.
fn compute_def_and_live_use(bb: &mut BasicBlock) {
    bb.def = TempSet::new();
    bb.live_use = TempSet::new();

    for loc in &bb.locs {
        for read in loc.instr.read_temps() {
            if !bb.def.contains(&read) {
                bb.live_use.insert(read);
            }
        }
        bb.def.extend(loc.instr.written_temps());
    }
}

/// Treat every location as a one-instruction block and back-propagate from
/// the block's `liveOut`.
fn analyze_per_loc(bb: &mut BasicBlock) {
    let mut live = bb.live_out.clone();
    for loc in bb.locs.iter_mut().rev() {
        loc.live_out = live.clone();
        // Written temps must leave the set before read temps re-enter it: a
        // temp that is both read and written (say `_T1 = _T1 + _T2`) must be
        // alive on entry.
        for written in loc.instr.written_temps() {
            live.remove(&written);
        }
        live.extend(loc.instr.read_temps());
        loc.live_in = live.clone();
    }
}
