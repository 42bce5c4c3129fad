//! Control-flow graph over a flat pseudo-instruction stream.
//!
//! [`CfgBuilder`] partitions the stream into basic blocks and derives the
//! edge relation in one pass over the finished blocks. The graph is built
//! once per function and read-only afterwards; only the liveness analyzer
//! mutates the blocks' liveness sets.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::mem;

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::instr::{Kind, Label, PseudoInstr, Temp};

pub type TempSet = BTreeSet<Temp>;

/// A program location: one instruction plus its per-point liveness sets.
#[derive(Clone, Debug)]
pub struct Loc {
    pub instr: PseudoInstr,
    pub live_in: TempSet,
    pub live_out: TempSet,
}

impl Loc {
    pub fn new(instr: PseudoInstr) -> Self {
        Loc {
            instr,
            live_in: TempSet::new(),
            live_out: TempSet::new(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockKind {
    Continuous,
    EndByJump,
    EndByCondJump,
    EndByReturn,
}

#[derive(Debug)]
pub struct BasicBlock {
    pub kind: BlockKind,
    /// Dense id, equal to creation order.
    pub id: usize,
    /// Entry label, if the block is a jump target.
    pub label: Option<Label>,
    pub locs: Vec<Loc>,

    pub def: TempSet,
    pub live_use: TempSet,
    pub live_in: TempSet,
    pub live_out: TempSet,
}

impl BasicBlock {
    fn new(kind: BlockKind, id: usize, label: Option<Label>, locs: Vec<Loc>) -> Self {
        BasicBlock {
            kind,
            id,
            label,
            locs,
            def: TempSet::new(),
            live_use: TempSet::new(),
            live_in: TempSet::new(),
            live_out: TempSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.locs.is_empty()
    }

    pub fn last_instr(&self) -> Option<&PseudoInstr> {
        self.locs.last().map(|loc| &loc.instr)
    }

    /// The sequential prefix of the block: everything except the terminator,
    /// or the whole block when it falls through.
    pub fn seq_locs(&self) -> &[Loc] {
        match self.kind {
            BlockKind::Continuous => &self.locs,
            _ => &self.locs[..self.locs.len() - 1],
        }
    }

    /// The terminator, if the block ends in one.
    pub fn terminator(&self) -> Option<&Loc> {
        match self.kind {
            BlockKind::Continuous => None,
            _ => self.locs.last(),
        }
    }
}

/// Builds a [`Cfg`] from an ordered instruction sequence.
#[derive(Default)]
pub struct CfgBuilder {
    blocks: Vec<BasicBlock>,
    buf: Vec<Loc>,
    current_label: Option<Label>,
    labels_to_blocks: BTreeMap<Label, usize>,
}

impl CfgBuilder {
    pub fn build_from(seq: Vec<PseudoInstr>) -> Result<Cfg> {
        let mut builder = CfgBuilder::default();

        for instr in seq {
            match instr.kind() {
                Kind::Label => {
                    if let Some(label) = instr.label {
                        if label.is_func() {
                            // Function entry labels do not start a block.
                            continue;
                        }
                        builder.close();
                        builder.current_label = Some(label);
                    }
                }
                Kind::Seq => builder.buf.push(Loc::new(instr)),
                Kind::Jmp => {
                    builder.buf.push(Loc::new(instr));
                    builder.save(BlockKind::EndByJump);
                }
                Kind::CondJmp => {
                    builder.buf.push(Loc::new(instr));
                    builder.save(BlockKind::EndByCondJump);
                }
                Kind::Ret => {
                    builder.buf.push(Loc::new(instr));
                    builder.save(BlockKind::EndByReturn);
                }
            }
        }

        if !builder.buf.is_empty() {
            return Err(Error::NonTerminated);
        }

        builder.into_cfg()
    }

    /// Close the block under construction as a fallthrough block. With an
    /// empty buffer and no pending label there is no open block (a
    /// terminator already sealed the previous one), so nothing is saved.
    fn close(&mut self) {
        if self.buf.is_empty() && self.current_label.is_none() {
            return;
        }
        self.save(BlockKind::Continuous);
    }

    fn save(&mut self, kind: BlockKind) {
        let id = self.blocks.len();
        let label = self.current_label.take();
        let locs = mem::take(&mut self.buf);
        if let Some(label) = &label {
            self.labels_to_blocks.insert(label.clone(), id);
        }
        self.blocks.push(BasicBlock::new(kind, id, label, locs));
    }

    fn into_cfg(self) -> Result<Cfg> {
        let len = self.blocks.len();
        let mut edges = Vec::new();

        for bb in &self.blocks {
            match bb.kind {
                BlockKind::EndByJump => {
                    edges.push((bb.id, self.resolve_target(bb)?));
                }
                BlockKind::EndByCondJump => {
                    edges.push((bb.id, self.resolve_target(bb)?));
                    if bb.id + 1 < len {
                        edges.push((bb.id, bb.id + 1));
                    }
                }
                BlockKind::EndByReturn => {}
                BlockKind::Continuous => {
                    if bb.id + 1 < len {
                        edges.push((bb.id, bb.id + 1));
                    }
                }
            }
        }

        Ok(Cfg::new(self.blocks, edges))
    }

    fn resolve_target(&self, bb: &BasicBlock) -> Result<usize> {
        let label = bb
            .last_instr()
            .and_then(|instr| instr.label.as_ref())
            .ok_or(Error::MissingBranchTarget(bb.id))?;
        self.labels_to_blocks
            .get(label)
            .copied()
            .ok_or_else(|| Error::UnresolvedTarget(label.clone()))
    }
}

/// Basic blocks plus the directed edge relation between them. Adjacency is
/// derived once at construction and queried read-only.
#[derive(Debug)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub edges: Vec<(usize, usize)>,
    // (predecessors, successors) per block id.
    links: Vec<(BTreeSet<usize>, BTreeSet<usize>)>,
}

impl Cfg {
    fn new(blocks: Vec<BasicBlock>, edges: Vec<(usize, usize)>) -> Self {
        let mut links = vec![(BTreeSet::new(), BTreeSet::new()); blocks.len()];
        for &(u, v) in &edges {
            links[u].1.insert(v);
            links[v].0.insert(u);
        }
        Cfg {
            blocks,
            edges,
            links,
        }
    }

    pub fn block(&self, id: usize) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: usize) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    pub fn prev(&self, id: usize) -> &BTreeSet<usize> {
        &self.links[id].0
    }

    pub fn succ(&self, id: usize) -> &BTreeSet<usize> {
        &self.links[id].1
    }

    pub fn in_degree(&self, id: usize) -> usize {
        self.links[id].0.len()
    }

    pub fn out_degree(&self, id: usize) -> usize {
        self.links[id].1.len()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    /// Rendering including the block-level liveness sets, for dumping the
    /// analysis result of each pass.
    pub fn liveness_report(&self) -> String {
        let mut out = String::from("CFG:\n");
        for bb in &self.blocks {
            out.push_str(&self.block_header(bb));
            out.push_str(&format!("  def     = [{}]\n", bb.def.iter().format(" ")));
            out.push_str(&format!(
                "  liveUse = [{}]\n",
                bb.live_use.iter().format(" ")
            ));
            out.push_str(&format!("  liveIn  = [{}]\n", bb.live_in.iter().format(" ")));
            out.push_str(&format!(
                "  liveOut = [{}]\n",
                bb.live_out.iter().format(" ")
            ));
            for loc in &bb.locs {
                out.push_str(&format!("    {}\n", loc.instr));
            }
        }
        out
    }

    fn block_header(&self, bb: &BasicBlock) -> String {
        format!(
            "BASIC BLOCK {} {} ({}, succ [{}]):\n",
            bb.id,
            bb.label
                .as_ref()
                .map(Label::to_string)
                .unwrap_or_else(|| "<unnamed>".to_string()),
            bb.kind,
            self.succ(bb.id).iter().format(" "),
        )
    }
}

impl Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CFG:")?;
        for bb in &self.blocks {
            write!(f, "{}", self.block_header(bb))?;
            for loc in &bb.locs {
                writeln!(f, "    {}", loc.instr)?;
            }
        }
        Ok(())
    }
}
