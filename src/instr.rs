//! Instruction model shared by every backend pass.
//!
//! A [`PseudoInstr`] is one lowered three-address instruction whose operands
//! are still virtual registers ([`Temp`]), except where the calling
//! convention pins an operand to a physical register ([`Reg`]). Register
//! allocation turns the pseudo stream into a [`NativeInstr`] stream in which
//! every operand is physical.

use std::fmt::{self, Display};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Temp {
    index: u32,
}

impl Temp {
    /// The index must be unique within one function; the lowering phase is
    /// responsible for minting them densely.
    pub fn new(index: u32) -> Self {
        Temp { index }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_T{}", self.index)
    }
}

/// A physical register. Plain identity only: occupancy and usage state live
/// in the allocator's register table, not here.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Reg {
    pub id: u8,
    pub name: &'static str,
}

impl Reg {
    pub const fn new(id: u8, name: &'static str) -> Self {
        Reg { id, name }
    }
}

impl Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LabelKind {
    Temp,
    VTable,
    Func,
    Intrinsic,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Label {
    pub kind: LabelKind,
    pub name: String,
}

impl Label {
    pub fn temp(name: impl Into<String>) -> Self {
        Label {
            kind: LabelKind::Temp,
            name: name.into(),
        }
    }

    pub fn func(name: impl Into<String>) -> Self {
        Label {
            kind: LabelKind::Func,
            name: name.into(),
        }
    }

    pub fn vtable(name: impl Into<String>) -> Self {
        Label {
            kind: LabelKind::VTable,
            name: name.into(),
        }
    }

    pub fn intrinsic(name: impl Into<String>) -> Self {
        Label {
            kind: LabelKind::Intrinsic,
            name: name.into(),
        }
    }

    pub fn is_func(&self) -> bool {
        self.kind == LabelKind::Func
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An instruction operand: a virtual register, or a physical register pinned
/// by the calling convention (argument slots, the ABI return register).
/// Pinned operands bypass allocation entirely.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Operand {
    Temp(Temp),
    Reg(Reg),
}

impl Operand {
    pub fn temp(&self) -> Option<Temp> {
        match self {
            Operand::Temp(t) => Some(*t),
            Operand::Reg(_) => None,
        }
    }
}

impl From<Temp> for Operand {
    fn from(t: Temp) -> Self {
        Operand::Temp(t)
    }
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(t) => write!(f, "{}", t),
            Operand::Reg(r) => write!(f, "{}", r),
        }
    }
}

/// Operation category of a pseudo instruction.
///
/// `CallerSave` and `CallerRestore` are empty marker instructions that the
/// instruction-selection phase places immediately around every call; the
/// allocators expand them into store/reload sequences for caller-saved
/// registers whose value is live past the call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Op {
    /// Arithmetic or comparison: two reads, one write.
    Binary,
    /// Negation, logical not, move, load-immediate: at most one read, one write.
    Unary,
    /// Memory load or store.
    Memory,
    /// Push one outgoing call argument.
    Param,
    /// Direct or indirect call.
    Call,
    CallerSave,
    CallerRestore,
    Jump,
    CondJump,
    Ret,
    Label,
}

/// Block-building view of an instruction: everything that is not a label or
/// a terminator is sequential.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Kind {
    Label,
    Seq,
    Jmp,
    CondJmp,
    Ret,
}

/// One IR instruction over virtual registers.
///
/// The `assembly` field is a target text template in which `'d0`, `'s1`, …
/// stand for the final names of the destination/source registers; the
/// external emitter substitutes them after allocation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PseudoInstr {
    pub op: Op,
    pub assembly: String,
    pub dsts: Vec<Operand>,
    pub srcs: Vec<Operand>,
    pub label: Option<Label>,
}

impl PseudoInstr {
    pub fn seq(
        op: Op,
        assembly: impl Into<String>,
        dsts: Vec<Operand>,
        srcs: Vec<Operand>,
    ) -> Self {
        debug_assert!(matches!(
            op,
            Op::Binary | Op::Unary | Op::Memory | Op::Call
        ));
        PseudoInstr {
            op,
            assembly: assembly.into(),
            dsts,
            srcs,
            label: None,
        }
    }

    pub fn label(label: Label) -> Self {
        PseudoInstr {
            op: Op::Label,
            assembly: format!("{}:", label),
            dsts: Vec::new(),
            srcs: Vec::new(),
            label: Some(label),
        }
    }

    pub fn param(assembly: impl Into<String>, src: Operand) -> Self {
        PseudoInstr {
            op: Op::Param,
            assembly: assembly.into(),
            dsts: Vec::new(),
            srcs: vec![src],
            label: None,
        }
    }

    pub fn caller_save() -> Self {
        PseudoInstr {
            op: Op::CallerSave,
            assembly: String::new(),
            dsts: Vec::new(),
            srcs: Vec::new(),
            label: None,
        }
    }

    pub fn caller_restore() -> Self {
        PseudoInstr {
            op: Op::CallerRestore,
            assembly: String::new(),
            dsts: Vec::new(),
            srcs: Vec::new(),
            label: None,
        }
    }

    pub fn jump(assembly: impl Into<String>, target: Label) -> Self {
        PseudoInstr {
            op: Op::Jump,
            assembly: assembly.into(),
            dsts: Vec::new(),
            srcs: Vec::new(),
            label: Some(target),
        }
    }

    pub fn cond_jump(assembly: impl Into<String>, srcs: Vec<Operand>, target: Label) -> Self {
        PseudoInstr {
            op: Op::CondJump,
            assembly: assembly.into(),
            dsts: Vec::new(),
            srcs,
            label: Some(target),
        }
    }

    pub fn ret(assembly: impl Into<String>, srcs: Vec<Operand>) -> Self {
        PseudoInstr {
            op: Op::Ret,
            assembly: assembly.into(),
            dsts: Vec::new(),
            srcs,
            label: None,
        }
    }

    pub fn kind(&self) -> Kind {
        match self.op {
            Op::Label => Kind::Label,
            Op::Jump => Kind::Jmp,
            Op::CondJump => Kind::CondJmp,
            Op::Ret => Kind::Ret,
            Op::Binary
            | Op::Unary
            | Op::Memory
            | Op::Param
            | Op::Call
            | Op::CallerSave
            | Op::CallerRestore => Kind::Seq,
        }
    }

    pub fn is_label(&self) -> bool {
        self.kind() == Kind::Label
    }

    pub fn is_sequential(&self) -> bool {
        self.kind() == Kind::Seq
    }

    /// Virtual registers read by this instruction. Pinned physical operands
    /// are not temps and are skipped.
    pub fn read_temps(&self) -> impl Iterator<Item = Temp> + '_ {
        self.srcs.iter().filter_map(Operand::temp)
    }

    /// Virtual registers written by this instruction.
    pub fn written_temps(&self) -> impl Iterator<Item = Temp> + '_ {
        self.dsts.iter().filter_map(Operand::temp)
    }

    /// Replace every operand with the physical register chosen for it.
    pub fn to_native(&self, dsts: Vec<Reg>, srcs: Vec<Reg>) -> NativeInstr {
        NativeInstr::Plain {
            op: self.op,
            assembly: self.assembly.clone(),
            dsts,
            srcs,
            label: self.label.clone(),
        }
    }
}

impl Display for PseudoInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = self.assembly.clone();
        for (idx, dst) in self.dsts.iter().enumerate() {
            text = text.replace(&format!("'d{}", idx), &dst.to_string());
        }
        for (idx, src) in self.srcs.iter().enumerate() {
            text = text.replace(&format!("'s{}", idx), &src.to_string());
        }
        write!(f, "{}", text)
    }
}

/// An instruction whose operands are all physical registers, ready for the
/// target text emitter. Spill traffic and outgoing-argument stores are
/// explicit variants so the emitter owns their final syntax.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum NativeInstr {
    Plain {
        op: Op,
        assembly: String,
        dsts: Vec<Reg>,
        srcs: Vec<Reg>,
        label: Option<Label>,
    },
    /// Store `src` (holding `temp`) to the temp's spill slot at `offset`
    /// from the frame pointer.
    StoreToStack { src: Reg, temp: Temp, offset: i32 },
    /// Reload `temp` from its spill slot into `dst`.
    LoadFromStack { dst: Reg, temp: Temp, offset: i32 },
    /// Store an outgoing argument at `offset` in the argument area.
    Param { src: Reg, offset: i32 },
    Label(Label),
}

impl Display for NativeInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeInstr::Plain {
                assembly,
                dsts,
                srcs,
                ..
            } => {
                let mut text = assembly.clone();
                for (idx, dst) in dsts.iter().enumerate() {
                    text = text.replace(&format!("'d{}", idx), dst.name);
                }
                for (idx, src) in srcs.iter().enumerate() {
                    text = text.replace(&format!("'s{}", idx), src.name);
                }
                write!(f, "{}", text)
            }
            NativeInstr::StoreToStack { src, temp, offset } => {
                write!(f, "store {} -> {}@{}", src, temp, offset)
            }
            NativeInstr::LoadFromStack { dst, temp, offset } => {
                write!(f, "load {}@{} -> {}", temp, offset, dst)
            }
            NativeInstr::Param { src, offset } => write!(f, "param {} -> arg@{}", src, offset),
            NativeInstr::Label(label) => write!(f, "{}:", label),
        }
    }
}

/// Frame facts about one subroutine, produced by instruction selection and
/// completed during allocation; the emitter uses them for prologue and
/// epilogue generation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SubroutineInfo {
    pub label: Label,
    pub num_args: usize,
    pub has_calls: bool,
    /// High-water mark of the outgoing-argument area, in bytes.
    pub args_size: i32,
    /// Maximum simultaneous local-frame size, in bytes. Filled in after
    /// allocation.
    pub frame_size: i32,
}

impl SubroutineInfo {
    pub fn new(label: Label, num_args: usize, has_calls: bool) -> Self {
        SubroutineInfo {
            label,
            num_args,
            has_calls,
            args_size: 0,
            frame_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_kind_of_op() {
        for op in Op::iter() {
            let kind = match op {
                Op::Label => Kind::Label,
                Op::Jump => Kind::Jmp,
                Op::CondJump => Kind::CondJmp,
                Op::Ret => Kind::Ret,
                _ => Kind::Seq,
            };
            let instr = PseudoInstr {
                op,
                assembly: String::new(),
                dsts: Vec::new(),
                srcs: Vec::new(),
                label: None,
            };
            assert_eq!(kind, instr.kind());
        }
    }

    #[test]
    fn test_operand_substitution() {
        let instr = PseudoInstr::seq(
            Op::Binary,
            "add 'd0, 's0, 's1",
            vec![Temp::new(2).into()],
            vec![Temp::new(0).into(), Temp::new(1).into()],
        );
        assert_eq!("add _T2, _T0, _T1", instr.to_string());

        let native = instr.to_native(
            vec![Reg::new(10, "$t2")],
            vec![Reg::new(8, "$t0"), Reg::new(9, "$t1")],
        );
        assert_eq!("add $t2, $t0, $t1", native.to_string());
    }

    #[test]
    fn test_pinned_operands_are_not_temps() {
        let v0 = Reg::new(2, "$v0");
        let instr = PseudoInstr::ret("jr $ra", vec![v0.into(), Temp::new(3).into()]);
        let read: Vec<_> = instr.read_temps().collect();
        assert_eq!(vec![Temp::new(3)], read);
    }
}
