//! End-to-end checks of the backend pipeline.
//!
//! The allocated streams are executed on a tiny machine model that knows the
//! handful of mnemonics the tests use, so correctness is judged by observed
//! results rather than by the exact shape of the spill traffic.

use std::collections::HashMap;

use finch_backend::frame::StackConv;
use finch_backend::instr::{
    Label, NativeInstr, Op, Operand, PseudoInstr, Reg, SubroutineInfo, Temp,
};
use finch_backend::regalloc::{BruteRegAlloc, ColorRegAlloc};
use finch_backend::{lower, mips};

/// Executes a native stream. Registers and stack slots start zeroed; a call
/// trashes every caller-saved register before writing its result.
struct Machine<'a> {
    regs: HashMap<Reg, i32>,
    stack: HashMap<i32, i32>,
    args: HashMap<i32, i32>,
    caller_saved: &'a [Reg],
    call_result: i32,
}

impl<'a> Machine<'a> {
    fn new(caller_saved: &'a [Reg], call_result: i32) -> Self {
        Machine {
            regs: HashMap::new(),
            stack: HashMap::new(),
            args: HashMap::new(),
            caller_saved,
            call_result,
        }
    }

    fn reg(&self, reg: Reg) -> i32 {
        self.regs.get(&reg).copied().unwrap_or(0)
    }

    fn run(&mut self, instrs: &[NativeInstr]) -> i32 {
        let labels: HashMap<Label, usize> = instrs
            .iter()
            .enumerate()
            .filter_map(|(at, instr)| match instr {
                NativeInstr::Label(label) => Some((label.clone(), at)),
                _ => None,
            })
            .collect();

        let mut pc = 0;
        loop {
            match &instrs[pc] {
                NativeInstr::Label(_) => {}
                NativeInstr::StoreToStack { src, offset, .. } => {
                    self.stack.insert(*offset, self.reg(*src));
                }
                NativeInstr::LoadFromStack { dst, offset, .. } => {
                    let value = self.stack[offset];
                    self.regs.insert(*dst, value);
                }
                NativeInstr::Param { src, offset } => {
                    self.args.insert(*offset, self.reg(*src));
                }
                NativeInstr::Plain {
                    op,
                    assembly,
                    dsts,
                    srcs,
                    label,
                } => match op {
                    Op::Jump => {
                        pc = labels[label.as_ref().unwrap()];
                        continue;
                    }
                    Op::CondJump => {
                        if self.reg(srcs[0]) != 0 {
                            pc = labels[label.as_ref().unwrap()];
                            continue;
                        }
                    }
                    Op::Ret => return self.reg(srcs[0]),
                    Op::Call => {
                        for &reg in self.caller_saved {
                            self.regs.insert(reg, i32::MIN);
                        }
                        if let Some(&dst) = dsts.first() {
                            self.regs.insert(dst, self.call_result);
                        }
                    }
                    Op::Binary | Op::Unary => {
                        let value = self.eval(assembly, srcs);
                        self.regs.insert(dsts[0], value);
                    }
                    other => panic!("machine cannot execute {}", other),
                },
            }
            pc += 1;
        }
    }

    fn eval(&self, assembly: &str, srcs: &[Reg]) -> i32 {
        let mnemonic = assembly.split_whitespace().next().unwrap();
        match mnemonic {
            "li" => assembly
                .rsplit(',')
                .next()
                .unwrap()
                .trim()
                .parse()
                .unwrap(),
            "move" => self.reg(srcs[0]),
            "add" => self.reg(srcs[0]) + self.reg(srcs[1]),
            "mul" => self.reg(srcs[0]) * self.reg(srcs[1]),
            other => panic!("unknown mnemonic {}", other),
        }
    }
}

fn t(index: u32) -> Operand {
    Operand::Temp(Temp::new(index))
}

fn li(dst: u32, imm: i32) -> PseudoInstr {
    PseudoInstr::seq(Op::Unary, format!("li 'd0, {}", imm), vec![t(dst)], vec![])
}

fn add(dst: u32, lhs: u32, rhs: u32) -> PseudoInstr {
    PseudoInstr::seq(
        Op::Binary,
        "add 'd0, 's0, 's1",
        vec![t(dst)],
        vec![t(lhs), t(rhs)],
    )
}

fn test_regs(n: usize) -> Vec<Reg> {
    const NAMES: [&str; 4] = ["$t0", "$t1", "$t2", "$t3"];
    (0..n).map(|i| Reg::new(8 + i as u8, NAMES[i])).collect()
}

fn info() -> SubroutineInfo {
    SubroutineInfo::new(Label::func("_L_f"), 0, false)
}

/// acc = 0; n = 3; loop { acc += n; n -= 1 } while n != 0; return acc.
fn countdown_sum() -> Vec<PseudoInstr> {
    let l1 = Label::temp("_L1");
    vec![
        PseudoInstr::label(Label::func("_L_sum")),
        li(1, 0),
        li(2, 3),
        PseudoInstr::label(l1.clone()),
        add(1, 1, 2),
        li(3, -1),
        add(2, 2, 3),
        PseudoInstr::cond_jump("bnez 's0, _L1", vec![t(2)], l1),
        PseudoInstr::ret("jr $ra", vec![t(1)]),
    ]
}

#[test]
fn test_brute_forced_spill_still_computes() {
    // Two registers, three temps alive at the add: every seed must spill
    // one value and still produce the right sum.
    for seed in 0..16 {
        let instrs = vec![
            li(1, 1),
            li(2, 2),
            add(3, 1, 2),
            PseudoInstr::ret("jr $ra", vec![t(3)]),
        ];
        let regs = test_regs(2);
        let mut conv = StackConv::new();
        let mut alloc = BruteRegAlloc::with_seed(regs.clone(), regs.clone(), seed);
        let (native, _) = lower(instrs, &mut conv, info(), &mut alloc).unwrap();

        let mut machine = Machine::new(&regs, 0);
        assert_eq!(3, machine.run(&native), "seed {}", seed);
    }
}

#[test]
fn test_brute_loop_crosses_blocks_through_stack() {
    let regs = test_regs(3);
    let mut conv = StackConv::new();
    let mut alloc = BruteRegAlloc::with_seed(regs.clone(), regs.clone(), 11);
    let (native, _) = lower(countdown_sum(), &mut conv, info(), &mut alloc).unwrap();

    let mut machine = Machine::new(&regs, 0);
    assert_eq!(6, machine.run(&native));
}

#[test]
fn test_color_loop_crosses_blocks_through_stack() {
    let regs = test_regs(3);
    let mut conv = StackConv::new();
    let mut alloc = ColorRegAlloc::new(regs.clone(), regs.clone());
    let (native, _) = lower(countdown_sum(), &mut conv, info(), &mut alloc).unwrap();

    let mut machine = Machine::new(&regs, 0);
    assert_eq!(6, machine.run(&native));
}

#[test]
fn test_color_entry_reloads_do_not_alias() {
    // _T1 dies at the labelled block's first instruction while _T5 lives
    // on; both are reloaded at block entry and must land in different
    // registers for the sum to come out as 1 + 9.
    let l = Label::temp("_L_b");
    let instrs = vec![
        li(1, 1),
        li(5, 9),
        PseudoInstr::jump("j _L_b", l.clone()),
        PseudoInstr::label(l),
        PseudoInstr::seq(Op::Unary, "move 'd0, 's0", vec![t(2)], vec![t(1)]),
        add(3, 2, 5),
        PseudoInstr::ret("jr $ra", vec![t(3)]),
    ];
    let regs = test_regs(2);
    let mut conv = StackConv::new();
    let mut alloc = ColorRegAlloc::new(regs.clone(), regs.clone());
    let (native, _) = lower(instrs, &mut conv, info(), &mut alloc).unwrap();

    let mut machine = Machine::new(&regs, 0);
    assert_eq!(10, machine.run(&native));
}

#[test]
fn test_call_trashes_registers_but_not_results() {
    // t1 = 5 survives a call that clobbers every caller-saved register;
    // the callee returns 37, so the final sum is 42.
    let instrs = vec![
        li(1, 5),
        PseudoInstr::caller_save(),
        PseudoInstr::seq(Op::Call, "jal _L_g", vec![t(2)], vec![]),
        PseudoInstr::caller_restore(),
        add(3, 1, 2),
        PseudoInstr::ret("jr $ra", vec![t(3)]),
    ];
    let regs = test_regs(3);

    let mut conv = StackConv::new();
    let mut brute = BruteRegAlloc::with_seed(regs.clone(), regs.clone(), 0);
    let (native, _) = lower(instrs.clone(), &mut conv, info(), &mut brute).unwrap();
    let mut machine = Machine::new(&regs, 37);
    assert_eq!(42, machine.run(&native));

    let mut conv = StackConv::new();
    let mut color = ColorRegAlloc::new(regs.clone(), regs.clone());
    let (native, _) = lower(instrs, &mut conv, info(), &mut color).unwrap();
    let mut machine = Machine::new(&regs, 37);
    assert_eq!(42, machine.run(&native));
}

#[test]
fn test_outgoing_arguments_land_in_the_arg_area() {
    let instrs = vec![
        li(1, 10),
        li(2, 20),
        PseudoInstr::param("", t(1)),
        PseudoInstr::param("", t(2)),
        PseudoInstr::caller_save(),
        PseudoInstr::seq(Op::Call, "jal _L_g", vec![t(3)], vec![]),
        PseudoInstr::caller_restore(),
        PseudoInstr::ret("jr $ra", vec![t(3)]),
    ];
    let regs = test_regs(3);
    let mut conv = StackConv::new();
    let mut alloc = BruteRegAlloc::with_seed(regs.clone(), regs.clone(), 0);
    let (native, frame) = lower(instrs, &mut conv, info(), &mut alloc).unwrap();

    let mut machine = Machine::new(&regs, 7);
    assert_eq!(7, machine.run(&native));
    // Word 0 of the argument area is reserved; arguments start at word 1.
    assert_eq!(10, machine.args[&4]);
    assert_eq!(20, machine.args[&8]);
    assert_eq!(12, frame.args_size);
}

#[test]
fn test_full_mips_bank() {
    let mut conv = StackConv::new();
    let mut alloc = BruteRegAlloc::with_seed(
        mips::ALLOCATABLE.clone(),
        mips::CALLER_SAVED.to_vec(),
        5,
    );
    let (native, _) = lower(countdown_sum(), &mut conv, info(), &mut alloc).unwrap();

    let mut machine = Machine::new(&mips::CALLER_SAVED, 0);
    assert_eq!(6, machine.run(&native));
}
