use thiserror::Error;

use crate::instr::{Label, Op, Temp};

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal conditions of the backend.
///
/// Every variant indicates a defect in an earlier phase (instruction
/// selection handed us a malformed stream) rather than a user-facing
/// diagnostic, so none of them is recoverable: the pipeline aborts for the
/// enclosing function.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("branch target {0} does not belong to any basic block")]
    UnresolvedTarget(Label),

    #[error("block {0} ends with a branch that carries no target label")]
    MissingBranchTarget(usize),

    #[error("instruction stream does not end with a terminator")]
    NonTerminated,

    #[error("{0} has no stack slot but a reload was requested")]
    NoStackSlot(Temp),

    #[error("unexpected {0} instruction in the middle of a basic block")]
    UnsupportedInstr(Op),

    #[error("interference graph is not colorable with {available} registers")]
    NotColorable { available: usize },

    #[error("no register assigned to {0}")]
    UnassignedTemp(Temp),
}
