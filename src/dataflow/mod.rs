pub mod cfg;
pub mod liveness;

pub use cfg::{BasicBlock, BlockKind, Cfg, CfgBuilder, Loc, TempSet};
