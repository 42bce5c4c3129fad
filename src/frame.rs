//! Calling-convention bookkeeping consumed by both register allocators.
//!
//! The protocol per call site is fixed: zero or more [`CallingConv::add_param`]
//! (strictly left to right), then [`CallingConv::finish_param`], then any
//! [`CallingConv::spill_to_stack`] for temps that must survive the call, then
//! the call instruction itself.

use std::collections::HashMap;

use crate::instr::Temp;

pub const WORD_SIZE: i32 = 4;

pub trait CallingConv {
    /// Reserve the stack slot for the next outgoing argument and return its
    /// offset in the argument area.
    fn add_param(&mut self, temp: Temp) -> i32;

    /// All arguments of the current call are pushed; fold the running size
    /// into the argument-area high-water mark and reset the counter.
    fn finish_param(&mut self);

    /// Idempotently assign a local spill slot to `temp` and return its
    /// offset. Re-invoking on an already-assigned temp is a no-op.
    fn spill_to_stack(&mut self, temp: Temp) -> i32;

    fn offset_of(&self, temp: Temp) -> Option<i32>;

    /// High-water mark of the outgoing-argument area.
    fn args_size(&self) -> i32;

    /// Maximum simultaneous local-frame size.
    fn frame_size(&self) -> i32;
}

/// Stack-based convention: all arguments are passed on the stack and spill
/// slots grow downward from the frame pointer.
#[derive(Debug, Default)]
pub struct StackConv {
    offsets: HashMap<Temp, i32>,
    next_offset: i32,
    max_size: i32,
    current_size: i32,
    max_args_size: i32,
    current_args_size: i32,
}

impl StackConv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CallingConv for StackConv {
    fn add_param(&mut self, _temp: Temp) -> i32 {
        // Word 0 of the argument area is reserved, so the running counter
        // starts one word in.
        if self.current_args_size == 0 {
            self.current_args_size = WORD_SIZE;
        }
        let offset = self.current_args_size;
        self.current_args_size += WORD_SIZE;
        offset
    }

    fn finish_param(&mut self) {
        if self.current_args_size > self.max_args_size {
            self.max_args_size = self.current_args_size;
        }
        self.current_args_size = 0;
    }

    fn spill_to_stack(&mut self, temp: Temp) -> i32 {
        if let Some(&offset) = self.offsets.get(&temp) {
            return offset;
        }
        self.next_offset -= WORD_SIZE;
        self.offsets.insert(temp, self.next_offset);
        self.current_size += WORD_SIZE;
        if self.current_size > self.max_size {
            self.max_size = self.current_size;
        }
        self.next_offset
    }

    fn offset_of(&self, temp: Temp) -> Option<i32> {
        self.offsets.get(&temp).copied()
    }

    fn args_size(&self) -> i32 {
        self.max_args_size
    }

    fn frame_size(&self) -> i32 {
        self.max_size + self.max_args_size
    }
}
