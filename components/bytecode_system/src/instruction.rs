//! Bytecode instruction representation
//!
//! Contains instruction structure and source line tracking.

use crate::opcode::Opcode;

/// A single bytecode instruction with optional source line
#[derive(Debug, Clone)]
pub struct Instruction {
    /// The opcode for this instruction
    pub opcode: Opcode,
    /// Source line, when the producer recorded one
    pub line: Option<u32>,
}

impl Instruction {
    /// Create a new instruction without a source line
    pub fn new(opcode: Opcode) -> Self {
        Self { opcode, line: None }
    }

    /// Create a new instruction tagged with a source line
    pub fn with_line(opcode: Opcode, line: u32) -> Self {
        Self {
            opcode,
            line: Some(line),
        }
    }
}
