// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode definitions.
//!
//! A [`Chunk`] is a flat byte buffer: each instruction is a one-byte
//! [`OpCode`] followed by its operands. Operands are little-endian `u32`s,
//! except the per-capture `is_local` flag of `PUSH_CLOSURE`, which is a
//! single byte. [`OpCode::operand_width`] is the width table shared by the
//! compiler, the codec, the disassembler and the interpreter.

use crate::ast::Span;
use crate::runtime::value::Value;

/// Width in bytes of a `u32` operand.
pub const OPERAND_WIDTH: usize = 4;

/// Width in bytes of one `PUSH_CLOSURE` capture descriptor.
pub const CAPTURE_WIDTH: usize = 1 + OPERAND_WIDTH;

/// Source position recorded for a single byte of code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Metadata {
    /// Byte offset in the source of the node that emitted this byte
    pub position: u32,
    /// Length of that node's span
    pub len: u32,
}

impl From<Span> for Metadata {
    fn from(span: Span) -> Self {
        Self {
            position: span.start,
            len: span.len,
        }
    }
}

/// A compiled function or program body.
///
/// `metadata` always has exactly one entry per byte of `code`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    /// Function name, `None` for the top-level script
    pub name: Option<String>,
    /// Opcodes and operands
    pub code: Vec<u8>,
    /// The constant pool
    pub constants: Vec<Value>,
    /// One source position per byte of `code`
    pub metadata: Vec<Metadata>,
}

impl Chunk {
    /// Creates a new empty chunk.
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Number of code bytes.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if no code has been emitted.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Appends one byte.
    pub fn write_byte(&mut self, byte: u8, span: Span) {
        self.code.push(byte);
        self.metadata.push(span.into());
    }

    /// Appends an opcode and returns its offset.
    pub fn write_op(&mut self, op: OpCode, span: Span) -> usize {
        let offset = self.code.len();
        self.write_byte(op as u8, span);
        offset
    }

    /// Appends a little-endian `u32` operand and returns its offset.
    pub fn write_u32(&mut self, value: u32, span: Span) -> usize {
        let offset = self.code.len();
        for byte in value.to_le_bytes() {
            self.write_byte(byte, span);
        }
        offset
    }

    /// Reads the `u32` operand starting at `offset`.
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.code.get(offset..offset + OPERAND_WIDTH)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Overwrites the `u32` operand at `offset`.
    ///
    /// Returns `false` without writing if the operand would not fit inside
    /// the emitted code.
    pub fn patch_u32(&mut self, offset: usize, value: u32) -> bool {
        match self.code.get_mut(offset..offset + OPERAND_WIDTH) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Adds a constant and returns its index.
    ///
    /// Structurally equal constants are stored once; the index of the
    /// existing entry is returned instead.
    pub fn add_constant(&mut self, value: Value) -> u32 {
        if let Some(index) = self.constants.iter().position(|c| *c == value) {
            return index as u32;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    /// Iterates over the decoded instructions of this chunk.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            code: &self.code,
            offset: 0,
        }
    }
}

/// Operation codes for the VM.
///
/// Discriminants are the encoded byte values and must stay in sync with
/// [`OpCode::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // Stack operations
    /// Push `constants[idx]`
    PushConst,
    /// Push a new closure over the function at `constants[idx]`
    PushClosure,
    /// Push true
    PushTrue,
    /// Push false
    PushFalse,
    /// Push nil
    PushNil,
    /// Push void
    PushVoid,
    /// Pop the top value
    Pop,

    // Variable operations
    /// Move the top value onto the locals stack
    DefLocal,
    /// Load a local slot
    GetLocal,
    /// Store to a local slot, leaving the value on the stack
    SetLocal,
    /// Drop the topmost local
    PopLocal,
    /// Drop the N topmost locals
    PopnLocal,
    /// Load through an upvalue
    GetUpvalue,
    /// Store through an upvalue
    SetUpvalue,
    /// Close upvalues over the topmost local, then drop it
    CloseUpvalue,
    /// Move the top value into the next global slot
    DefGlobal,
    /// Load a global slot
    GetGlobal,
    /// Store to a global slot
    SetGlobal,

    // Property operations
    /// Get a field or bound method
    GetProperty,
    /// Set a field
    SetProperty,

    // Calls
    /// Call a function
    Call,
    /// Look up and call a method in one step
    CallProperty,
    /// Move N closures into the record below them
    AppendMethods,

    // Control flow
    /// Unconditional forward jump
    Jump,
    /// Jump forward if the top value is true (peeks)
    JumpTrue,
    /// Jump forward if the top value is false (peeks)
    JumpFalse,
    /// Jump forward if the iterator on top is exhausted (peeks)
    JumpHasNoNext,
    /// Unconditional backward jump
    Loop,

    // Arithmetic
    /// Add
    Add,
    /// Subtract
    Sub,
    /// Multiply
    Mul,
    /// Divide
    Div,
    /// Modulo
    Mod,
    /// Negate
    Neg,

    // Comparison
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,

    // Logical
    /// Logical NOT
    Not,
    /// Logical AND of two evaluated booleans
    And,
    /// Logical OR of two evaluated booleans
    Or,
    /// Fail unless the top value is a boolean
    AssertBool,

    // Ranges and iteration
    /// Build an exclusive range
    MakeRange,
    /// Build an inclusive range
    MakeInclRange,
    /// Turn the top value into an iterator
    MakeIterator,
    /// Push the iterator's current element
    GetNext,
    /// Step the iterator
    Advance,

    // Returns
    /// Return the top value
    Return,
    /// Return void
    ReturnVoid,
    /// Stop the program successfully
    ExitSuccess,
}

impl OpCode {
    /// Every opcode, indexed by its byte value.
    pub const ALL: [OpCode; 52] = [
        OpCode::PushConst,
        OpCode::PushClosure,
        OpCode::PushTrue,
        OpCode::PushFalse,
        OpCode::PushNil,
        OpCode::PushVoid,
        OpCode::Pop,
        OpCode::DefLocal,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::PopLocal,
        OpCode::PopnLocal,
        OpCode::GetUpvalue,
        OpCode::SetUpvalue,
        OpCode::CloseUpvalue,
        OpCode::DefGlobal,
        OpCode::GetGlobal,
        OpCode::SetGlobal,
        OpCode::GetProperty,
        OpCode::SetProperty,
        OpCode::Call,
        OpCode::CallProperty,
        OpCode::AppendMethods,
        OpCode::Jump,
        OpCode::JumpTrue,
        OpCode::JumpFalse,
        OpCode::JumpHasNoNext,
        OpCode::Loop,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Mod,
        OpCode::Neg,
        OpCode::Eq,
        OpCode::Ne,
        OpCode::Lt,
        OpCode::Le,
        OpCode::Gt,
        OpCode::Ge,
        OpCode::Not,
        OpCode::And,
        OpCode::Or,
        OpCode::AssertBool,
        OpCode::MakeRange,
        OpCode::MakeInclRange,
        OpCode::MakeIterator,
        OpCode::GetNext,
        OpCode::Advance,
        OpCode::Return,
        OpCode::ReturnVoid,
        OpCode::ExitSuccess,
    ];

    /// Decodes an opcode byte.
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Fixed operand width in bytes.
    ///
    /// For `PUSH_CLOSURE` this is only the fixed prefix (constant index and
    /// capture count); each capture adds [`CAPTURE_WIDTH`] more bytes.
    pub fn operand_width(self) -> usize {
        match self {
            OpCode::PushClosure | OpCode::CallProperty => 2 * OPERAND_WIDTH,
            OpCode::PushConst
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::PopnLocal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::GetProperty
            | OpCode::SetProperty
            | OpCode::Call
            | OpCode::AppendMethods
            | OpCode::Jump
            | OpCode::JumpTrue
            | OpCode::JumpFalse
            | OpCode::JumpHasNoNext
            | OpCode::Loop => OPERAND_WIDTH,
            _ => 0,
        }
    }

    /// Returns true for opcodes whose operand is a relative jump offset.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpTrue
                | OpCode::JumpFalse
                | OpCode::JumpHasNoNext
                | OpCode::Loop
        )
    }

    /// The mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::PushConst => "PUSH_CONST",
            OpCode::PushClosure => "PUSH_CLOSURE",
            OpCode::PushTrue => "PUSH_TRUE",
            OpCode::PushFalse => "PUSH_FALSE",
            OpCode::PushNil => "PUSH_NIL",
            OpCode::PushVoid => "PUSH_VOID",
            OpCode::Pop => "POP",
            OpCode::DefLocal => "DEF_LOCAL",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::SetLocal => "SET_LOCAL",
            OpCode::PopLocal => "POP_LOCAL",
            OpCode::PopnLocal => "POPN_LOCAL",
            OpCode::GetUpvalue => "GET_UPVALUE",
            OpCode::SetUpvalue => "SET_UPVALUE",
            OpCode::CloseUpvalue => "CLOSE_UPVALUE",
            OpCode::DefGlobal => "DEF_GLOBAL",
            OpCode::GetGlobal => "GET_GLOBAL",
            OpCode::SetGlobal => "SET_GLOBAL",
            OpCode::GetProperty => "GET_PROPERTY",
            OpCode::SetProperty => "SET_PROPERTY",
            OpCode::Call => "CALL",
            OpCode::CallProperty => "CALL_PROPERTY",
            OpCode::AppendMethods => "APPEND_METHODS",
            OpCode::Jump => "JUMP",
            OpCode::JumpTrue => "JUMP_TRUE",
            OpCode::JumpFalse => "JUMP_FALSE",
            OpCode::JumpHasNoNext => "JUMP_HAS_NO_NEXT",
            OpCode::Loop => "LOOP",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Neg => "NEG",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Gt => "GT",
            OpCode::Ge => "GE",
            OpCode::Not => "NOT",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::AssertBool => "ASSERT_BOOL",
            OpCode::MakeRange => "MAKE_RANGE",
            OpCode::MakeInclRange => "MAKE_INCL_RANGE",
            OpCode::MakeIterator => "MAKE_ITERATOR",
            OpCode::GetNext => "GET_NEXT",
            OpCode::Advance => "ADVANCE",
            OpCode::Return => "RETURN",
            OpCode::ReturnVoid => "RETURN_VOID",
            OpCode::ExitSuccess => "EXIT_SUCCESS",
        }
    }
}

/// A decoded instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Constant pool index
    Constant(u32),
    /// Local, upvalue or global slot
    Slot(u32),
    /// Argument, method, capture or pop count
    Count(u32),
    /// Relative jump distance
    Jump(u32),
    /// One `PUSH_CLOSURE` capture descriptor
    Capture {
        /// Captures a local of the enclosing frame rather than one of its upvalues
        is_local: bool,
        /// Slot in the enclosing frame's locals or upvalues
        index: u32,
    },
}

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset of the opcode byte
    pub offset: usize,
    /// The operation code
    pub opcode: OpCode,
    /// Operands, in encoding order
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Encoded size of the instruction, opcode byte included.
    pub fn len(&self) -> usize {
        let captures = self
            .operands
            .iter()
            .filter(|op| matches!(op, Operand::Capture { .. }))
            .count();
        1 + self.opcode.operand_width() + captures * CAPTURE_WIDTH
    }

    /// Offset of the next instruction.
    pub fn next_offset(&self) -> usize {
        self.offset + self.len()
    }

    /// Absolute target of a jump instruction.
    pub fn jump_target(&self) -> Option<usize> {
        let Some(Operand::Jump(distance)) = self.operands.first() else {
            return None;
        };
        let after = self.next_offset();
        if self.opcode == OpCode::Loop {
            after.checked_sub(*distance as usize)
        } else {
            Some(after + *distance as usize)
        }
    }
}

/// Error produced when code bytes do not form a valid instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InstructionError {
    /// Byte is not an opcode
    #[error("unknown opcode 0x{byte:02x} at offset {offset}")]
    UnknownOpcode {
        /// Offset of the byte
        offset: usize,
        /// The byte
        byte: u8,
    },
    /// Operands run past the end of the code
    #[error("truncated operands for {opcode:?} at offset {offset}")]
    Truncated {
        /// Offset of the opcode
        offset: usize,
        /// The opcode
        opcode: OpCode,
    },
}

/// Iterator over the instructions of a chunk.
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: usize,
}

impl Instructions<'_> {
    fn read_u32(&self, at: usize) -> Option<u32> {
        let bytes = self.code.get(at..at + OPERAND_WIDTH)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn decode(&self, offset: usize) -> Result<Instruction, InstructionError> {
        let byte = self.code[offset];
        let opcode =
            OpCode::from_byte(byte).ok_or(InstructionError::UnknownOpcode { offset, byte })?;
        let truncated = InstructionError::Truncated { offset, opcode };
        let at = offset + 1;
        let mut operands = Vec::new();

        match opcode {
            OpCode::PushConst | OpCode::GetProperty | OpCode::SetProperty => {
                operands.push(Operand::Constant(self.read_u32(at).ok_or(truncated)?));
            }
            OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::GetGlobal
            | OpCode::SetGlobal => {
                operands.push(Operand::Slot(self.read_u32(at).ok_or(truncated)?));
            }
            OpCode::Call | OpCode::AppendMethods | OpCode::PopnLocal => {
                operands.push(Operand::Count(self.read_u32(at).ok_or(truncated)?));
            }
            OpCode::CallProperty => {
                operands.push(Operand::Constant(self.read_u32(at).ok_or(truncated)?));
                operands.push(Operand::Count(
                    self.read_u32(at + OPERAND_WIDTH).ok_or(truncated)?,
                ));
            }
            OpCode::PushClosure => {
                operands.push(Operand::Constant(self.read_u32(at).ok_or(truncated)?));
                let count = self.read_u32(at + OPERAND_WIDTH).ok_or(truncated)?;
                operands.push(Operand::Count(count));
                let mut cursor = at + 2 * OPERAND_WIDTH;
                for _ in 0..count {
                    let is_local = *self.code.get(cursor).ok_or(truncated)? != 0;
                    let index = self.read_u32(cursor + 1).ok_or(truncated)?;
                    operands.push(Operand::Capture { is_local, index });
                    cursor += CAPTURE_WIDTH;
                }
            }
            op if op.is_jump() => {
                operands.push(Operand::Jump(self.read_u32(at).ok_or(truncated)?));
            }
            _ => {}
        }

        Ok(Instruction {
            offset,
            opcode,
            operands,
        })
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<Instruction, InstructionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.code.len() {
            return None;
        }
        match self.decode(self.offset) {
            Ok(instruction) => {
                self.offset = instruction.next_offset();
                Some(Ok(instruction))
            }
            Err(err) => {
                // Stop after the first malformed instruction
                self.offset = self.code.len();
                Some(Err(err))
            }
        }
    }
}
