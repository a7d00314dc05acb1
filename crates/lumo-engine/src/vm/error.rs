// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime errors.

use thiserror::Error;

/// Errors raised while executing bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Byte at `offset` is not an opcode
    #[error("invalid opcode 0x{byte:02x} at offset {offset}")]
    InvalidOpcode {
        /// The byte
        byte: u8,
        /// Where it was read
        offset: usize,
    },

    /// Operands run past the end of the code
    #[error("truncated instruction at offset {0}")]
    Truncated(usize),

    /// Backward jump before the start of the code
    #[error("jump at offset {0} leaves the chunk")]
    InvalidJump(usize),

    /// Execution ran off the end of a chunk
    #[error("execution ran past the end of `{0}`")]
    UnexpectedEnd(String),

    /// Pop from an empty stack
    #[error("value stack underflow")]
    StackUnderflow,

    /// Too many nested calls
    #[error("call stack overflow")]
    StackOverflow,

    /// Constant index out of range, or constant of the wrong kind
    #[error("invalid constant {0}")]
    InvalidConstant(u32),

    /// Local slot out of range
    #[error("invalid local slot {0}")]
    InvalidLocal(usize),

    /// Upvalue index out of range
    #[error("invalid upvalue {0}")]
    InvalidUpvalue(u32),

    /// Global read before its `DEF_GLOBAL` ran
    #[error("global slot {0} is not defined")]
    UndefinedGlobal(u32),

    /// Operand types not supported by an operation
    #[error("cannot apply `{operation}` to {left} and {right}")]
    TypeMismatch {
        /// The operation
        operation: &'static str,
        /// Type of the left operand
        left: &'static str,
        /// Type of the right operand
        right: &'static str,
    },

    /// An operation expected a specific type
    #[error("`{operation}` expected {expected}, found {found}")]
    UnexpectedType {
        /// The operation
        operation: &'static str,
        /// What it needed
        expected: &'static str,
        /// What it got
        found: &'static str,
    },

    /// Callee is not a function, record or bound method
    #[error("{0} is not callable")]
    NotCallable(&'static str),

    /// Wrong number of arguments
    #[error("`{name}` expects {expected} arguments, got {found}")]
    ArityMismatch {
        /// Callee name
        name: String,
        /// Declared arity
        expected: u32,
        /// Arguments passed
        found: u32,
    },

    /// Field or method not found
    #[error("{type_name} has no property `{property}`")]
    NoSuchProperty {
        /// The property
        property: String,
        /// Type or record name of the receiver
        type_name: String,
    },

    /// Integer division or modulo by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Integer arithmetic overflowed
    #[error("integer overflow in `{0}`")]
    IntegerOverflow(&'static str),

    /// A host function failed
    #[error("native function `{name}` failed: {message}")]
    Native {
        /// Function name
        name: String,
        /// The error it returned
        message: String,
    },
}
