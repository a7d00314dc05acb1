// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode compiler for Lumo.
//!
//! Transforms AST into bytecode that can be persisted with [`crate::codec`]
//! or executed by the VM.
//!
//! # Module Structure
//!
//! - `bytecode`: Chunks, opcodes and the shared operand-width table
//! - `codegen`: Code generation from AST
//!   - `codegen::scope`: Scope management for variable resolution
//! - `disasm`: Human-readable listings
//! - `error`: Compile-time diagnostics
//! - `options`: Compiler configuration

pub mod bytecode;
pub mod codegen;
pub mod disasm;
pub mod error;
pub mod options;

pub use bytecode::{Chunk, Instruction, InstructionError, Metadata, OpCode, Operand};
pub use codegen::Compiler;
pub use disasm::disassemble;
pub use error::{CompileError, CompileErrorKind, CompileErrors};
pub use options::CompilerOptions;

use crate::ast::Program;

/// Compiles a program with the default options.
pub fn compile(program: &Program) -> Result<Chunk, CompileErrors> {
    compile_with_options(program, CompilerOptions::default())
}

/// Compiles a program.
pub fn compile_with_options(
    program: &Program,
    options: CompilerOptions,
) -> Result<Chunk, CompileErrors> {
    Compiler::new(options).compile(program)
}
