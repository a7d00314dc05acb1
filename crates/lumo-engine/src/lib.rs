// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # lumo-engine
//!
//! Bytecode compiler for the Lumo scripting language.
//!
//! ## Overview
//!
//! This crate provides:
//! - An AST with source spans, and a `builder` for constructing it
//! - A single-pass bytecode compiler with lexical scoping, closures and records
//! - A binary codec for compiled chunks
//! - A disassembler
//! - A reference interpreter for the emitted bytecode
//!
//! ## Quick Start
//!
//! ```rust
//! use lumo_engine::ast::builder::*;
//! use lumo_engine::{Engine, Value};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! let mut engine = Engine::new();
//! engine.define_native("print", 1, move |args| {
//!     sink.lock().unwrap().extend_from_slice(args);
//!     Ok(Value::Void)
//! });
//!
//! let program = program(vec![fn_decl(
//!     "main",
//!     &[],
//!     vec![expr_stmt(call(ident("print"), vec![add(int(1), int(2))]))],
//! )]);
//! engine.run(&program)?;
//! assert_eq!(*seen.lock().unwrap(), vec![Value::Int(3)]);
//! # Ok::<(), lumo_engine::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod codec;
pub mod compiler;
pub mod runtime;
pub mod vm;

// Re-exports for convenience
pub use codec::CodecError;
pub use compiler::{Chunk, CompileErrors, CompilerOptions, compile, compile_with_options};
pub use runtime::value::Value;
pub use vm::{RuntimeError, VM};

use thiserror::Error;

/// Compiler, VM and native registrations kept in step.
///
/// Natives occupy the first global slots, so the compiler and the VM must
/// agree on their order. `Engine` registers each native with both.
pub struct Engine {
    options: CompilerOptions,
    vm: VM,
}

impl Engine {
    /// Creates an engine with default compiler options and no natives.
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    /// Creates an engine with the given options.
    ///
    /// Any names already in `options.natives` have no host callback; define
    /// them with [`Engine::define_native`] instead.
    pub fn with_options(mut options: CompilerOptions) -> Self {
        options.natives.clear();
        Self {
            options,
            vm: VM::new(),
        }
    }

    /// Registers a host function as the next native global.
    pub fn define_native<F>(&mut self, name: &str, arity: u32, callback: F) -> &mut Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.options.natives.push(name.to_string());
        self.vm.define_native(name, arity, callback);
        self
    }

    /// The options programs are compiled with.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// The interpreter, for inspecting globals after a run.
    pub fn vm(&self) -> &VM {
        &self.vm
    }

    /// Compiles a program.
    pub fn compile(&self, program: &ast::Program) -> Result<Chunk> {
        Ok(compile_with_options(program, self.options.clone())?)
    }

    /// Compiles and runs a program.
    pub fn run(&mut self, program: &ast::Program) -> Result<()> {
        let chunk = self.compile(program)?;
        self.run_chunk(&chunk)
    }

    /// Runs an already compiled chunk.
    pub fn run_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        Ok(self.vm.run(chunk)?)
    }

    /// Decodes and runs an encoded chunk.
    pub fn run_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let chunk = Chunk::decode(bytes)?;
        self.run_chunk(&chunk)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from any stage of the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The program has semantic errors
    #[error("compilation failed:\n{0}")]
    Compile(#[from] CompileErrors),

    /// A chunk could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Execution failed
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
