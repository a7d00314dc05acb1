// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Code generation from AST to bytecode.
//!
//! This module contains the [`Compiler`], which lowers a parsed [`Program`]
//! into a script [`Chunk`]. Each function body gets its own compiler frame
//! and its own chunk; frames live on an explicit stack and the innermost one
//! receives all emitted code.
//!
//! # Module Structure
//!
//! - `scope`: locals, globals and upvalue descriptors
//! - `bindings`: declaring and resolving names, scope entry and exit
//! - `control`: jumps, backpatching and loop lowering
//! - `functions`: nested function bodies and closures
//! - `records`: record declarations and property access

mod bindings;
mod control;
mod functions;
mod records;
mod scope;

#[cfg(test)]
mod tests;

pub use scope::{Global, GlobalTable, Local, Scope, UpvalueRef};

use crate::ast::*;
use crate::compiler::bytecode::{Chunk, OpCode};
use crate::compiler::error::{CompileError, CompileErrorKind, CompileErrors};
use crate::compiler::options::CompilerOptions;
use crate::runtime::value::Value;
use control::LoopContext;
use tracing::{debug, trace};

/// Result of a codegen step. Only fatal errors travel through `Err`;
/// semantic errors are collected with [`Compiler::report`].
type CodegenResult<T = ()> = Result<T, CompileError>;

/// What kind of body a frame compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Script,
    Function,
    Method,
}

/// Per-function compilation state.
#[derive(Debug)]
struct Frame {
    chunk: Chunk,
    scope: Scope,
    upvalues: Vec<UpvalueRef>,
    loops: Vec<LoopContext>,
    kind: FrameKind,
    /// Last opcode emitted, cleared when a jump lands after it
    last_op: Option<OpCode>,
}

impl Frame {
    fn new(kind: FrameKind, name: Option<String>, depth: usize) -> Self {
        Self {
            chunk: Chunk::new(name),
            scope: Scope::new(depth),
            upvalues: Vec::new(),
            loops: Vec::new(),
            kind,
            last_op: None,
        }
    }
}

/// Compiles AST to bytecode.
///
/// ```rust
/// use lumo_engine::ast::builder::*;
/// use lumo_engine::compiler::{Compiler, CompilerOptions};
///
/// let program = program(vec![fn_decl("main", &[], vec![])]);
/// let chunk = Compiler::new(CompilerOptions::default())
///     .compile(&program)
///     .unwrap();
/// assert_eq!(chunk.metadata.len(), chunk.code.len());
/// ```
#[derive(Debug)]
pub struct Compiler {
    /// Frame stack; index 0 is the script
    frames: Vec<Frame>,
    globals: GlobalTable,
    diagnostics: Vec<CompileError>,
    panic_mode: bool,
    options: CompilerOptions,
    /// Span of the node being compiled, recorded for every emitted byte
    span: Span,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl Compiler {
    /// Creates a new compiler. Host natives are declared as initialized
    /// globals, in order, before anything else.
    pub fn new(options: CompilerOptions) -> Self {
        let mut globals = GlobalTable::new();
        for name in &options.natives {
            globals.declare(name, true);
        }
        Self {
            frames: vec![Frame::new(FrameKind::Script, None, 0)],
            globals,
            diagnostics: Vec::new(),
            panic_mode: false,
            options,
            span: Span::default(),
        }
    }

    /// Returns the global table.
    pub fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    // ========================================================================
    // Main Compilation Entry Point
    // ========================================================================

    /// Compiles a program into its script chunk.
    ///
    /// Every diagnostic found is returned; any diagnostic discards the chunk.
    pub fn compile(mut self, program: &Program) -> Result<Chunk, CompileErrors> {
        if let Err(fatal) = self.compile_program(program) {
            self.diagnostics.push(fatal);
        }
        if !self.diagnostics.is_empty() {
            debug!(errors = self.diagnostics.len(), "compilation failed");
            return Err(CompileErrors(self.diagnostics));
        }

        let script = std::mem::take(&mut self.frame_mut().chunk);
        debug!(
            code = script.len(),
            constants = script.constants.len(),
            "compiled script"
        );
        Ok(script)
    }

    fn compile_program(&mut self, program: &Program) -> CodegenResult {
        self.hoist(&program.body);
        for stmt in &program.body {
            self.panic_mode = false;
            self.statement(stmt)?;
        }
        self.panic_mode = false;
        self.span = Span::default();
        self.entry_call(program);
        Ok(())
    }

    /// Pre-declares every top-level `let`, `fn` and record name, in source
    /// order, so function bodies can refer to globals defined later.
    fn hoist(&mut self, statements: &[Statement]) {
        for stmt in statements {
            let name = match &stmt.kind {
                StatementKind::VariableDeclaration(decl) => &decl.id.name,
                StatementKind::FunctionDeclaration(decl) => &decl.id.name,
                StatementKind::RecordDeclaration(decl) => &decl.id.name,
                _ => continue,
            };
            // Duplicates are reported when the second declaration is compiled
            self.globals.declare(name, false);
        }
        debug!(
            globals = self.globals.len(),
            natives = self.options.natives.len(),
            "hoisted top-level declarations"
        );
    }

    /// Emits `GET_GLOBAL main; CALL 0; POP; EXIT_SUCCESS`.
    fn entry_call(&mut self, program: &Program) {
        let entry = self.options.entry_point.clone();
        let declared = program.body.iter().any(|stmt| {
            matches!(&stmt.kind, StatementKind::FunctionDeclaration(decl) if decl.id.name == entry)
        });
        match self.globals.resolve(&entry) {
            Some(slot) if declared => {
                self.emit_op_u32(OpCode::GetGlobal, slot);
                self.emit_op_u32(OpCode::Call, 0);
                self.emit_op(OpCode::Pop);
                self.emit_op(OpCode::ExitSuccess);
            }
            _ => self.report(CompileErrorKind::MissingEntryFunction(entry), Span::default()),
        }
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Records a semantic error unless one was already reported for the
    /// current top-level statement.
    fn report(&mut self, kind: CompileErrorKind, span: Span) {
        if self.panic_mode {
            trace!(error = %kind, "suppressed diagnostic");
            return;
        }
        self.panic_mode = true;
        debug!(error = %kind, start = span.start, len = span.len, "diagnostic");
        self.diagnostics.push(CompileError::new(kind, span));
    }

    // ========================================================================
    // Emit helpers
    // ========================================================================

    fn frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    fn current_offset(&self) -> usize {
        self.frame().chunk.len()
    }

    fn emit_op(&mut self, op: OpCode) -> usize {
        let span = self.span;
        let frame = self.frame_mut();
        frame.last_op = Some(op);
        frame.chunk.write_op(op, span)
    }

    fn emit_byte(&mut self, byte: u8) {
        let span = self.span;
        self.frame_mut().chunk.write_byte(byte, span);
    }

    /// Emits a `u32` operand and returns its offset.
    fn emit_u32(&mut self, value: u32) -> usize {
        let span = self.span;
        self.frame_mut().chunk.write_u32(value, span)
    }

    fn emit_op_u32(&mut self, op: OpCode, operand: u32) -> usize {
        let offset = self.emit_op(op);
        self.emit_u32(operand);
        offset
    }

    fn make_constant(&mut self, value: Value) -> u32 {
        self.frame_mut().chunk.add_constant(value)
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op_u32(OpCode::PushConst, index);
    }

    fn name_constant(&mut self, name: &str) -> u32 {
        self.make_constant(Value::from(name))
    }

    // ========================================================================
    // Statement Compilation
    // ========================================================================

    fn statement(&mut self, stmt: &Statement) -> CodegenResult {
        let saved = std::mem::replace(&mut self.span, stmt.span);
        let result = self.statement_kind(stmt);
        self.span = saved;
        result
    }

    fn statement_kind(&mut self, stmt: &Statement) -> CodegenResult {
        match &stmt.kind {
            StatementKind::VariableDeclaration(decl) => {
                self.expression(&decl.init)?;
                let declared = self.declare_variable(&decl.id);
                self.define_variable(declared);
                Ok(())
            }
            StatementKind::FunctionDeclaration(decl) => self.function_declaration(decl),
            StatementKind::RecordDeclaration(decl) => self.record_declaration(decl),
            StatementKind::Expression(expr) => self.expression_statement(expr),
            StatementKind::Block(block) => {
                self.begin_scope();
                for stmt in &block.body {
                    self.statement(stmt)?;
                }
                self.end_scope();
                Ok(())
            }
            StatementKind::If(if_stmt) => self.if_statement(if_stmt),
            StatementKind::While(while_stmt) => self.while_statement(while_stmt),
            StatementKind::Loop(loop_stmt) => self.loop_statement(loop_stmt),
            StatementKind::ForIn(for_in) => self.for_in_statement(for_in),
            StatementKind::For(for_stmt) => self.for_statement(for_stmt),
            StatementKind::Return(ret) => self.return_statement(ret),
            StatementKind::Break => self.loop_exit(false),
            StatementKind::Continue => self.loop_exit(true),
        }
    }

    fn expression_statement(&mut self, expr: &Expression) -> CodegenResult {
        if self.options.strip_pure_expressions {
            match &expr.kind {
                ExpressionKind::Literal(_) => return Ok(()),
                ExpressionKind::Identifier(id) => {
                    // Still resolved so undeclared names are reported
                    self.resolve(id);
                    return Ok(());
                }
                _ => {}
            }
        }
        self.expression(expr)?;
        self.emit_op(OpCode::Pop);
        Ok(())
    }

    fn return_statement(&mut self, ret: &ReturnStatement) -> CodegenResult {
        if self.frame().kind == FrameKind::Script {
            self.report(CompileErrorKind::ReturnOutsideFunction, self.span);
            return Ok(());
        }
        match &ret.argument {
            Some(argument) => {
                self.expression(argument)?;
                self.emit_op(OpCode::Return);
            }
            None => {
                self.emit_op(OpCode::ReturnVoid);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Expression Compilation
    // ========================================================================

    fn expression(&mut self, expr: &Expression) -> CodegenResult {
        let saved = std::mem::replace(&mut self.span, expr.span);
        let result = self.expression_kind(expr);
        self.span = saved;
        result
    }

    fn expression_kind(&mut self, expr: &Expression) -> CodegenResult {
        match &expr.kind {
            ExpressionKind::Literal(lit) => {
                self.literal(lit);
                Ok(())
            }
            ExpressionKind::Identifier(id) => {
                match self.resolve(id) {
                    Some(binding) => self.emit_get(binding),
                    None => {
                        self.emit_op(OpCode::PushNil);
                    }
                }
                Ok(())
            }
            ExpressionKind::Binary(binary) => {
                self.expression(&binary.left)?;
                self.expression(&binary.right)?;
                self.emit_op(binary_opcode(binary.operator));
                Ok(())
            }
            ExpressionKind::Logical(logical) => self.logical(logical),
            ExpressionKind::Unary(unary) => {
                self.expression(&unary.argument)?;
                self.emit_op(match unary.operator {
                    UnaryOperator::Minus => OpCode::Neg,
                    UnaryOperator::Not => OpCode::Not,
                });
                Ok(())
            }
            ExpressionKind::Assignment(assign) => self.assignment(assign),
            ExpressionKind::Call(call) => self.call(call),
            ExpressionKind::Member(member) => {
                self.expression(&member.object)?;
                let name = self.name_constant(&member.property.name);
                self.emit_op_u32(OpCode::GetProperty, name);
                Ok(())
            }
            ExpressionKind::Range(range) => {
                self.expression(&range.start)?;
                self.expression(&range.end)?;
                self.emit_op(if range.inclusive {
                    OpCode::MakeInclRange
                } else {
                    OpCode::MakeRange
                });
                Ok(())
            }
            ExpressionKind::Arrow(arrow) => self.arrow_function(arrow),
        }
    }

    fn literal(&mut self, lit: &Literal) {
        match lit {
            Literal::Int(n) => self.emit_constant(Value::Int(*n)),
            Literal::Float(n) => self.emit_constant(Value::Float(*n)),
            Literal::String(s) => self.emit_constant(Value::from(s.as_str())),
            Literal::Char(c) => self.emit_constant(Value::Char(*c)),
            Literal::Bool(true) => {
                self.emit_op(OpCode::PushTrue);
            }
            Literal::Bool(false) => {
                self.emit_op(OpCode::PushFalse);
            }
            Literal::Nil => {
                self.emit_op(OpCode::PushNil);
            }
            Literal::Void => {
                self.emit_op(OpCode::PushVoid);
            }
        }
    }

    fn assignment(&mut self, assign: &AssignmentExpression) -> CodegenResult {
        match &assign.target.kind {
            ExpressionKind::Identifier(id) => {
                self.expression(&assign.value)?;
                // On error the value stays on the stack as the result
                if let Some(binding) = self.resolve(id) {
                    self.emit_set(binding);
                }
            }
            ExpressionKind::Member(member) => {
                self.expression(&member.object)?;
                self.expression(&assign.value)?;
                let name = self.name_constant(&member.property.name);
                self.emit_op_u32(OpCode::SetProperty, name);
            }
            _ => {
                self.report(CompileErrorKind::InvalidAssignmentTarget, assign.target.span);
                self.expression(&assign.value)?;
            }
        }
        Ok(())
    }
}

fn binary_opcode(operator: BinaryOperator) -> OpCode {
    match operator {
        BinaryOperator::Add => OpCode::Add,
        BinaryOperator::Subtract => OpCode::Sub,
        BinaryOperator::Multiply => OpCode::Mul,
        BinaryOperator::Divide => OpCode::Div,
        BinaryOperator::Modulo => OpCode::Mod,
        BinaryOperator::Equal => OpCode::Eq,
        BinaryOperator::NotEqual => OpCode::Ne,
        BinaryOperator::LessThan => OpCode::Lt,
        BinaryOperator::LessThanEqual => OpCode::Le,
        BinaryOperator::GreaterThan => OpCode::Gt,
        BinaryOperator::GreaterThanEqual => OpCode::Ge,
        BinaryOperator::And => OpCode::And,
        BinaryOperator::Or => OpCode::Or,
    }
}
