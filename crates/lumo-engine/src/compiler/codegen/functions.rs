// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Function and closure compilation.
//!
//! A function body is compiled in a child frame into its own chunk. The
//! finished function becomes a constant of the enclosing chunk and is
//! instantiated with `PUSH_CLOSURE`, followed by one capture descriptor per
//! upvalue the body resolved.

use super::{CodegenResult, Compiler, Frame, FrameKind};
use crate::ast::*;
use crate::compiler::bytecode::OpCode;
use crate::compiler::error::CompileErrorKind;
use crate::runtime::value::{Function, Value};
use std::sync::Arc;
use tracing::debug;

/// Name given to anonymous function chunks.
const LAMBDA_NAME: &str = "<lambda>";

/// The body of a function being compiled.
#[derive(Clone, Copy)]
pub(super) enum Body<'a> {
    Block(&'a [Statement]),
    Expression(&'a Expression),
}

impl Compiler {
    pub(super) fn function_declaration(&mut self, decl: &FunctionDeclaration) -> CodegenResult {
        if self.at_global_scope() {
            // Globals are initialized only once their closure exists
            self.function(FrameKind::Function, &decl.id.name, &decl.params, Body::Block(&decl.body))?;
            let declared = self.declare_variable(&decl.id);
            self.define_variable(declared);
        } else {
            // Locals are declared first so the body can capture itself
            let declared = self.declare_variable(&decl.id);
            self.function(FrameKind::Function, &decl.id.name, &decl.params, Body::Block(&decl.body))?;
            self.define_variable(declared);
        }
        Ok(())
    }

    pub(super) fn arrow_function(&mut self, arrow: &ArrowFunctionExpression) -> CodegenResult {
        let body = match &arrow.body {
            ArrowBody::Expression(expr) => Body::Expression(expr),
            ArrowBody::Block(stmts) => Body::Block(stmts),
        };
        self.function(FrameKind::Function, LAMBDA_NAME, &arrow.params, body)
    }

    /// Compiles a function body in a child frame and emits the
    /// `PUSH_CLOSURE` that instantiates it.
    pub(super) fn function(
        &mut self,
        kind: FrameKind,
        name: &str,
        params: &[Identifier],
        body: Body<'_>,
    ) -> CodegenResult {
        let level = self.frames.len();
        let depth = self.frame().scope.depth + 1;
        let mut frame = Frame::new(kind, Some(name.to_string()), depth);
        // Slot 0 holds the callee, or the receiver in methods
        frame
            .scope
            .declare(if kind == FrameKind::Method { "self" } else { "" });
        self.frames.push(frame);

        let result = self.function_body(params, body);

        let frame = self.frame_mut();
        let chunk = std::mem::take(&mut frame.chunk);
        let upvalues = std::mem::take(&mut frame.upvalues);
        self.frames.truncate(level);
        result?;

        debug!(
            function = name,
            code = chunk.len(),
            constants = chunk.constants.len(),
            upvalues = upvalues.len(),
            "compiled function"
        );

        let function = Function::new(params.len() as u32, chunk);
        let index = self.make_constant(Value::Function(Arc::new(function)));
        self.emit_op_u32(OpCode::PushClosure, index);
        self.emit_u32(upvalues.len() as u32);
        for upvalue in upvalues {
            self.emit_byte(u8::from(upvalue.is_local));
            self.emit_u32(upvalue.index);
        }
        Ok(())
    }

    fn function_body(&mut self, params: &[Identifier], body: Body<'_>) -> CodegenResult {
        for param in params {
            if self.frame().scope.declared_in_current(&param.name) {
                self.report(
                    CompileErrorKind::RedeclaredVariable(param.name.clone()),
                    param.span,
                );
            }
            // Declared regardless so argument slots stay aligned
            self.frame_mut().scope.declare(param.name.clone());
        }

        match body {
            Body::Block(stmts) => {
                for stmt in stmts {
                    self.statement(stmt)?;
                }
            }
            Body::Expression(expr) => {
                self.expression(expr)?;
                self.emit_op(OpCode::Return);
            }
        }

        if !matches!(
            self.frame().last_op,
            Some(OpCode::Return | OpCode::ReturnVoid)
        ) {
            self.emit_op(OpCode::ReturnVoid);
        }
        Ok(())
    }

    /// `obj.name(args)` becomes a single `CALL_PROPERTY`; every other callee
    /// is evaluated and called with `CALL`.
    pub(super) fn call(&mut self, call: &CallExpression) -> CodegenResult {
        let argc = call.arguments.len() as u32;
        if let ExpressionKind::Member(member) = &call.callee.kind {
            self.expression(&member.object)?;
            for argument in &call.arguments {
                self.expression(argument)?;
            }
            let name = self.name_constant(&member.property.name);
            self.emit_op_u32(OpCode::CallProperty, name);
            self.emit_u32(argc);
            return Ok(());
        }

        self.expression(&call.callee)?;
        for argument in &call.arguments {
            self.expression(argument)?;
        }
        self.emit_op_u32(OpCode::Call, argc);
        Ok(())
    }
}
