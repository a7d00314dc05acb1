// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Name binding: declarations, lookups and scope exits.
//!
//! Lookup order is the current frame's locals, then upvalues (walking the
//! enclosing frames outward), then globals.

use super::{Compiler, UpvalueRef};
use crate::ast::Identifier;
use crate::compiler::bytecode::OpCode;
use crate::compiler::error::CompileErrorKind;

/// Where a resolved name lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Binding {
    Local(u32),
    Upvalue(u32),
    Global(u32),
}

impl Compiler {
    /// Returns true while compiling top-level script code outside any block.
    pub(super) fn at_global_scope(&self) -> bool {
        self.frames.len() == 1 && self.frame().scope.depth == 0
    }

    pub(super) fn begin_scope(&mut self) {
        self.frame_mut().scope.begin_scope();
    }

    /// Ends the innermost block scope and releases its locals.
    pub(super) fn end_scope(&mut self) {
        let depth = self.frame().scope.depth;
        self.release_locals(depth.saturating_sub(1));
        self.frame_mut().scope.end_scope();
    }

    /// Emits the code that drops every local declared deeper than `depth`,
    /// topmost first. Captured locals are closed with `CLOSE_UPVALUE`; runs of
    /// plain ones are popped together. The scope itself is left unchanged.
    pub(super) fn release_locals(&mut self, depth: usize) {
        let count = self.frame().scope.locals_above(depth).count();
        let top = self.frame().scope.locals.len();
        let mut run = 0u32;
        for slot in (top - count..top).rev() {
            if self.frame().scope.locals[slot].captured {
                self.pop_locals(run);
                run = 0;
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                run += 1;
            }
        }
        self.pop_locals(run);
    }

    fn pop_locals(&mut self, count: u32) {
        match count {
            0 => {}
            1 => {
                self.emit_op(OpCode::PopLocal);
            }
            n => {
                self.emit_op_u32(OpCode::PopnLocal, n);
            }
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Declares `id` in the current scope.
    ///
    /// At depth 0 of the script the name is a global that hoisting already
    /// created; it is marked initialized. Returns `None` after reporting a
    /// redeclaration.
    pub(super) fn declare_variable(&mut self, id: &Identifier) -> Option<Binding> {
        if self.at_global_scope() {
            return match self.globals.resolve(&id.name) {
                Some(slot) if self.globals.get(slot).is_some_and(|g| g.initialized) => {
                    self.report(CompileErrorKind::RedeclaredVariable(id.name.clone()), id.span);
                    None
                }
                Some(slot) => {
                    self.globals.mark_initialized(slot);
                    Some(Binding::Global(slot))
                }
                None => self.globals.declare(&id.name, true).map(Binding::Global),
            };
        }

        if self.frame().scope.declared_in_current(&id.name) {
            self.report(CompileErrorKind::RedeclaredVariable(id.name.clone()), id.span);
            return None;
        }
        let slot = self.frame_mut().scope.declare(id.name.clone());
        Some(Binding::Local(slot))
    }

    /// Moves the value on top of the stack into a declared variable. A
    /// failed declaration discards the value instead.
    pub(super) fn define_variable(&mut self, declared: Option<Binding>) {
        let op = match declared {
            Some(Binding::Global(_)) => OpCode::DefGlobal,
            Some(Binding::Local(_)) => OpCode::DefLocal,
            Some(Binding::Upvalue(_)) | None => OpCode::Pop,
        };
        self.emit_op(op);
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolves a name, reporting it if nothing matches.
    pub(super) fn resolve(&mut self, id: &Identifier) -> Option<Binding> {
        let level = self.frames.len() - 1;
        if let Some(slot) = self.frame().scope.resolve(&id.name) {
            return Some(Binding::Local(slot));
        }
        if let Some(index) = self.resolve_upvalue(level, &id.name) {
            return Some(Binding::Upvalue(index));
        }
        if let Some(slot) = self.globals.resolve(&id.name) {
            let initialized = self.globals.get(slot).is_some_and(|g| g.initialized);
            // Function bodies run after all top-level code. Blocks and loops
            // in the script are not checked either
            if !initialized && self.at_global_scope() {
                self.report(
                    CompileErrorKind::UsedBeforeInitialized(id.name.clone()),
                    id.span,
                );
                return None;
            }
            return Some(Binding::Global(slot));
        }
        self.report(CompileErrorKind::UndeclaredVariable(id.name.clone()), id.span);
        None
    }

    /// Finds `name` in the frames enclosing `level`, threading an upvalue
    /// through every frame in between.
    fn resolve_upvalue(&mut self, level: usize, name: &str) -> Option<u32> {
        if level == 0 {
            return None;
        }
        let enclosing = level - 1;
        if let Some(slot) = self.frames[enclosing].scope.resolve(name) {
            self.frames[enclosing].scope.mark_captured(slot);
            return Some(self.add_upvalue(
                level,
                UpvalueRef {
                    is_local: true,
                    index: slot,
                },
            ));
        }
        let index = self.resolve_upvalue(enclosing, name)?;
        Some(self.add_upvalue(
            level,
            UpvalueRef {
                is_local: false,
                index,
            },
        ))
    }

    fn add_upvalue(&mut self, level: usize, upvalue: UpvalueRef) -> u32 {
        let upvalues = &mut self.frames[level].upvalues;
        if let Some(existing) = upvalues.iter().position(|u| *u == upvalue) {
            return existing as u32;
        }
        upvalues.push(upvalue);
        (upvalues.len() - 1) as u32
    }

    pub(super) fn emit_get(&mut self, binding: Binding) {
        match binding {
            Binding::Local(slot) => self.emit_op_u32(OpCode::GetLocal, slot),
            Binding::Upvalue(index) => self.emit_op_u32(OpCode::GetUpvalue, index),
            Binding::Global(slot) => self.emit_op_u32(OpCode::GetGlobal, slot),
        };
    }

    pub(super) fn emit_set(&mut self, binding: Binding) {
        match binding {
            Binding::Local(slot) => self.emit_op_u32(OpCode::SetLocal, slot),
            Binding::Upvalue(index) => self.emit_op_u32(OpCode::SetUpvalue, index),
            Binding::Global(slot) => self.emit_op_u32(OpCode::SetGlobal, slot),
        };
    }
}
