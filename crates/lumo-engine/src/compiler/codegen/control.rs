// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Control flow lowering.
//!
//! Forward jumps are emitted with a placeholder operand and backpatched once
//! the target is known; the operand is the distance from the end of the
//! operand to the target. `LOOP` carries the distance back to the loop start.
//!
//! Every loop has a *test site*: a `JUMP_FALSE` to the exit followed by a
//! `POP`, placed before the loop's normal entry. `break` pushes `false` and
//! `continue` pushes `true` before jumping back to it, so both share one
//! protocol across all loop kinds.
//!
//! ## If Statement
//!
//! ```text
//!   [test]
//!   JUMP_FALSE else
//!   POP
//!   [consequent]
//!   JUMP end
//! else:
//!   POP
//!   [alternate]
//! end:
//! ```
//!
//! ## While Loop
//!
//! ```text
//!   JUMP cond
//! test:
//!   JUMP_FALSE exit
//!   POP
//! cond:
//!   [test]
//!   JUMP_FALSE exit
//!   POP
//!   [body]
//!   LOOP cond
//! exit:
//!   POP
//! ```
//!
//! ## For-In Loop
//!
//! ```text
//!   [iterable]
//!   MAKE_ITERATOR
//!   JUMP next
//! test:
//!   JUMP_FALSE exit
//!   POP
//! advance:
//!   ADVANCE
//! next:
//!   JUMP_HAS_NO_NEXT done
//!   GET_NEXT
//!   DEF_LOCAL x          ; fresh scope per iteration
//!   [body]
//!   [release x]
//!   LOOP advance
//! exit:
//!   POP                  ; the break flag
//! done:
//!   POP                  ; the iterator
//! ```

use super::bindings::Binding;
use super::{CodegenResult, Compiler};
use crate::ast::*;
use crate::compiler::bytecode::{OPERAND_WIDTH, OpCode};
use crate::compiler::error::{CompileError, CompileErrorKind};

/// Placeholder written into a forward jump until it is patched.
const JUMP_PLACEHOLDER: u32 = u32::MAX;

/// A loop being compiled.
#[derive(Debug, Clone, Copy)]
pub(super) struct LoopContext {
    /// Offset of the loop's `JUMP_FALSE` test site
    test_site: usize,
    /// Locals deeper than this are released by `break`/`continue`
    depth: usize,
    /// For-var loops copy the per-iteration variable back to the outer one
    carry: Option<Carry>,
}

/// Slots of a for-var loop variable: the outer one the update sees and the
/// per-iteration one the body sees.
#[derive(Debug, Clone, Copy)]
struct Carry {
    outer: u32,
    inner: u32,
}

impl Compiler {
    // ========================================================================
    // Jumps
    // ========================================================================

    /// Emits a forward jump and returns the offset of its operand.
    pub(super) fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_u32(JUMP_PLACEHOLDER)
    }

    /// Points the jump whose operand is at `operand` to the current offset.
    pub(super) fn patch_jump(&mut self, operand: usize) -> CodegenResult {
        let target = self.current_offset();
        let distance = target
            .checked_sub(operand + OPERAND_WIDTH)
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| self.backpatch_error(operand))?;
        if !self.frame_mut().chunk.patch_u32(operand, distance) {
            return Err(self.backpatch_error(operand));
        }
        // Code after the last instruction is now reachable by a jump
        self.frame_mut().last_op = None;
        Ok(())
    }

    /// Emits a backward jump to `loop_start`.
    pub(super) fn emit_loop(&mut self, loop_start: usize) -> CodegenResult {
        self.emit_op(OpCode::Loop);
        let operand = self.current_offset();
        let distance = (operand + OPERAND_WIDTH)
            .checked_sub(loop_start)
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| self.backpatch_error(operand))?;
        self.emit_u32(distance);
        Ok(())
    }

    fn backpatch_error(&self, offset: usize) -> CompileError {
        CompileError::new(CompileErrorKind::BackpatchRange { offset }, self.span)
    }

    /// Emits a test site: `JUMP_FALSE exit; POP`. Returns its offset and the
    /// operand to patch to the exit.
    fn test_site(&mut self) -> (usize, usize) {
        let site = self.current_offset();
        let exit = self.emit_jump(OpCode::JumpFalse);
        self.emit_op(OpCode::Pop);
        (site, exit)
    }

    fn push_loop(&mut self, test_site: usize, depth: usize, carry: Option<Carry>) {
        self.frame_mut().loops.push(LoopContext {
            test_site,
            depth,
            carry,
        });
    }

    fn pop_loop(&mut self) {
        self.frame_mut().loops.pop();
    }

    // ========================================================================
    // Statements
    // ========================================================================

    pub(super) fn if_statement(&mut self, stmt: &IfStatement) -> CodegenResult {
        self.expression(&stmt.test)?;
        let else_jump = self.emit_jump(OpCode::JumpFalse);
        self.emit_op(OpCode::Pop);
        self.statement(&stmt.consequent)?;
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump)?;
        self.emit_op(OpCode::Pop);
        if let Some(alternate) = &stmt.alternate {
            self.statement(alternate)?;
        }
        self.patch_jump(end_jump)
    }

    pub(super) fn while_statement(&mut self, stmt: &WhileStatement) -> CodegenResult {
        let entry = self.emit_jump(OpCode::Jump);
        let (test_site, test_exit) = self.test_site();
        self.patch_jump(entry)?;

        let cond_start = self.current_offset();
        self.expression(&stmt.test)?;
        let exit = self.emit_jump(OpCode::JumpFalse);
        self.emit_op(OpCode::Pop);

        let depth = self.frame().scope.depth;
        self.push_loop(test_site, depth, None);
        self.statement(&stmt.body)?;
        self.pop_loop();
        self.emit_loop(cond_start)?;

        self.patch_jump(test_exit)?;
        self.patch_jump(exit)?;
        self.emit_op(OpCode::Pop);
        Ok(())
    }

    pub(super) fn loop_statement(&mut self, stmt: &LoopStatement) -> CodegenResult {
        let entry = self.emit_jump(OpCode::Jump);
        let (test_site, exit) = self.test_site();
        self.patch_jump(entry)?;

        let body_start = self.current_offset();
        let depth = self.frame().scope.depth;
        self.push_loop(test_site, depth, None);
        self.statement(&stmt.body)?;
        self.pop_loop();
        self.emit_loop(body_start)?;

        self.patch_jump(exit)?;
        self.emit_op(OpCode::Pop);
        Ok(())
    }

    pub(super) fn for_in_statement(&mut self, stmt: &ForInStatement) -> CodegenResult {
        self.expression(&stmt.iterable)?;
        self.emit_op(OpCode::MakeIterator);
        let entry = self.emit_jump(OpCode::Jump);
        let (test_site, exit) = self.test_site();
        let advance = self.current_offset();
        self.emit_op(OpCode::Advance);
        self.patch_jump(entry)?;

        let done = self.emit_jump(OpCode::JumpHasNoNext);
        self.emit_op(OpCode::GetNext);

        let depth = self.frame().scope.depth;
        self.push_loop(test_site, depth, None);
        self.begin_scope();
        let binding = self.declare_variable(&stmt.binding);
        self.define_variable(binding);
        self.statement(&stmt.body)?;
        self.end_scope();
        self.pop_loop();
        self.emit_loop(advance)?;

        self.patch_jump(exit)?;
        self.emit_op(OpCode::Pop);
        self.patch_jump(done)?;
        self.emit_op(OpCode::Pop);
        Ok(())
    }

    /// Lowers `for (let i = init; test; update) body`.
    ///
    /// The variable lives in an outer scope that the test and update see.
    /// Each iteration copies it into a fresh inner binding for the body and
    /// copies it back when the body finishes, so closures created by the
    /// body capture that iteration's value.
    ///
    /// ```text
    ///   [init]
    ///   DEF_LOCAL i          ; outer
    ///   JUMP cond
    /// test:
    ///   JUMP_FALSE exit
    ///   POP
    ///   [update]
    ///   POP
    /// cond:
    ///   [test]
    ///   JUMP_FALSE exit
    ///   POP
    ///   GET_LOCAL i
    ///   DEF_LOCAL i          ; inner
    ///   [body]
    ///   GET_LOCAL i          ; inner
    ///   [release inner scope]
    ///   SET_LOCAL i          ; outer
    ///   POP
    ///   PUSH_TRUE
    ///   LOOP test
    /// exit:
    ///   POP
    ///   [release i]
    /// ```
    pub(super) fn for_statement(&mut self, stmt: &ForStatement) -> CodegenResult {
        self.begin_scope();
        let loop_depth = self.frame().scope.depth;
        self.expression(&stmt.init.init)?;
        let outer = self.declare_variable(&stmt.init.id);
        self.define_variable(outer);

        let entry = self.emit_jump(OpCode::Jump);
        let (test_site, test_exit) = self.test_site();
        if let Some(update) = &stmt.update {
            self.expression(update)?;
            self.emit_op(OpCode::Pop);
        }
        self.patch_jump(entry)?;

        let cond_exit = match &stmt.test {
            Some(test) => {
                self.expression(test)?;
                let exit = self.emit_jump(OpCode::JumpFalse);
                self.emit_op(OpCode::Pop);
                Some(exit)
            }
            None => None,
        };

        self.begin_scope();
        let mut carry = None;
        if let Some(Binding::Local(outer)) = outer {
            self.emit_op_u32(OpCode::GetLocal, outer);
            let inner = self.declare_variable(&stmt.init.id);
            self.define_variable(inner);
            if let Some(Binding::Local(inner)) = inner {
                carry = Some(Carry { outer, inner });
            }
        }
        self.push_loop(test_site, loop_depth, carry);
        self.statement(&stmt.body)?;
        self.pop_loop();

        if let Some(carry) = carry {
            self.emit_op_u32(OpCode::GetLocal, carry.inner);
            self.end_scope();
            self.emit_op_u32(OpCode::SetLocal, carry.outer);
            self.emit_op(OpCode::Pop);
        } else {
            self.end_scope();
        }
        self.emit_op(OpCode::PushTrue);
        self.emit_loop(test_site)?;

        self.patch_jump(test_exit)?;
        if let Some(exit) = cond_exit {
            self.patch_jump(exit)?;
        }
        self.emit_op(OpCode::Pop);
        self.end_scope();
        Ok(())
    }

    /// Lowers `break` (`is_continue == false`) and `continue`.
    pub(super) fn loop_exit(&mut self, is_continue: bool) -> CodegenResult {
        let Some(context) = self.frame().loops.last().copied() else {
            let keyword = if is_continue { "continue" } else { "break" };
            self.report(
                CompileErrorKind::BreakOrContinueOutsideLoop(keyword),
                self.span,
            );
            return Ok(());
        };

        let carry = context.carry.filter(|_| is_continue);
        if let Some(carry) = carry {
            self.emit_op_u32(OpCode::GetLocal, carry.inner);
        }
        self.release_locals(context.depth);
        if let Some(carry) = carry {
            self.emit_op_u32(OpCode::SetLocal, carry.outer);
            self.emit_op(OpCode::Pop);
        }

        self.emit_op(if is_continue {
            OpCode::PushTrue
        } else {
            OpCode::PushFalse
        });
        self.emit_loop(context.test_site)
    }

    // ========================================================================
    // Short-circuit operators
    // ========================================================================

    /// `left; JUMP_FALSE/JUMP_TRUE end; POP; right; end: ASSERT_BOOL`
    pub(super) fn logical(&mut self, logical: &LogicalExpression) -> CodegenResult {
        self.expression(&logical.left)?;
        let short_circuit = self.emit_jump(match logical.operator {
            LogicalOperator::And => OpCode::JumpFalse,
            LogicalOperator::Or => OpCode::JumpTrue,
        });
        self.emit_op(OpCode::Pop);
        self.expression(&logical.right)?;
        self.patch_jump(short_circuit)?;
        self.emit_op(OpCode::AssertBool);
        Ok(())
    }
}
