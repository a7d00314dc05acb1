// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compile-time diagnostics.

use crate::ast::Span;
use std::fmt;
use thiserror::Error;

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    /// Name resolves to no local, upvalue or global
    #[error("undeclared variable `{0}`")]
    UndeclaredVariable(String),

    /// Name already declared in the same scope
    #[error("`{0}` is already declared in this scope")]
    RedeclaredVariable(String),

    /// Top-level code reads a global before its declaration runs
    #[error("`{0}` is used before it is initialized")]
    UsedBeforeInitialized(String),

    /// `break` or `continue` with no enclosing loop
    #[error("`{0}` outside of a loop")]
    BreakOrContinueOutsideLoop(&'static str),

    /// No top-level function with the entry point name
    #[error("missing entry function `{0}`")]
    MissingEntryFunction(String),

    /// Left side of `=` is not a name or a property
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,

    /// `return` in top-level code
    #[error("`return` outside of a function")]
    ReturnOutsideFunction,

    /// A jump distance does not fit its operand, or a patch site lies
    /// outside the emitted code
    #[error("jump at offset {offset} is out of range")]
    BackpatchRange {
        /// Offset of the operand being patched
        offset: usize,
    },
}

/// A diagnostic with the span of the node that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// What went wrong
    pub kind: CompileErrorKind,
    /// Where
    pub span: Span,
}

impl CompileError {
    /// Creates a new diagnostic.
    pub fn new(kind: CompileErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.span.start + self.span.len;
        write!(f, "{} (at {}..{})", self.kind, self.span.start, end)
    }
}

impl std::error::Error for CompileError {}

/// Every diagnostic reported while compiling one program, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the diagnostics.
    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.0.iter()
    }

    /// Returns true if any diagnostic has the given kind.
    pub fn contains(&self, kind: &CompileErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == *kind)
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl From<CompileError> for CompileErrors {
    fn from(error: CompileError) -> Self {
        Self(vec![error])
    }
}

impl IntoIterator for CompileErrors {
    type Item = CompileError;
    type IntoIter = std::vec::IntoIter<CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CompileErrors {
    type Item = &'a CompileError;
    type IntoIter = std::slice::Iter<'a, CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
