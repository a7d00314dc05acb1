// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compiler configuration.

/// Options controlling a compilation.
///
/// ```rust
/// use lumo_engine::compiler::CompilerOptions;
///
/// let options = CompilerOptions::new()
///     .entry_point("start")
///     .native("print");
/// assert_eq!(options.entry_point, "start");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Name of the top-level function called after the script body runs
    pub entry_point: String,
    /// Host function names, pre-declared as initialized globals in this
    /// order before any script global
    pub natives: Vec<String>,
    /// Drop expression statements that cannot have side effects (literals
    /// and bare names)
    pub strip_pure_expressions: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            entry_point: "main".to_string(),
            natives: Vec::new(),
            strip_pure_expressions: true,
        }
    }
}

impl CompilerOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entry function name.
    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    /// Registers one host function name.
    pub fn native(mut self, name: impl Into<String>) -> Self {
        self.natives.push(name.into());
        self
    }

    /// Registers several host function names.
    pub fn natives<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natives.extend(names.into_iter().map(Into::into));
        self
    }

    /// Keeps or drops side-effect-free expression statements.
    pub fn strip_pure_expressions(mut self, strip: bool) -> Self {
        self.strip_pure_expressions = strip;
        self
    }
}
