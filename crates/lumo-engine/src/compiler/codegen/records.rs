// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Record declarations.
//!
//! ```text
//!   PUSH_CONST <record>
//!   PUSH_CLOSURE <method 1>
//!   ...
//!   PUSH_CLOSURE <method n>
//!   APPEND_METHODS n
//!   DEF_GLOBAL | DEF_LOCAL
//! ```

use super::functions::Body;
use super::{CodegenResult, Compiler, FrameKind};
use crate::ast::*;
use crate::compiler::bytecode::OpCode;
use crate::compiler::error::CompileErrorKind;
use crate::runtime::value::{Record, Value};
use rustc_hash::FxHashSet;
use std::sync::Arc;

impl Compiler {
    pub(super) fn record_declaration(&mut self, decl: &RecordDeclaration) -> CodegenResult {
        let global = self.at_global_scope();
        let local = if global {
            None
        } else {
            self.declare_variable(&decl.id)
        };

        self.check_unique(decl.fields.iter());
        self.check_unique(decl.methods.iter().map(|m| &m.id));

        let fields = decl.fields.iter().map(|f| f.name.clone()).collect();
        let record = Record::new(decl.id.name.clone(), fields);
        self.emit_constant(Value::Record(Arc::new(record)));

        for method in &decl.methods {
            self.function(
                FrameKind::Method,
                &method.id.name,
                &method.params,
                Body::Block(&method.body),
            )?;
        }
        if !decl.methods.is_empty() {
            self.emit_op_u32(OpCode::AppendMethods, decl.methods.len() as u32);
        }

        let declared = if global {
            self.declare_variable(&decl.id)
        } else {
            local
        };
        self.define_variable(declared);
        Ok(())
    }

    /// Reports the first repeated field or method name.
    fn check_unique<'a>(&mut self, names: impl Iterator<Item = &'a Identifier>) {
        let mut seen = FxHashSet::default();
        for id in names {
            if !seen.insert(id.name.as_str()) {
                self.report(CompileErrorKind::RedeclaredVariable(id.name.clone()), id.span);
                return;
            }
        }
    }
}
