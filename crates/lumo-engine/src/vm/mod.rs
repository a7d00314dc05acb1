// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The reference bytecode interpreter.
//!
//! ## Structure
//!
//! - `interpreter` - the [`VM`] and its dispatch loop
//! - `comparison` - language-level equality and ordering
//! - `error` - [`RuntimeError`]

mod error;
mod interpreter;

pub mod comparison;

pub use error::RuntimeError;
pub use interpreter::VM;
