// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lumo runtime types.

pub mod value;

pub use value::{
    BoundMethod, Closure, Function, Instance, NativeFn, NativeFunction, Range, Record, Upvalue,
    UpvalueCell, Value,
};
