// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use super::{CodecError, MAX_DEPTH, Result, Tag};
use crate::compiler::bytecode::Chunk;
use crate::runtime::value::{Closure, Function, Record, Value};
use std::io::Write;

pub(super) struct Encoder<'w, W: Write> {
    w: &'w mut W,
    depth: usize,
}

fn len_u32(len: usize, what: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| CodecError::TooLarge(what))
}

impl<'w, W: Write> Encoder<'w, W> {
    pub(super) fn new(w: &'w mut W) -> Self {
        Self { w, depth: 0 }
    }

    fn u8(&mut self, v: u8) -> Result<()> {
        self.w.write_all(&[v])?;
        Ok(())
    }

    fn u32(&mut self, v: u32) -> Result<()> {
        self.w.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn i64(&mut self, v: i64) -> Result<()> {
        self.w.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn str(&mut self, s: &str) -> Result<()> {
        self.u32(len_u32(s.len(), "string")?)?;
        self.w.write_all(s.as_bytes())?;
        Ok(())
    }

    fn tag(&mut self, tag: Tag) -> Result<()> {
        self.u8(tag as u8)
    }

    pub(super) fn chunk(&mut self, chunk: &Chunk) -> Result<()> {
        if chunk.metadata.len() != chunk.code.len() {
            return Err(CodecError::MetadataLength {
                code: chunk.code.len(),
                metadata: chunk.metadata.len(),
            });
        }

        self.str(chunk.name.as_deref().unwrap_or(""))?;

        self.u32(len_u32(chunk.code.len(), "code")?)?;
        self.w.write_all(&chunk.code)?;

        self.u32(len_u32(chunk.constants.len(), "constant pool")?)?;
        for constant in &chunk.constants {
            self.value(constant)?;
        }

        self.u32(len_u32(chunk.metadata.len(), "metadata")?)?;
        for meta in &chunk.metadata {
            self.u32(meta.position)?;
            self.u32(meta.len)?;
        }
        Ok(())
    }

    fn value(&mut self, value: &Value) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::TooDeep);
        }
        self.depth += 1;
        let result = self.value_inner(value);
        self.depth -= 1;
        result
    }

    fn value_inner(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Int(n) => {
                self.tag(Tag::Int)?;
                self.i64(*n)
            }
            Value::Float(n) => {
                self.tag(Tag::Float)?;
                self.w.write_all(&n.to_bits().to_le_bytes())?;
                Ok(())
            }
            Value::String(s) => {
                self.tag(Tag::String)?;
                self.str(s)
            }
            Value::Char(c) => {
                self.tag(Tag::Char)?;
                self.u32(u32::from(*c))
            }
            Value::Bool(b) => {
                self.tag(Tag::Bool)?;
                self.u8(u8::from(*b))
            }
            Value::Nil => self.tag(Tag::Nil),
            Value::Void => self.tag(Tag::Void),
            Value::Function(function) => {
                self.tag(Tag::Function)?;
                self.function(function)
            }
            Value::Closure(closure) => {
                self.tag(Tag::Closure)?;
                self.closure(closure)
            }
            Value::NativeFunction(native) => Err(CodecError::NativeFunction(native.name.clone())),
            Value::Range(range) => {
                self.tag(Tag::Range)?;
                self.i64(range.start)?;
                self.i64(range.end)?;
                self.i64(range.step)?;
                self.u8(u8::from(range.inclusive))?;
                self.u8(u8::from(range.exhausted))
            }
            Value::Record(record) => {
                self.tag(Tag::Record)?;
                self.record(record)
            }
            Value::Instance(instance) => {
                self.tag(Tag::Instance)?;
                let fields = instance.fields.read().clone();
                self.u32(len_u32(fields.len(), "instance fields")?)?;
                for field in &fields {
                    self.value(field)?;
                }
                self.record(&instance.record)
            }
            Value::BoundMethod(bound) => {
                self.tag(Tag::BoundMethod)?;
                self.value(&bound.receiver)?;
                self.closure(&bound.method)
            }
        }
    }

    fn function(&mut self, function: &Function) -> Result<()> {
        self.u32(function.arity)?;
        self.chunk(&function.chunk)
    }

    fn closure(&mut self, closure: &Closure) -> Result<()> {
        self.function(&closure.function)?;
        self.u32(len_u32(closure.upvalues.len(), "upvalue list")?)?;
        for cell in &closure.upvalues {
            // Copied out so the lock is not held across nested encodes
            let upvalue = cell.lock().clone();
            self.u32(upvalue.locals_index)?;
            self.u32(upvalue.upvalue_index)?;
            match &upvalue.closed {
                Some(value) => {
                    self.u8(1)?;
                    self.value(value)?;
                }
                None => self.u8(0)?,
            }
        }
        Ok(())
    }

    fn record(&mut self, record: &Record) -> Result<()> {
        self.str(&record.name)?;
        self.u32(len_u32(record.fields.len(), "record fields")?)?;
        for field in &record.fields {
            self.str(field)?;
        }
        let methods = record.methods.read().clone();
        self.u32(len_u32(methods.len(), "method table")?)?;
        for method in &methods {
            self.closure(method)?;
        }
        Ok(())
    }
}
