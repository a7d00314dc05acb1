// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use super::{CodecError, MAX_DEPTH, Result, Tag};
use crate::compiler::bytecode::{Chunk, Metadata};
use crate::runtime::value::{
    BoundMethod, Closure, Function, Instance, Range, Record, Upvalue, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Cursor over an encoded buffer.
pub(super) struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub(super) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            depth: 0,
        }
    }

    pub(super) fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self
            .pos
            .checked_add(n)
            .and_then(|end| self.bytes.get(self.pos..end))
            .ok_or(CodecError::UnexpectedEof {
                offset: self.pos,
                needed: n,
            })?;
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(self.u64()? as i64)
    }

    fn flag(&mut self) -> Result<bool> {
        let offset = self.pos;
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(CodecError::InvalidFlag { byte, offset }),
        }
    }

    /// Reads a count and checks it against the bytes left, so a corrupt
    /// count fails fast instead of reserving a huge buffer.
    fn count(&mut self, min_item_len: usize) -> Result<usize> {
        let offset = self.pos;
        let count = self.u32()? as usize;
        if count.saturating_mul(min_item_len) > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                offset,
                needed: count.saturating_mul(min_item_len),
            });
        }
        Ok(count)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let offset = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8 { offset })
    }

    pub(super) fn chunk(&mut self) -> Result<Chunk> {
        let name = self.string()?;
        let name = (!name.is_empty()).then_some(name);

        let code_len = self.u32()? as usize;
        let code = self.take(code_len)?.to_vec();

        let const_count = self.count(1)?;
        let mut constants = Vec::with_capacity(const_count);
        for _ in 0..const_count {
            constants.push(self.value()?);
        }

        let meta_count = self.count(8)?;
        if meta_count != code.len() {
            return Err(CodecError::MetadataLength {
                code: code.len(),
                metadata: meta_count,
            });
        }
        let mut metadata = Vec::with_capacity(meta_count);
        for _ in 0..meta_count {
            metadata.push(Metadata {
                position: self.u32()?,
                len: self.u32()?,
            });
        }

        Ok(Chunk {
            name,
            code,
            constants,
            metadata,
        })
    }

    fn value(&mut self) -> Result<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::TooDeep);
        }
        self.depth += 1;
        let result = self.value_inner();
        self.depth -= 1;
        result
    }

    fn value_inner(&mut self) -> Result<Value> {
        let offset = self.pos;
        let byte = self.u8()?;
        let tag = Tag::from_byte(byte).ok_or(CodecError::UnknownTag { tag: byte, offset })?;

        Ok(match tag {
            Tag::Int => Value::Int(self.i64()?),
            Tag::Float => Value::Float(f64::from_bits(self.u64()?)),
            Tag::String => Value::from(self.string()?),
            Tag::Char => {
                let scalar = self.u32()?;
                Value::Char(char::from_u32(scalar).ok_or(CodecError::InvalidChar(scalar))?)
            }
            Tag::Bool => Value::Bool(self.flag()?),
            Tag::Nil => Value::Nil,
            Tag::Void => Value::Void,
            Tag::Function => Value::Function(Arc::new(self.function()?)),
            Tag::Closure => Value::Closure(Arc::new(self.closure()?)),
            Tag::Range => Value::Range(Range {
                start: self.i64()?,
                end: self.i64()?,
                step: self.i64()?,
                inclusive: self.flag()?,
                exhausted: self.flag()?,
            }),
            Tag::Record => Value::Record(Arc::new(self.record()?)),
            Tag::Instance => {
                let count = self.count(1)?;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    fields.push(self.value()?);
                }
                let record = Arc::new(self.record()?);
                Value::Instance(Arc::new(Instance::new(record, fields)))
            }
            Tag::BoundMethod => {
                let receiver = self.value()?;
                let method = Arc::new(self.closure()?);
                Value::BoundMethod(Arc::new(BoundMethod { receiver, method }))
            }
        })
    }

    fn function(&mut self) -> Result<Function> {
        let arity = self.u32()?;
        let chunk = self.chunk()?;
        Ok(Function::new(arity, chunk))
    }

    fn closure(&mut self) -> Result<Closure> {
        let function = Arc::new(self.function()?);
        let count = self.count(9)?;
        let mut upvalues = Vec::with_capacity(count);
        for _ in 0..count {
            let locals_index = self.u32()?;
            let upvalue_index = self.u32()?;
            let closed = if self.flag()? {
                Some(self.value()?)
            } else {
                None
            };
            upvalues.push(Arc::new(Mutex::new(Upvalue {
                locals_index,
                upvalue_index,
                closed,
            })));
        }
        Ok(Closure::new(function, upvalues))
    }

    fn record(&mut self) -> Result<Record> {
        let name = self.string()?;
        let field_count = self.count(4)?;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(self.string()?);
        }
        let record = Record::new(name, fields);

        let method_count = self.count(4)?;
        let mut methods = Vec::with_capacity(method_count);
        for _ in 0..method_count {
            methods.push(Arc::new(self.closure()?));
        }
        *record.methods.write() = methods;
        Ok(record)
    }
}
