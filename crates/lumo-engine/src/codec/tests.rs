// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the chunk codec.

use super::*;
use crate::ast::Span;
use crate::compiler::bytecode::OpCode;
use crate::runtime::value::{
    BoundMethod, Closure, Function, Instance, NativeFunction, Range, Record, Upvalue, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn tiny_chunk(name: Option<&str>) -> Chunk {
    let mut chunk = Chunk::new(name.map(str::to_string));
    chunk.write_op(OpCode::Pop, Span::new(1, 2));
    chunk
}

fn method(name: &str) -> Arc<Closure> {
    let mut chunk = Chunk::new(Some(name.to_string()));
    chunk.write_op(OpCode::ReturnVoid, Span::new(0, 1));
    Arc::new(Closure::new(Arc::new(Function::new(0, chunk)), Vec::new()))
}

#[test]
fn test_byte_layout_is_little_endian() {
    let bytes = tiny_chunk(None).encode().unwrap();
    let pop = OpCode::Pop as u8;
    assert_eq!(
        bytes,
        vec![
            0, 0, 0, 0, // name
            1, 0, 0, 0, pop, // code
            0, 0, 0, 0, // constants
            1, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, // metadata
        ]
    );
}

#[test]
fn test_name_round_trip() {
    let named = tiny_chunk(Some("main"));
    assert_eq!(Chunk::decode(&named.encode().unwrap()).unwrap(), named);
    let script = tiny_chunk(None);
    assert_eq!(Chunk::decode(&script.encode().unwrap()).unwrap().name, None);
}

#[test]
fn test_round_trip_every_value_kind() {
    let record = Arc::new(Record::new("Point", vec!["x".into(), "y".into()]));
    *record.methods.write() = vec![method("norm")];
    let instance = Arc::new(Instance::new(
        record.clone(),
        vec![Value::Int(1), Value::Float(2.5)],
    ));
    let closed = Arc::new(Mutex::new(Upvalue {
        locals_index: 3,
        upvalue_index: 0,
        closed: Some(Value::from("captured")),
    }));
    let open = Arc::new(Mutex::new(Upvalue::open(7, 1)));
    let closure = Arc::new(Closure::new(
        Arc::new(Function::new(2, tiny_chunk(Some("inner")))),
        vec![closed, open],
    ));

    let mut chunk = tiny_chunk(Some("everything"));
    for value in [
        Value::Int(-42),
        Value::Float(-0.0),
        Value::from("héllo"),
        Value::Char('λ'),
        Value::Bool(true),
        Value::Nil,
        Value::Void,
        Value::Function(Arc::new(Function::new(1, tiny_chunk(Some("f"))))),
        Value::Closure(closure.clone()),
        Value::Range(Range::new(5, 1, true)),
        Value::Range(Range {
            exhausted: true,
            ..Range::new(i64::MAX, i64::MAX, true)
        }),
        Value::Record(record),
        Value::Instance(instance.clone()),
        Value::BoundMethod(Arc::new(BoundMethod {
            receiver: Value::Instance(instance),
            method: closure,
        })),
    ] {
        chunk.constants.push(value);
    }

    let bytes = chunk.encode().unwrap();
    let decoded = Chunk::decode(&bytes).unwrap();
    assert_eq!(decoded, chunk);
    assert_eq!(decoded.encode().unwrap(), bytes);
}

#[test]
fn test_native_function_is_not_encodable() {
    let mut chunk = tiny_chunk(None);
    chunk
        .constants
        .push(Value::NativeFunction(Arc::new(NativeFunction::new(
            "print",
            1,
            |_| Ok(Value::Void),
        ))));
    assert!(matches!(
        chunk.encode(),
        Err(CodecError::NativeFunction(name)) if name == "print"
    ));
}

#[test]
fn test_encode_rejects_metadata_mismatch() {
    let mut chunk = tiny_chunk(None);
    chunk.metadata.clear();
    assert!(matches!(
        chunk.encode(),
        Err(CodecError::MetadataLength {
            code: 1,
            metadata: 0
        })
    ));
}

#[test]
fn test_decode_truncated_input() {
    let bytes = tiny_chunk(Some("main")).encode().unwrap();
    for cut in 0..bytes.len() {
        assert!(
            matches!(
                Chunk::decode(&bytes[..cut]),
                Err(CodecError::UnexpectedEof { .. })
            ),
            "cut at {}",
            cut
        );
    }
}

#[test]
fn test_decode_trailing_bytes() {
    let mut bytes = tiny_chunk(None).encode().unwrap();
    bytes.extend_from_slice(&[0, 0]);
    assert!(matches!(
        Chunk::decode(&bytes),
        Err(CodecError::TrailingBytes(2))
    ));
}

#[test]
fn test_decode_metadata_mismatch() {
    // name, one code byte, no constants, zero metadata entries
    let bytes = [0, 0, 0, 0, 1, 0, 0, 0, 6, 0, 0, 0, 0, 0, 0, 0, 0];
    assert!(matches!(
        Chunk::decode(&bytes),
        Err(CodecError::MetadataLength {
            code: 1,
            metadata: 0
        })
    ));
}

/// Encodes an empty unnamed chunk whose constant pool holds `value_bytes`.
fn with_constant(value_bytes: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0];
    bytes.extend_from_slice(value_bytes);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}

#[test]
fn test_decode_constant_errors() {
    assert!(matches!(
        Chunk::decode(&with_constant(&[99])),
        Err(CodecError::UnknownTag { tag: 99, .. })
    ));
    assert!(matches!(
        Chunk::decode(&with_constant(&[Tag::String as u8, 2, 0, 0, 0, 0xff, 0xfe])),
        Err(CodecError::InvalidUtf8 { .. })
    ));
    assert!(matches!(
        Chunk::decode(&with_constant(&[Tag::Char as u8, 0x00, 0xd8, 0, 0])),
        Err(CodecError::InvalidChar(0xd800))
    ));
    assert!(matches!(
        Chunk::decode(&with_constant(&[Tag::Bool as u8, 2])),
        Err(CodecError::InvalidFlag { byte: 2, .. })
    ));
    assert_eq!(
        Chunk::decode(&with_constant(&[Tag::Nil as u8]))
            .unwrap()
            .constants,
        vec![Value::Nil]
    );
}

#[test]
fn test_decode_rejects_huge_counts() {
    let bytes = [0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
    assert!(matches!(
        Chunk::decode(&bytes),
        Err(CodecError::UnexpectedEof { .. })
    ));
}
