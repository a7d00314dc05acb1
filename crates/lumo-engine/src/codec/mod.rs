// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Binary container format for compiled chunks.
//!
//! ```text
//! chunk    := name code constants metadata
//! name     := len:u32 utf8[len]            ; len 0 means no name
//! code     := len:u32 u8[len]
//! constants:= count:u32 value[count]
//! metadata := count:u32 (position:u32 len:u32)[count]   ; count == len(code)
//! ```
//!
//! All integers are little-endian. A value is a one-byte [`Tag`] followed by
//! its payload; function values embed their whole chunk, so decoding
//! recurses. Native functions are host callbacks and cannot be encoded.

mod decode;
mod encode;

#[cfg(test)]
mod tests;

use crate::compiler::bytecode::Chunk;
use std::io::{self, Write};
use thiserror::Error;
use tracing::debug;

/// Nesting limit for values inside values (functions inside constant pools,
/// instances inside upvalues, ...).
pub const MAX_DEPTH: usize = 256;

/// Type tags of encoded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// `i64`
    Int = 0,
    /// `f64` bit pattern as `u64`
    Float = 1,
    /// length-prefixed UTF-8
    String = 2,
    /// Unicode scalar value as `u32`
    Char = 3,
    /// `u8` 0 or 1
    Bool = 4,
    /// no payload
    Nil = 5,
    /// no payload
    Void = 6,
    /// arity and nested chunk
    Function = 7,
    /// function payload and upvalues
    Closure = 8,
    /// start, end, step, then inclusive and exhausted flags
    Range = 9,
    /// name, field names and method closures
    Record = 10,
    /// field values and record
    Instance = 11,
    /// receiver and method closure
    BoundMethod = 12,
}

impl Tag {
    /// Decodes a tag byte.
    pub fn from_byte(byte: u8) -> Option<Tag> {
        Some(match byte {
            0 => Tag::Int,
            1 => Tag::Float,
            2 => Tag::String,
            3 => Tag::Char,
            4 => Tag::Bool,
            5 => Tag::Nil,
            6 => Tag::Void,
            7 => Tag::Function,
            8 => Tag::Closure,
            9 => Tag::Range,
            10 => Tag::Record,
            11 => Tag::Instance,
            12 => Tag::BoundMethod,
            _ => return None,
        })
    }
}

/// Errors raised while encoding or decoding a chunk.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Writing to the output failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Input ended inside a field
    #[error("unexpected end of input at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEof {
        /// Where the read started
        offset: usize,
        /// Bytes requested
        needed: usize,
    },

    /// Value tag not in [`Tag`]
    #[error("unknown value tag {tag} at offset {offset}")]
    UnknownTag {
        /// The tag byte
        tag: u8,
        /// Where it was read
        offset: usize,
    },

    /// A string is not valid UTF-8
    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 {
        /// Start of the string bytes
        offset: usize,
    },

    /// A char payload is not a Unicode scalar value
    #[error("invalid char {0:#x}")]
    InvalidChar(u32),

    /// A flag byte other than 0 or 1
    #[error("invalid flag byte {byte} at offset {offset}")]
    InvalidFlag {
        /// The byte
        byte: u8,
        /// Where it was read
        offset: usize,
    },

    /// Host functions only exist at run time
    #[error("native function `{0}` cannot be serialized")]
    NativeFunction(String),

    /// The chunk does not have one metadata entry per code byte
    #[error("metadata has {metadata} entries for {code} code bytes")]
    MetadataLength {
        /// Code length
        code: usize,
        /// Metadata length
        metadata: usize,
    },

    /// Bytes left after the top-level chunk
    #[error("{0} trailing bytes after chunk")]
    TrailingBytes(usize),

    /// A length does not fit in a `u32`
    #[error("{0} too large to encode")]
    TooLarge(&'static str),

    /// Values nested deeper than [`MAX_DEPTH`]
    #[error("values nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

impl Chunk {
    /// Encodes the chunk into a new buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_to(&mut out)?;
        debug!(
            name = self.name.as_deref().unwrap_or("script"),
            bytes = out.len(),
            "encoded chunk"
        );
        Ok(out)
    }

    /// Encodes the chunk into a writer.
    pub fn encode_to<W: Write>(&self, w: &mut W) -> Result<()> {
        encode::Encoder::new(w).chunk(self)
    }

    /// Decodes a chunk. The input must hold exactly one chunk.
    pub fn decode(bytes: &[u8]) -> Result<Chunk> {
        let mut decoder = decode::Decoder::new(bytes);
        let chunk = decoder.chunk()?;
        let trailing = decoder.remaining();
        if trailing != 0 {
            return Err(CodecError::TrailingBytes(trailing));
        }
        debug!(
            name = chunk.name.as_deref().unwrap_or("script"),
            bytes = bytes.len(),
            constants = chunk.constants.len(),
            "decoded chunk"
        );
        Ok(chunk)
    }
}

/// Encodes a chunk. Shorthand for [`Chunk::encode`].
pub fn encode(chunk: &Chunk) -> Result<Vec<u8>> {
    chunk.encode()
}

/// Decodes a chunk. Shorthand for [`Chunk::decode`].
pub fn decode(bytes: &[u8]) -> Result<Chunk> {
    Chunk::decode(bytes)
}
