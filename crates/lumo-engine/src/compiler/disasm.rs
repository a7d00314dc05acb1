// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode disassembler.
//!
//! ```text
//! == main ==
//! 0000      12  PUSH_CONST       0 (42)
//! 0005      12  JUMP_FALSE       4 -> 0014
//! ```
//!
//! Columns are the code offset, the source position recorded for that byte,
//! the mnemonic and the decoded operands. Function constants are listed
//! after the chunk that references them.

use super::bytecode::{Chunk, Instruction, Operand};
use crate::runtime::value::Value;
use std::fmt::Write;

/// Renders a chunk and, recursively, every function in its constant pool.
pub fn disassemble(chunk: &Chunk) -> String {
    let mut out = String::new();
    disassemble_into(chunk, &mut out);
    out
}

fn disassemble_into(chunk: &Chunk, out: &mut String) {
    let _ = writeln!(out, "== {} ==", chunk.name.as_deref().unwrap_or("script"));
    for instruction in chunk.instructions() {
        match instruction {
            Ok(instruction) => write_instruction(chunk, &instruction, out),
            Err(err) => {
                let _ = writeln!(out, "error: {}", err);
            }
        }
    }

    for constant in &chunk.constants {
        if let Value::Function(function) = constant {
            out.push('\n');
            disassemble_into(&function.chunk, out);
        }
    }
}

fn write_instruction(chunk: &Chunk, instruction: &Instruction, out: &mut String) {
    let position = chunk
        .metadata
        .get(instruction.offset)
        .map(|meta| meta.position)
        .unwrap_or_default();
    let _ = write!(
        out,
        "{:04}  {:>6}  {:<16}",
        instruction.offset,
        position,
        instruction.opcode.mnemonic()
    );

    for operand in &instruction.operands {
        match *operand {
            Operand::Constant(index) => match chunk.constants.get(index as usize) {
                Some(Value::String(s)) => {
                    let _ = write!(out, " {} ({:?})", index, s);
                }
                Some(value) => {
                    let _ = write!(out, " {} ({})", index, value);
                }
                None => {
                    let _ = write!(out, " {} (?)", index);
                }
            },
            Operand::Slot(slot) => {
                let _ = write!(out, " {}", slot);
            }
            Operand::Count(count) => {
                let _ = write!(out, " {}", count);
            }
            Operand::Jump(distance) => match instruction.jump_target() {
                Some(target) => {
                    let _ = write!(out, " {} -> {:04}", distance, target);
                }
                None => {
                    let _ = write!(out, " {} -> ?", distance);
                }
            },
            Operand::Capture { is_local, index } => {
                let kind = if is_local { "local" } else { "upvalue" };
                let _ = write!(out, " [{} {}]", kind, index);
            }
        }
    }
    out.push('\n');
}
