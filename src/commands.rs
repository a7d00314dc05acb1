// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Command implementations.

use crate::cli::FileArgs;
use crate::error::{LumoError, Result};
use lumo_engine::compiler::disassemble;
use lumo_engine::{Chunk, Value};
use owo_colors::OwoColorize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

fn load(path: &Path) -> Result<(Vec<u8>, Chunk)> {
    let bytes = std::fs::read(path).map_err(|source| LumoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let chunk = Chunk::decode(&bytes).map_err(|source| LumoError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "loaded chunk");
    Ok((bytes, chunk))
}

/// `lumo disasm <file>`
pub fn disasm(args: &FileArgs) -> Result<()> {
    let (_, chunk) = load(&args.file)?;
    print!("{}", disassemble(&chunk));
    Ok(())
}

/// `lumo inspect <file>`
pub fn inspect(args: &FileArgs) -> Result<()> {
    let (bytes, chunk) = load(&args.file)?;
    println!("{} ({} bytes)", args.file.display().bold(), bytes.len());
    summarize(&chunk, None, 1);
    Ok(())
}

/// Prints one line per chunk, nested functions indented below their parent.
fn summarize(chunk: &Chunk, arity: Option<u32>, depth: usize) {
    let name = chunk.name.as_deref().unwrap_or("script");
    let label = match arity {
        Some(arity) => format!("{}/{}", name, arity),
        None => name.to_string(),
    };
    let instructions = chunk.instructions().count();

    let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
    for constant in &chunk.constants {
        *kinds.entry(constant.type_name()).or_default() += 1;
    }
    let kinds = kinds
        .iter()
        .map(|(kind, count)| format!("{} {}", count, kind))
        .collect::<Vec<_>>()
        .join(", ");

    println!(
        "{:indent$}{}: {} bytes, {} instructions, {} constants{}",
        "",
        label.cyan(),
        chunk.code.len(),
        instructions,
        chunk.constants.len(),
        if kinds.is_empty() {
            String::new()
        } else {
            format!(" ({})", kinds)
        },
        indent = depth * 2
    );

    for constant in &chunk.constants {
        if let Value::Function(function) = constant {
            summarize(&function.chunk, Some(function.arity), depth + 1);
        }
    }
}

/// `lumo verify <file>`
pub fn verify(args: &FileArgs) -> Result<()> {
    let (bytes, chunk) = load(&args.file)?;
    let reencoded = chunk.encode()?;
    if reencoded != bytes {
        let offset = bytes
            .iter()
            .zip(&reencoded)
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| bytes.len().min(reencoded.len()));
        return Err(LumoError::Mismatch {
            path: args.file.clone(),
            original: bytes.len(),
            reencoded: reencoded.len(),
            offset,
        });
    }
    println!(
        "{} {} ({} bytes)",
        "ok".green().bold(),
        args.file.display(),
        bytes.len()
    );
    Ok(())
}
