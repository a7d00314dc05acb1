// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CLI argument parsing for lumo.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// lumo - inspect compiled Lumo bytecode
#[derive(Parser, Debug)]
#[command(name = "lumo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging (overridden by LUMO_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log filter, e.g. `lumo_engine=trace`
    #[arg(long, global = true, env = "LUMO_LOG")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a listing of a chunk and every function in it
    #[command(alias = "dis")]
    Disasm(FileArgs),

    /// Summarize sizes, constants and functions
    Inspect(FileArgs),

    /// Check that a file decodes and re-encodes to the same bytes
    Verify(FileArgs),
}

#[derive(Args, Debug)]
pub struct FileArgs {
    /// Encoded chunk file
    pub file: PathBuf,
}
