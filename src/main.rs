// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! lumo - inspection tool for compiled Lumo bytecode
//!
//! ## Commands
//!
//! - `disasm <file>` - decode a chunk and print its listing
//! - `inspect <file>` - sizes, constant kinds and nested functions
//! - `verify <file>` - decode, re-encode and compare byte for byte

use clap::Parser;
use owo_colors::OwoColorize;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod error;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Disasm(args) => commands::disasm(args),
        Commands::Inspect(args) => commands::inspect(args),
        Commands::Verify(args) => commands::verify(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {}", "error".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so listings on stdout stay clean.
fn init_logging(cli: &Cli) {
    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = cli
        .log
        .as_deref()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
