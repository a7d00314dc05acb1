// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for lumo.

use lumo_engine::CodecError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for lumo commands.
pub type Result<T> = std::result::Result<T, LumoError>;

/// Main error type for lumo.
#[derive(Error, Debug)]
pub enum LumoError {
    /// File could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not a valid chunk
    #[error("{}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    /// Re-encoding failed
    #[error("re-encoding failed: {0}")]
    Encode(#[from] CodecError),

    /// Re-encoded bytes differ from the file
    #[error(
        "{}: re-encoded chunk differs ({original} bytes on disk, {reencoded} after round trip, first difference at byte {offset})",
        path.display()
    )]
    Mismatch {
        path: PathBuf,
        original: usize,
        reencoded: usize,
        offset: usize,
    },
}
