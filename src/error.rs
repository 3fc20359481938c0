/*
 * BSD 2-Clause License
 *
 * Copyright (c) 2021, Khaled Emara
 * All rights reserved.
 *
 * Redistribution and use in source and binary forms, with or without
 * modification, are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 *    list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice,
 *    this list of conditions and the following disclaimer in the documentation
 *    and/or other materials provided with the distribution.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
 * AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
 * IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
 * DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
 * FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
 * DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
 * SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
 * CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
 * OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
 * OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
 */
//! Crate-wide error type.
//!
//! One enum for every fallible operation in the core, matching the error
//! vocabulary of the on-disk format reader one-for-one. Only the FUSE glue
//! in [`crate::fs`] downgrades these to `libc` errno values.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PakError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid SBBF magic in {path}")]
    InvalidMagic { path: String },

    #[error("invalid block signature {signature:?} at block {block}")]
    InvalidSignature { block: i32, signature: [u8; 2] },

    #[error("format error: {0}")]
    Format(String),

    #[error("leaf chain broken: {0}")]
    ChainBroken(String),

    #[error("key not found: {key_hex}{}", path.as_ref().map(|p| format!(" (path {p})")).unwrap_or_default())]
    KeyNotFound { key_hex: String, path: Option<String> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("is a directory: {0}")]
    IsADir(String),

    #[error("not a directory: {0}")]
    NotADir(String),

    #[error("region overflow: offset {offset} exceeds region of size {size}")]
    RegionOverflow { offset: u64, size: u64 },

    #[error("mapping is read-only")]
    ReadOnly,

    #[error("unsupported database identifier: {0:?}")]
    UnsupportedIdentifier(String),
}

pub type Result<T> = std::result::Result<T, PakError>;

impl PakError {
    /// Map to the errno the FUSE layer should reply with, per the
    /// propagation policy: not-found -> ENOENT, is-a-dir -> EISDIR,
    /// not-a-dir -> ENOTDIR, everything else -> EIO.
    pub fn to_errno(&self) -> i32 {
        match self {
            PakError::NotFound(_) => libc::ENOENT,
            PakError::IsADir(_) => libc::EISDIR,
            PakError::NotADir(_) => libc::ENOTDIR,
            _ => libc::EIO,
        }
    }
}
