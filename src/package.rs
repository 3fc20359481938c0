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
//! The asset package layer: hashes paths into BTreeDB4 keys and
//! materialises the package index.
//!
//! `encode_key` lower-cases the path before hashing it, and the
//! well-known `_digest`/`_index` keys are looked up the same way any
//! other path would be, just without going through a VFS.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::btreedb4::{BTreeDb4, BTreeDb4Options};
use crate::error::{PakError, Result};
use crate::sbon::{SbonRead, SliceReader};
use crate::vfs::Vfs;

const DIGEST_KEY: &str = "_digest";
const INDEX_KEY: &str = "_index";

/// The package index: every addressable asset path, and (for `Assets2`
/// packages) the digest recorded for it.
#[derive(Debug, Clone)]
pub enum Index {
    /// `"Assets1"`: a plain list of asset paths.
    Paths(Vec<String>),
    /// `"Assets2"`: asset paths mapped to their recorded SHA-256 digest.
    PathDigests(Vec<(String, [u8; 32])>),
}

impl Index {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Index::Paths(p) => p.iter().map(String::as_str).collect(),
            Index::PathDigests(pd) => pd.iter().map(|(p, _)| p.as_str()).collect(),
        }
    }
}

/// A BTreeDB4 database keyed by `SHA-256(lower(path))`.
pub struct Package {
    db: BTreeDb4,
}

fn encode_key(path: &str) -> [u8; 32] {
    let lowered = path.to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(lowered.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

impl Package {
    pub fn open<P: AsRef<Path>>(path: P, page_count: u64, options: BTreeDb4Options) -> Result<Self> {
        let db = BTreeDb4::open(path, page_count, options)?;
        if db.key_size() != 32 {
            return Err(PakError::Format(format!(
                "package key_size is {}, expected 32 (SHA-256)",
                db.key_size()
            )));
        }
        Ok(Package { db })
    }

    /// Raw record lookup by asset path, hashed per this package's key
    /// encoding. Returns `None` if the path is not present.
    pub fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let key = encode_key(path);
        self.db.get(&key)
    }

    pub fn get_size(&self, path: &str) -> Result<Option<u64>> {
        let key = encode_key(path);
        self.db.get_size(&key)
    }

    /// Same as [`Self::get`] but raises `KeyNotFound` instead of returning
    /// `None`, carrying the encoded key (hex) and the path for diagnostics.
    pub fn require(&self, path: &str) -> Result<Vec<u8>> {
        let key = encode_key(path);
        self.db.get(&key)?.ok_or_else(|| PakError::KeyNotFound {
            key_hex: hex_encode(&key),
            path: Some(path.to_string()),
        })
    }

    pub fn digest(&self) -> Result<Vec<u8>> {
        self.require(DIGEST_KEY)
    }

    /// The full length of the value stored at `path`, failing with
    /// `KeyNotFound` if absent.
    pub fn file_size(&self, path: &str) -> Result<u64> {
        let key = encode_key(path);
        self.db.get_size(&key)?.ok_or_else(|| PakError::KeyNotFound {
            key_hex: hex_encode(&key),
            path: Some(path.to_string()),
        })
    }

    /// Reads the full value via the BTreeDB4 engine, then slices
    /// `[offset, offset+length)`.
    /// A negative `length` means "to the end". A future optimisation may
    /// stream the requested range directly from the leaf chain instead of
    /// materialising the whole value first; the contract only promises the
    /// returned bytes, so this is a valid implementation of it.
    pub fn file_contents(&self, path: &str, offset: u64, length: i64) -> Result<Vec<u8>> {
        let data = self.require(path)?;
        let offset = (offset as usize).min(data.len());
        let end = if length < 0 {
            data.len()
        } else {
            data.len().min(offset + length as usize)
        };
        Ok(data[offset..end].to_vec())
    }

    /// Loads and decodes the package index, dispatching on the database's
    /// `identifier` (`"Assets1"` or `"Assets2"`).
    pub fn index(&self) -> Result<Index> {
        let raw = self.require(INDEX_KEY)?;
        let mut reader = SliceReader::new(&raw);
        match self.db.identifier() {
            "Assets1" => Ok(Index::Paths(reader.string_list()?)),
            "Assets2" => Ok(Index::PathDigests(reader.string_digest_map()?)),
            other => Err(PakError::UnsupportedIdentifier(other.to_string())),
        }
    }

    /// Builds the path tree that `fs::PakFilesystem` serves `stat`/`readdir`
    /// from, by walking every path the index enumerates and recording its
    /// current byte size. Content itself is fetched lazily on `read`, never
    /// cached here.
    pub fn build_vfs(&self) -> Result<Vfs<u64>> {
        let index = self.index()?;
        let mut vfs = Vfs::new();
        for path in index.paths() {
            let abspath = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            };
            let size = self.get_size(path)?.ok_or_else(|| PakError::KeyNotFound {
                key_hex: hex_encode(&encode_key(path)),
                path: Some(path.to_string()),
            })?;
            vfs.add_file(&abspath, size)?;
        }
        Ok(vfs)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_key_lowercases_before_hashing() {
        let lower = encode_key("assets/player.png");
        let mixed = encode_key("Assets/Player.PNG");
        assert_eq!(lower, mixed);
    }

    #[test]
    fn encode_key_matches_direct_sha256() {
        let key = encode_key("foo");
        let mut hasher = Sha256::new();
        hasher.update(b"foo");
        let expected = hasher.finalize();
        assert_eq!(&key[..], &expected[..]);
    }

    #[test]
    fn hex_encode_is_lowercase_and_padded() {
        assert_eq!(hex_encode(&[0x0a, 0xff]), "0aff");
    }
}
