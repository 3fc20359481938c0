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
//! A logical window into a [`MappedFile`](super::mapped_file::MappedFile).
//!
//! A region owns no bytes of its own; `(base_offset, size)` is always
//! expressed in the root file's coordinates, and every read delegates to the
//! owning mapping. Regions may be derived recursively (`region.region(..)`),
//! composing offsets additively.

use std::cell::Cell;
use std::sync::Arc;

use crate::error::{PakError, Result};
use crate::paging::mapped_file::MappedFile;

/// A window `[base_offset, base_offset + size)` into a mapped file.
///
/// The cursor is not thread-safe by design (spec: "cursors stored on
/// regions are thread-hostile"); request-serving code should pass explicit
/// offsets and ignore the cursor-advancing reads.
#[derive(Clone)]
pub struct Region {
    owner: Arc<MappedFile>,
    base_offset: u64,
    size: u64,
    cursor: Cell<u64>,
}

impl Region {
    pub(crate) fn new(owner: Arc<MappedFile>, base_offset: u64, size: u64) -> Self {
        Region {
            owner,
            base_offset,
            size,
            cursor: Cell::new(0),
        }
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.get()
    }

    /// Validate and normalise a relative `(offset, length)` pair.
    /// `offset = None` defaults to the cursor. `length = None` (or
    /// negative in the wire encoding's terms) means "to the end of the
    /// region".
    fn sanitize(&self, offset: Option<u64>, length: Option<i64>) -> Result<(u64, u64)> {
        let offset = offset.unwrap_or_else(|| self.cursor.get());
        if offset > self.size {
            return Err(PakError::RegionOverflow {
                offset,
                size: self.size,
            });
        }

        let remaining = self.size - offset;
        let length = match length {
            None => remaining,
            Some(l) if l < 0 => remaining,
            Some(l) => (l as u64).min(remaining),
        };

        Ok((offset, length))
    }

    /// Reads `length` bytes starting at `offset` (relative to this
    /// region). `offset = None` reads from the cursor; `advance` controls
    /// whether the cursor moves past what was read.
    pub fn read(&self, length: Option<i64>, offset: Option<u64>, advance: bool) -> Result<Vec<u8>> {
        let (rel_offset, length) = self.sanitize(offset, length)?;
        let abs_offset = self.base_offset + rel_offset;
        let data = self.owner.read(length, abs_offset, false)?;
        if advance {
            self.cursor.set(rel_offset + data.len() as u64);
        }
        Ok(data)
    }

    /// Reads exactly `n` bytes from the cursor, advancing it. Fails with
    /// `RegionOverflow` if fewer than `n` bytes remain.
    pub fn read_exact(&self, n: u64) -> Result<Vec<u8>> {
        let data = self.read(Some(n as i64), None, true)?;
        if data.len() as u64 != n {
            return Err(PakError::RegionOverflow {
                offset: self.cursor.get(),
                size: self.size,
            });
        }
        Ok(data)
    }

    /// A write always fails: the mapping backing this region is read-only
    /// (see [`MappedFile::open`]).
    pub fn write(&self, _value: &[u8]) -> Result<u64> {
        Err(PakError::ReadOnly)
    }

    /// Derives a sub-region. `offset = None` starts at the cursor;
    /// `size = None` extends to the end of this region.
    pub fn region(&self, offset: Option<u64>, size: Option<u64>) -> Result<Region> {
        let (offset, size) = self.sanitize(offset, size.map(|s| s as i64))?;
        self.owner.region(self.base_offset + offset, size)
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("base_offset", &self.base_offset)
            .field("size", &self.size)
            .field("cursor", &self.cursor.get())
            .finish()
    }
}
