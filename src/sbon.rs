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
//! StarBound Binary Object Notation primitives.
//!
//! Pure decoders over anything that can hand back sequential byte runs.
//! [`SbonRead`] is implemented for [`crate::paging::Region`] (the chained-leaf
//! reader decodes records straight out of a region) and for a plain byte
//! slice cursor, so tests can exercise the codec without building a package.

use crate::error::{PakError, Result};

/// A sequential byte source: each call to `read(n)` consumes and returns the
/// next `n` bytes, or fails if fewer remain.
pub trait SbonRead {
    fn read(&mut self, n: u64) -> Result<Vec<u8>>;

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    /// `varlen_number`: 7 bits per byte, high bit as continuation, most
    /// significant group first.
    fn varlen_number(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        loop {
            let byte = self.read_u8()?;
            value = (value << 7) | u64::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(value)
    }

    /// A fixed-length byte run decoded as UTF-8, with trailing NUL bytes
    /// trimmed.
    fn fixlen_string(&mut self, n: u64) -> Result<String> {
        let mut bytes = self.read(n)?;
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        String::from_utf8(bytes)
            .map_err(|e| PakError::Format(format!("fixlen_string is not valid UTF-8: {e}")))
    }

    /// `(len: varlen, payload: len bytes)`.
    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.varlen_number()?;
        self.read(len)
    }

    /// A varlen-prefixed UTF-8 string.
    fn string(&mut self) -> Result<String> {
        let raw = self.bytes()?;
        String::from_utf8(raw).map_err(|e| PakError::Format(format!("string is not valid UTF-8: {e}")))
    }

    /// `varlen count n`, then `n` strings.
    fn string_list(&mut self) -> Result<Vec<String>> {
        let n = self.varlen_number()?;
        (0..n).map(|_| self.string()).collect()
    }

    /// `varlen count n`, then `n` pairs `(string, 32-byte digest)`.
    fn string_digest_map(&mut self) -> Result<Vec<(String, [u8; 32])>> {
        let n = self.varlen_number()?;
        (0..n)
            .map(|_| {
                let name = self.string()?;
                let digest_bytes = self.read(32)?;
                let mut digest = [0u8; 32];
                digest.copy_from_slice(&digest_bytes);
                Ok((name, digest))
            })
            .collect()
    }
}

impl SbonRead for crate::paging::Region {
    fn read(&mut self, n: u64) -> Result<Vec<u8>> {
        Region::read_exact(self, n)
    }
}

use crate::paging::Region;

/// A cursor over an in-memory byte slice, for decoding records already
/// materialised from a chained-leaf read.
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl SbonRead for SliceReader<'_> {
    fn read(&mut self, n: u64) -> Result<Vec<u8>> {
        let n = n as usize;
        if n > self.remaining() {
            return Err(PakError::RegionOverflow {
                offset: self.pos as u64,
                size: self.data.len() as u64,
            });
        }
        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }
}
