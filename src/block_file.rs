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
//! SBBF02/SBBF03 block file parsing.
//!
//! Thin layer over a [`MappedFile`]: validates the magic, exposes the file
//! and user headers, and hands out block-sized regions by index without
//! interpreting their contents (that's `btreedb4::block`'s job).

use std::path::Path;
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt};
use tracing::warn;

use crate::error::{PakError, Result};
use crate::paging::{MappedFile, Region};

const MAGIC_LEN: u64 = 6;
const USER_HEADER_OFFSET: u64 = 0x20;

/// A parsed SBBF02/SBBF03 container: a file header followed by a dense
/// array of fixed-size blocks.
pub struct BlockFile {
    mapped: Arc<MappedFile>,
    magic: [u8; 6],
    header_size: u32,
    block_size: u32,
}

impl BlockFile {
    pub fn open<P: AsRef<Path>>(path: P, page_count: u64) -> Result<Self> {
        let mapped = MappedFile::open(path, page_count, true)?;
        Self::from_mapped(mapped)
    }

    pub fn from_mapped(mapped: Arc<MappedFile>) -> Result<Self> {
        let probe = mapped.region(0, 32.max(MAGIC_LEN))?;
        let header_bytes = probe.read(Some(32), Some(0), false)?;

        let mut magic = [0u8; 6];
        magic.copy_from_slice(&header_bytes[0..6]);
        if &magic != b"SBBF02" && &magic != b"SBBF03" {
            return Err(PakError::InvalidMagic {
                path: mapped.path().display().to_string(),
            });
        }

        let mut cursor = &header_bytes[6..14];
        let header_size = cursor.read_u32::<BigEndian>()?;
        let block_size = cursor.read_u32::<BigEndian>()?;

        if header_size < 32 {
            return Err(PakError::Format(format!(
                "header_size {header_size} is smaller than the minimum of 32"
            )));
        }

        Ok(BlockFile {
            mapped,
            magic,
            header_size,
            block_size,
        })
    }

    pub fn magic(&self) -> &[u8; 6] {
        &self.magic
    }

    pub fn header_size(&self) -> u32 {
        self.header_size
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn header(&self) -> Result<Region> {
        self.mapped.region(0, u64::from(self.header_size))
    }

    pub fn user_header(&self) -> Result<Region> {
        self.mapped
            .region(USER_HEADER_OFFSET, u64::from(self.header_size) - USER_HEADER_OFFSET)
    }

    /// Advisory block count derived from current file length; trailing
    /// partial bytes beyond the last full block are tolerated and ignored.
    pub fn block_count(&self) -> u64 {
        let body = self.mapped.len().saturating_sub(u64::from(self.header_size));
        let remainder = body % u64::from(self.block_size);
        if remainder != 0 {
            warn!(
                path = %self.mapped.path().display(),
                remainder,
                block_size = self.block_size,
                "file length leaves a trailing partial block"
            );
        }
        body / u64::from(self.block_size)
    }

    /// Returns block `i`'s raw bytes, uninterpreted.
    pub fn block_region(&self, i: i32) -> Result<Region> {
        if i < 0 {
            return Err(PakError::Format(format!("negative block index {i}")));
        }
        let offset = u64::from(self.header_size) + u64::from(i as u32) * u64::from(self.block_size);
        self.mapped.region(offset, u64::from(self.block_size))
    }

    pub fn mapped(&self) -> &Arc<MappedFile> {
        &self.mapped
    }
}
