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
//! Chained-leaf record stream.
//!
//! A descent lands on a block that starts a leaf chain; this reader
//! concatenates that block's `data` with every successor's `data`
//! (following `next_block`) into one logical byte stream, fetching further
//! blocks lazily as the stream is consumed. Under repair mode a free block
//! encountered mid-chain is reinterpreted as a leaf instead of failing.

use std::collections::HashSet;

use crate::block_file::BlockFile;
use crate::btreedb4::block::{parse_block_bytes, restore_free_as_leaf, Block};
use crate::error::{PakError, Result};
use crate::sbon::SbonRead;

pub struct LeafReader<'a> {
    block_file: &'a BlockFile,
    key_size: usize,
    repair: bool,
    buffer: Vec<u8>,
    buf_pos: usize,
    next_block: i32,
    visited: HashSet<i32>,
}

impl<'a> LeafReader<'a> {
    pub fn new(block_file: &'a BlockFile, start_block: i32, key_size: usize, repair: bool) -> Self {
        LeafReader {
            block_file,
            key_size,
            repair,
            buffer: Vec::new(),
            buf_pos: 0,
            next_block: start_block,
            visited: HashSet::new(),
        }
    }

    fn available(&self) -> usize {
        self.buffer.len() - self.buf_pos
    }

    /// Pulls leaves until at least `need` bytes are buffered, or fails with
    /// `ChainBroken` if the chain cannot supply that much.
    fn ensure(&mut self, need: usize) -> Result<()> {
        while self.available() < need {
            if self.next_block == -1 {
                return Err(PakError::ChainBroken(
                    "leaf chain ended before the requested bytes were available".to_string(),
                ));
            }
            if !self.visited.insert(self.next_block) {
                return Err(PakError::ChainBroken(format!(
                    "leaf chain revisits block {}",
                    self.next_block
                )));
            }

            let region = self.block_file.block_region(self.next_block)?;
            let raw = region.read(Some(self.block_file.block_size() as i64), Some(0), false)?;
            let block = parse_block_bytes(&raw, self.next_block, self.key_size)?;

            let leaf = match block {
                Block::Leaf(lb) => lb,
                Block::Free(_) if self.repair => restore_free_as_leaf(&raw)?,
                Block::Free(_) => {
                    return Err(PakError::ChainBroken(format!(
                        "block {} is free, not a leaf, and repair mode is off",
                        self.next_block
                    )))
                }
                Block::Index(_) => {
                    return Err(PakError::ChainBroken(format!(
                        "block {} is an index block, not a leaf",
                        self.next_block
                    )))
                }
                Block::Null => {
                    return Err(PakError::ChainBroken(format!(
                        "block {} is unused (null signature)",
                        self.next_block
                    )))
                }
            };

            if self.buf_pos > 0 {
                self.buffer.drain(0..self.buf_pos);
                self.buf_pos = 0;
            }
            self.buffer.extend_from_slice(&leaf.data);
            self.next_block = leaf.next_block;
        }
        Ok(())
    }

    /// Skips `n` bytes without materialising them (used to step past a
    /// record's value once it is known not to match).
    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.ensure(n as usize)?;
        self.buf_pos += n as usize;
        Ok(())
    }
}

impl SbonRead for LeafReader<'_> {
    fn read(&mut self, n: u64) -> Result<Vec<u8>> {
        self.ensure(n as usize)?;
        let out = self.buffer[self.buf_pos..self.buf_pos + n as usize].to_vec();
        self.buf_pos += n as usize;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_block_file(block_size: u32, blocks: &[Vec<u8>]) -> tempfile::NamedTempFile {
        let header_size: u32 = 32;
        let mut data = Vec::new();
        data.extend_from_slice(b"SBBF03");
        data.extend_from_slice(&header_size.to_be_bytes());
        data.extend_from_slice(&block_size.to_be_bytes());
        data.resize(header_size as usize, 0);
        for block in blocks {
            let mut b = block.clone();
            b.resize(block_size as usize, 0);
            data.extend_from_slice(&b);
        }
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&data).unwrap();
        f.flush().unwrap();
        f
    }

    fn leaf_bytes(data: &[u8], next_block: i32) -> Vec<u8> {
        let mut b = b"LL".to_vec();
        b.extend_from_slice(data);
        b.extend_from_slice(&next_block.to_be_bytes());
        b
    }

    #[test]
    fn reads_across_a_chained_leaf() {
        let block_size = 16;
        // Two leaves, 6 bytes of data each (16 - 2 sig - 4 trailing ptr - ... adjust)
        // block_size=16 => data len = 16 - 2 - 4 = 10
        let leaf0 = leaf_bytes(b"0123456789", 1);
        let leaf1 = leaf_bytes(b"ABCDEFGHIJ", -1);
        let f = build_block_file(block_size, &[leaf0, leaf1]);
        let bf = crate::block_file::BlockFile::open(f.path(), 1).unwrap();

        let mut reader = LeafReader::new(&bf, 0, 4, false);
        let all = reader.read(20).unwrap();
        assert_eq!(all, b"0123456789ABCDEFGHIJ");
    }

    #[test]
    fn chain_ending_prematurely_is_chain_broken() {
        let block_size = 16;
        let leaf0 = leaf_bytes(b"0123456789", -1);
        let f = build_block_file(block_size, &[leaf0]);
        let bf = crate::block_file::BlockFile::open(f.path(), 1).unwrap();

        let mut reader = LeafReader::new(&bf, 0, 4, false);
        assert!(matches!(reader.read(20), Err(PakError::ChainBroken(_))));
    }

    #[test]
    fn revisiting_a_block_is_chain_broken() {
        let block_size = 16;
        // leaf 0 points to leaf 1, which points back to 0: a cycle.
        let leaf0 = leaf_bytes(b"0123456789", 1);
        let leaf1 = leaf_bytes(b"ABCDEFGHIJ", 0);
        let f = build_block_file(block_size, &[leaf0, leaf1]);
        let bf = crate::block_file::BlockFile::open(f.path(), 1).unwrap();

        let mut reader = LeafReader::new(&bf, 0, 4, false);
        assert!(matches!(reader.read(1000), Err(PakError::ChainBroken(_))));
    }

    #[test]
    fn free_block_without_repair_is_chain_broken() {
        let block_size = 16;
        let mut free = b"FF".to_vec();
        free.extend_from_slice(&(-1i32).to_be_bytes());
        let f = build_block_file(block_size, &[free]);
        let bf = crate::block_file::BlockFile::open(f.path(), 1).unwrap();

        let mut reader = LeafReader::new(&bf, 0, 4, false);
        assert!(matches!(reader.read(1), Err(PakError::ChainBroken(_))));
    }

    #[test]
    fn free_block_with_repair_is_read_as_a_leaf() {
        let block_size = 16;
        let mut free = b"FF".to_vec();
        free.extend_from_slice(b"0123456789");
        free.extend_from_slice(&(-1i32).to_be_bytes());
        let f = build_block_file(block_size, &[free]);
        let bf = crate::block_file::BlockFile::open(f.path(), 1).unwrap();

        let mut reader = LeafReader::new(&bf, 0, 4, true);
        let data = reader.read(10).unwrap();
        assert_eq!(data, b"0123456789");
    }
}
