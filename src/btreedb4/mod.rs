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
//! BTreeDB4: the B+-tree database that sits inside an SBBF02/SBBF03 block
//! file. Parses the user header, classifies blocks, descends from the
//! active root via upper-bound bisection, and reads records out of the
//! chained-leaf stream the descent lands on.

pub mod block;
pub mod leaf_reader;

use std::path::Path;

use crate::block_file::BlockFile;
use crate::error::{PakError, Result};
use crate::sbon::SbonRead;
use block::{parse_block_bytes, Block};
use leaf_reader::LeafReader;

/// Records inside a leaf chain are bounded at 1000 entries as a sanity
/// check against corrupt or adversarial input.
const MAX_RECORD_KEYS: i32 = 1000;

const FORMAT_TAG_LEN: u64 = 12;
const IDENTIFIER_LEN: u64 = 12;

/// Options controlling how the tree is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct BTreeDb4Options {
    /// When a chained-leaf read encounters a free block, reinterpret it as
    /// a leaf instead of failing. Off by default; only meant for
    /// salvaging packages with a corrupted chain.
    pub repair: bool,
}

struct Root {
    block: i32,
    is_leaf: bool,
}

/// A parsed BTreeDB4 database.
pub struct BTreeDb4 {
    block_file: BlockFile,
    identifier: String,
    key_size: usize,
    alt_flag: bool,
    root_a: Root,
    root_b: Root,
    options: BTreeDb4Options,
}

impl BTreeDb4 {
    pub fn open<P: AsRef<Path>>(path: P, page_count: u64, options: BTreeDb4Options) -> Result<Self> {
        let block_file = BlockFile::open(path, page_count)?;
        Self::from_block_file(block_file, options)
    }

    pub fn from_block_file(block_file: BlockFile, options: BTreeDb4Options) -> Result<Self> {
        let mut header = block_file.user_header()?;

        let format_tag = header.fixlen_string(FORMAT_TAG_LEN)?;
        if format_tag != "BTreeDB4" {
            return Err(PakError::Format(format!(
                "user header tag is {format_tag:?}, expected \"BTreeDB4\""
            )));
        }
        let identifier = header.fixlen_string(IDENTIFIER_LEN)?;

        let struct_bytes = header.read_exact(19)?;
        let key_size = i32::from_be_bytes(struct_bytes[0..4].try_into().unwrap());
        if key_size < 0 {
            return Err(PakError::Format(format!("negative key_size {key_size}")));
        }
        let alt_flag = struct_bytes[4] != 0;
        // struct_bytes[5] is a pad byte.
        let root_a_block = i32::from_be_bytes(struct_bytes[6..10].try_into().unwrap());
        let root_a_is_leaf = struct_bytes[10] != 0;
        // struct_bytes[11..14] are pad bytes.
        let root_b_block = i32::from_be_bytes(struct_bytes[14..18].try_into().unwrap());
        let root_b_is_leaf = struct_bytes[18] != 0;

        Ok(BTreeDb4 {
            block_file,
            identifier,
            key_size: key_size as usize,
            alt_flag,
            root_a: Root {
                block: root_a_block,
                is_leaf: root_a_is_leaf,
            },
            root_b: Root {
                block: root_b_block,
                is_leaf: root_b_is_leaf,
            },
            options,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    fn active_root(&self) -> &Root {
        if self.alt_flag {
            &self.root_b
        } else {
            &self.root_a
        }
    }

    /// Preserved for a hypothetical writer: swaps which root is active and
    /// flips the on-disk `alt_flag`. The read-only core never calls this.
    #[allow(dead_code)]
    fn commit(&mut self) {
        self.alt_flag = !self.alt_flag;
    }

    /// Descends from the active root via upper-bound bisection over index
    /// blocks, returning the block index where the chained-leaf read
    /// should begin.
    fn descend(&self, key: &[u8]) -> Result<i32> {
        if key.len() != self.key_size {
            return Err(PakError::Format(format!(
                "key is {} bytes, expected key_size {}",
                key.len(),
                self.key_size
            )));
        }

        let mut current = self.active_root().block;
        loop {
            let region = self.block_file.block_region(current)?;
            let raw = region.read(Some(self.block_file.block_size() as i64), Some(0), false)?;
            match parse_block_bytes(&raw, current, self.key_size)? {
                Block::Index(ib) => current = ib.get_block_for_key(key),
                _ => return Ok(current),
            }
        }
    }

    fn read_record_count(reader: &mut LeafReader<'_>) -> Result<i32> {
        let bytes = reader.read(4)?;
        let n = i32::from_be_bytes(bytes.try_into().unwrap());
        if !(0..MAX_RECORD_KEYS).contains(&n) {
            return Err(PakError::Format(format!(
                "leaf record count {n} is outside the expected range [0, {MAX_RECORD_KEYS})"
            )));
        }
        Ok(n)
    }

    /// Looks up `key` (already encoded to `key_size` bytes) and returns its
    /// value, or `None` if the leaf chain was exhausted without a match.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let start = self.descend(key)?;
        let mut reader = LeafReader::new(&self.block_file, start, self.key_size, self.options.repair);
        let num_keys = Self::read_record_count(&mut reader)?;

        for _ in 0..num_keys {
            let record_key = reader.read(self.key_size as u64)?;
            let value = reader.bytes()?;
            if record_key == key {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Like [`Self::get`] but returns only the value's length, skipping the
    /// payload of non-matching records without materialising it.
    pub fn get_size(&self, key: &[u8]) -> Result<Option<u64>> {
        let start = self.descend(key)?;
        let mut reader = LeafReader::new(&self.block_file, start, self.key_size, self.options.repair);
        let num_keys = Self::read_record_count(&mut reader)?;

        for _ in 0..num_keys {
            let record_key = reader.read(self.key_size as u64)?;
            let len = reader.varlen_number()?;
            if record_key == key {
                return Ok(Some(len));
            }
            reader.skip(len)?;
        }
        Ok(None)
    }

    pub fn block_file(&self) -> &BlockFile {
        &self.block_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a minimal BTreeDB4 file: header, one leaf block holding the
    /// given `(key, value)` records directly as the root (the root is
    /// itself a leaf, so no index descent is needed).
    fn build_single_leaf_db(key_size: usize, block_size: u32, records: &[(Vec<u8>, Vec<u8>)]) -> tempfile::NamedTempFile {
        let header_size: u32 = 32 + 12 + 12 + 19;
        let header_size = header_size.div_ceil(1).max(64); // keep it simple/round

        let mut user_header = Vec::new();
        let mut tag = b"BTreeDB4".to_vec();
        tag.resize(12, 0);
        user_header.extend_from_slice(&tag);
        let mut ident = b"Assets2".to_vec();
        ident.resize(12, 0);
        user_header.extend_from_slice(&ident);
        user_header.extend_from_slice(&(key_size as i32).to_be_bytes());
        user_header.push(0); // alt_flag = false -> root_a active
        user_header.push(0); // pad
        user_header.extend_from_slice(&0i32.to_be_bytes()); // root_a block 0
        user_header.push(1); // root_a_is_leaf
        user_header.extend_from_slice(&[0, 0, 0]); // pad
        user_header.extend_from_slice(&(-1i32).to_be_bytes()); // root_b block (unused)
        user_header.push(0); // root_b_is_leaf

        let mut data = Vec::new();
        data.extend_from_slice(b"SBBF03");
        data.extend_from_slice(&header_size.to_be_bytes());
        data.extend_from_slice(&block_size.to_be_bytes());
        data.resize(0x20, 0);
        data.extend_from_slice(&user_header);
        data.resize(header_size as usize, 0);

        let mut leaf_data = (records.len() as i32).to_be_bytes().to_vec();
        for (k, v) in records {
            assert_eq!(k.len(), key_size);
            leaf_data.extend_from_slice(k);
            leaf_data.extend_from_slice(&varlen_encode(v.len() as u64));
            leaf_data.extend_from_slice(v);
        }

        let mut leaf_block = b"LL".to_vec();
        leaf_block.extend_from_slice(&leaf_data);
        leaf_block.extend_from_slice(&(-1i32).to_be_bytes());
        leaf_block.resize(block_size as usize, 0);

        data.extend_from_slice(&leaf_block);

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&data).unwrap();
        f.flush().unwrap();
        f
    }

    fn varlen_encode(mut value: u64) -> Vec<u8> {
        let mut groups = vec![(value & 0x7f) as u8];
        value >>= 7;
        while value > 0 {
            groups.push((value & 0x7f) as u8 | 0x80);
            value >>= 7;
        }
        groups.reverse();
        groups
    }

    #[test]
    fn parses_header_and_looks_up_a_record() {
        let records = vec![(vec![1u8; 4], b"hello".to_vec()), (vec![2u8; 4], b"world".to_vec())];
        let f = build_single_leaf_db(4, 128, &records);
        let db = BTreeDb4::open(f.path(), 1, BTreeDb4Options::default()).unwrap();

        assert_eq!(db.identifier(), "Assets2");
        assert_eq!(db.key_size(), 4);

        assert_eq!(db.get(&[1, 1, 1, 1]).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(db.get(&[2, 2, 2, 2]).unwrap(), Some(b"world".to_vec()));
        assert_eq!(db.get(&[9, 9, 9, 9]).unwrap(), None);
    }

    #[test]
    fn get_size_matches_value_length_without_materialising_others() {
        let records = vec![(vec![1u8; 4], b"hello".to_vec()), (vec![2u8; 4], b"a longer value here".to_vec())];
        let f = build_single_leaf_db(4, 128, &records);
        let db = BTreeDb4::open(f.path(), 1, BTreeDb4Options::default()).unwrap();

        assert_eq!(db.get_size(&[2, 2, 2, 2]).unwrap(), Some(19));
        assert_eq!(db.get_size(&[9, 9, 9, 9]).unwrap(), None);
    }

    #[test]
    fn rejects_non_btreedb4_tag() {
        let header_size: u32 = 64;
        let mut data = Vec::new();
        data.extend_from_slice(b"SBBF03");
        data.extend_from_slice(&header_size.to_be_bytes());
        data.extend_from_slice(&16u32.to_be_bytes());
        data.resize(0x20, 0);
        data.extend_from_slice(&[b'X'; 12]);
        data.resize(header_size as usize, 0);

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&data).unwrap();
        f.flush().unwrap();

        assert!(matches!(
            BTreeDb4::open(f.path(), 1, BTreeDb4Options::default()),
            Err(PakError::Format(_))
        ));
    }
}
