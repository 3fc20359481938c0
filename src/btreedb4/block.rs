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
//! Block classification and parsing: every block in a [`BlockFile`] starts
//! with a two-byte signature (`II`/`LL`/`FF`/`\0\0`) that selects how the
//! rest of the block is interpreted.
//!
//! [`BlockFile`]: crate::block_file::BlockFile

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{PakError, Result};
use crate::paging::Region;

const INDEX_SIGNATURE: [u8; 2] = *b"II";
const LEAF_SIGNATURE: [u8; 2] = *b"LL";
const FREE_SIGNATURE: [u8; 2] = *b"FF";
const NULL_SIGNATURE: [u8; 2] = [0, 0];

/// A parsed index block: `level`, `num_keys` `(key, child)` pairs in
/// ascending key order, and the leftmost child pointer.
#[derive(Debug, Clone)]
pub struct IndexBlock {
    pub level: u8,
    pub left_child: i32,
    pub entries: Vec<(Vec<u8>, i32)>,
}

impl IndexBlock {
    /// Upper-bound bisection: for search key `K`, returns
    /// `values[bisect_right(keys, K)]` where
    /// `values = [left_child, child_1, ..., child_n]`.
    pub fn get_block_for_key(&self, key: &[u8]) -> i32 {
        // partition_point finds the first index where entries[i].0 > key is
        // false no more, i.e. the count of entries whose key <= search key is
        // NOT what bisect_right wants directly; bisect_right(keys, K) is the
        // count of keys <= K. partition_point(|k| k <= K) gives exactly that.
        let idx = self.entries.partition_point(|(k, _)| k.as_slice() <= key);
        if idx == 0 {
            self.left_child
        } else {
            self.entries[idx - 1].1
        }
    }
}

/// A parsed leaf block: opaque `data` bytes plus the next block in the
/// chain (`-1` meaning none).
#[derive(Debug, Clone)]
pub struct LeafBlock {
    pub data: Vec<u8>,
    pub next_block: i32,
}

/// A parsed free block: the reclaimable remainder is retained so repair
/// mode can reinterpret it as a leaf.
#[derive(Debug, Clone)]
pub struct FreeBlock {
    pub next_free_block: i32,
    pub remainder: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Block {
    Index(IndexBlock),
    Leaf(LeafBlock),
    Free(FreeBlock),
    /// The `\0\0` signature: no block present at this index.
    Null,
}

/// Parses the block at `region` (which spans exactly one block, signature
/// included). `key_size` is the BTreeDB4 header's declared key width.
pub fn parse_block(region: &Region, block_index: i32, key_size: usize, block_size: u32) -> Result<Block> {
    let raw = region.read(Some(block_size as i64), Some(0), false)?;
    parse_block_bytes(&raw, block_index, key_size)
}

pub fn parse_block_bytes(raw: &[u8], block_index: i32, key_size: usize) -> Result<Block> {
    if raw.len() < 2 {
        return Err(PakError::Format(format!(
            "block {block_index} is shorter than a signature"
        )));
    }
    let signature = [raw[0], raw[1]];
    let body = &raw[2..];

    if signature == NULL_SIGNATURE {
        return Ok(Block::Null);
    }
    if signature == INDEX_SIGNATURE {
        return parse_index(body, key_size).map(Block::Index);
    }
    if signature == LEAF_SIGNATURE {
        return Ok(Block::Leaf(parse_leaf(body)?));
    }
    if signature == FREE_SIGNATURE {
        return Ok(Block::Free(parse_free(body)?));
    }

    Err(PakError::InvalidSignature {
        block: block_index,
        signature,
    })
}

fn parse_index(mut body: &[u8], key_size: usize) -> Result<IndexBlock> {
    let level = body.read_u8()?;
    let num_keys = body.read_i32::<BigEndian>()?;
    if num_keys < 0 {
        return Err(PakError::Format(format!("index block has negative num_keys {num_keys}")));
    }
    let left_child = body.read_i32::<BigEndian>()?;

    let mut entries = Vec::with_capacity(num_keys as usize);
    for _ in 0..num_keys {
        if body.len() < key_size + 4 {
            return Err(PakError::Format("index block truncated mid-entry".to_string()));
        }
        let key = body[..key_size].to_vec();
        body = &body[key_size..];
        let child = body.read_i32::<BigEndian>()?;
        entries.push((key, child));
    }

    Ok(IndexBlock {
        level,
        left_child,
        entries,
    })
}

fn parse_leaf(body: &[u8]) -> Result<LeafBlock> {
    if body.len() < 4 {
        return Err(PakError::Format("leaf block shorter than trailing pointer".to_string()));
    }
    let split = body.len() - 4;
    let data = body[..split].to_vec();
    let next_block = (&body[split..]).read_i32::<BigEndian>()?;
    Ok(LeafBlock { data, next_block })
}

fn parse_free(body: &[u8]) -> Result<FreeBlock> {
    if body.len() < 4 {
        return Err(PakError::Format("free block shorter than next-pointer".to_string()));
    }
    let mut head = &body[..4];
    let next_free_block = head.read_i32::<BigEndian>()?;
    let remainder = body[4..].to_vec();
    Ok(FreeBlock {
        next_free_block,
        remainder,
    })
}

/// Repair-mode reinterpretation of a free block's raw bytes as a leaf:
/// the trailing 4 bytes become `next_block`, everything between the
/// signature and that tail becomes `data`.
pub fn restore_free_as_leaf(signature_and_body: &[u8]) -> Result<LeafBlock> {
    parse_leaf(&signature_and_body[2..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_bytes(level: u8, left_child: i32, entries: &[(Vec<u8>, i32)]) -> Vec<u8> {
        let mut b = INDEX_SIGNATURE.to_vec();
        b.push(level);
        b.extend_from_slice(&(entries.len() as i32).to_be_bytes());
        b.extend_from_slice(&left_child.to_be_bytes());
        for (key, child) in entries {
            b.extend_from_slice(key);
            b.extend_from_slice(&child.to_be_bytes());
        }
        b
    }

    #[test]
    fn parses_index_block() {
        let entries = vec![(vec![5u8], 10), (vec![9u8], 11)];
        let raw = index_bytes(0, 1, &entries);
        let block = parse_block_bytes(&raw, 0, 1).unwrap();
        match block {
            Block::Index(ib) => {
                assert_eq!(ib.level, 0);
                assert_eq!(ib.left_child, 1);
                assert_eq!(ib.entries, entries);
            }
            _ => panic!("expected index block"),
        }
    }

    #[test]
    fn index_lookup_upper_bound_bisection() {
        let entries = vec![(vec![5u8], 10), (vec![9u8], 11), (vec![20u8], 12)];
        let ib = IndexBlock {
            level: 0,
            left_child: 1,
            entries,
        };
        assert_eq!(ib.get_block_for_key(&[3]), 1); // before first key -> left_child
        assert_eq!(ib.get_block_for_key(&[5]), 10); // equal to a key -> that key's child
        assert_eq!(ib.get_block_for_key(&[7]), 10);
        assert_eq!(ib.get_block_for_key(&[9]), 11);
        assert_eq!(ib.get_block_for_key(&[100]), 12); // past last key
    }

    #[test]
    fn parses_leaf_block() {
        let mut raw = LEAF_SIGNATURE.to_vec();
        raw.extend_from_slice(b"payload!");
        raw.extend_from_slice(&(-1i32).to_be_bytes());
        let block = parse_block_bytes(&raw, 0, 1).unwrap();
        match block {
            Block::Leaf(lb) => {
                assert_eq!(lb.data, b"payload!");
                assert_eq!(lb.next_block, -1);
            }
            _ => panic!("expected leaf block"),
        }
    }

    #[test]
    fn parses_free_block_and_restores_as_leaf() {
        let mut raw = FREE_SIGNATURE.to_vec();
        raw.extend_from_slice(&(-1i32).to_be_bytes());
        raw.extend_from_slice(b"junkdata");
        raw.extend_from_slice(&7i32.to_be_bytes());

        let block = parse_block_bytes(&raw, 0, 1).unwrap();
        assert!(matches!(block, Block::Free(_)));

        let restored = restore_free_as_leaf(&raw).unwrap();
        assert_eq!(restored.data, b"junkdata");
        assert_eq!(restored.next_block, 7);
    }

    #[test]
    fn null_signature_yields_null_block() {
        let raw = vec![0u8; 16];
        assert!(matches!(parse_block_bytes(&raw, 0, 1).unwrap(), Block::Null));
    }

    #[test]
    fn unknown_signature_is_invalid_signature_error() {
        let raw = b"ZZjunk".to_vec();
        let err = parse_block_bytes(&raw, 3, 1).unwrap_err();
        match err {
            PakError::InvalidSignature { block, signature } => {
                assert_eq!(block, 3);
                assert_eq!(signature, [b'Z', b'Z']);
            }
            _ => panic!("expected invalid signature error"),
        }
    }
}
