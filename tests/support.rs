//! Synthetic `.pak` file builder for integration tests.
//!
//! Builds a byte-exact SBBF03/BTreeDB4 database the way the unit tests in
//! `btreedb4::tests::build_single_leaf_db` and
//! `block_file::tests::build_block_file` do, generalised to chain records
//! across as many leaf blocks as the chosen `block_size` forces. There is
//! no production-side encoder in this crate (it is strictly read-only),
//! so this lives only under `tests/`.

use std::io::Write;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

const USER_HEADER_LEN: usize = 12 + 12 + 19;
const HEADER_SIZE: u32 = 0x20 + USER_HEADER_LEN as u32;

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

pub fn encode_key(path: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(path.to_lowercase().as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Builds a package (or a raw BTreeDB4 database, for the non-package
/// engine tests) record by record and emits it as an SBBF03 file whose
/// root is a chained leaf.
pub struct PakBuilder {
    identifier: String,
    block_size: u32,
    records: Vec<([u8; 32], Vec<u8>)>,
}

impl PakBuilder {
    pub fn new(identifier: &str, block_size: u32) -> Self {
        PakBuilder {
            identifier: identifier.to_string(),
            block_size,
            records: Vec::new(),
        }
    }

    /// Inserts a raw `(key, value)` record, keyed exactly as given (used
    /// by tests that want to control the encoded key directly).
    pub fn put_raw(&mut self, key: [u8; 32], value: impl Into<Vec<u8>>) -> &mut Self {
        self.records.push((key, value.into()));
        self
    }

    /// Inserts an asset record under `path`, keyed the way `Package` keys
    /// every asset: `SHA256(lower(path))`.
    pub fn put_asset(&mut self, path: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        self.put_raw(encode_key(path), value);
        self
    }

    /// Adds the well-known `"_index"` record for an `Assets1` package: a
    /// plain `string_list` of asset paths.
    pub fn with_assets1_index(&mut self, paths: &[&str]) -> &mut Self {
        let mut body = varlen_encode(paths.len() as u64);
        for p in paths {
            body.extend_from_slice(&varlen_encode(p.len() as u64));
            body.extend_from_slice(p.as_bytes());
        }
        self.put_asset("_index", body)
    }

    /// Adds the well-known `"_index"` record for an `Assets2` package: a
    /// `string_digest_map` of asset path -> `SHA256(lower(path))`.
    pub fn with_assets2_index(&mut self, paths: &[&str]) -> &mut Self {
        let mut body = varlen_encode(paths.len() as u64);
        for p in paths {
            body.extend_from_slice(&varlen_encode(p.len() as u64));
            body.extend_from_slice(p.as_bytes());
            body.extend_from_slice(&encode_key(p));
        }
        self.put_asset("_index", body)
    }

    pub fn with_digest(&mut self, digest: &[u8]) -> &mut Self {
        self.put_asset("_digest", digest.to_vec())
    }

    /// Encodes every record into the logical leaf-chain byte stream,
    /// splits it across as many `block_size`-sized leaves as needed, and
    /// writes the whole SBBF03 file out to a temp path.
    pub fn build(&self) -> NamedTempFile {
        let mut stream = (self.records.len() as i32).to_be_bytes().to_vec();
        for (key, value) in &self.records {
            stream.extend_from_slice(key);
            stream.extend_from_slice(&varlen_encode(value.len() as u64));
            stream.extend_from_slice(value);
        }

        let leaf_capacity = self.block_size as usize - 6;
        assert!(leaf_capacity > 0, "block_size too small to hold any leaf data");
        let mut leaves: Vec<Vec<u8>> = stream
            .chunks(leaf_capacity)
            .map(|chunk| chunk.to_vec())
            .collect();
        if leaves.is_empty() {
            leaves.push(Vec::new());
        }

        let mut user_header = Vec::with_capacity(USER_HEADER_LEN);
        let mut tag = b"BTreeDB4".to_vec();
        tag.resize(12, 0);
        user_header.extend_from_slice(&tag);
        let mut ident = self.identifier.as_bytes().to_vec();
        ident.resize(12, 0);
        user_header.extend_from_slice(&ident);
        user_header.extend_from_slice(&32i32.to_be_bytes()); // key_size
        user_header.push(0); // alt_flag: root A active
        user_header.push(0); // pad
        user_header.extend_from_slice(&0i32.to_be_bytes()); // root_a block 0
        user_header.push(1); // root_a_is_leaf
        user_header.extend_from_slice(&[0, 0, 0]); // pad
        user_header.extend_from_slice(&(-1i32).to_be_bytes()); // root_b (unused)
        user_header.push(0); // root_b_is_leaf
        assert_eq!(user_header.len(), USER_HEADER_LEN);

        let mut data = Vec::new();
        data.extend_from_slice(b"SBBF03");
        data.extend_from_slice(&HEADER_SIZE.to_be_bytes());
        data.extend_from_slice(&self.block_size.to_be_bytes());
        data.resize(0x20, 0);
        data.extend_from_slice(&user_header);
        data.resize(HEADER_SIZE as usize, 0);

        let leaf_count = leaves.len();
        for (i, leaf_data) in leaves.into_iter().enumerate() {
            let next = if i + 1 < leaf_count { i as i32 + 1 } else { -1 };
            let mut block = b"LL".to_vec();
            block.extend_from_slice(&leaf_data);
            block.resize(self.block_size as usize - 4, 0);
            block.extend_from_slice(&next.to_be_bytes());
            assert_eq!(block.len(), self.block_size as usize);
            data.extend_from_slice(&block);
        }

        let mut f = NamedTempFile::new().expect("create temp pak file");
        f.write_all(&data).expect("write pak file");
        f.flush().expect("flush pak file");
        f
    }
}
