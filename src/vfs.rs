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
//! A directory tree built once from a package's index.
//!
//! A node is either a directory (a name -> node map) or a file (an opaque
//! leaf value). Paths are absolute, `/`-separated; asset keys are already
//! lower-cased by the time they reach the package layer, but the VFS
//! itself treats path components as opaque strings and does no further
//! case folding.

use std::collections::BTreeMap;

use crate::error::{PakError, Result};

#[derive(Debug, Clone)]
pub enum Node<T> {
    Dir(BTreeMap<String, Node<T>>),
    File(T),
}

impl<T> Node<T> {
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }
}

/// A read-only path trie. Built once at package open and never mutated
/// again; safe to share across request threads behind a plain `Arc`.
#[derive(Debug, Clone)]
pub struct Vfs<T> {
    root: Node<T>,
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(trimmed.split('/').collect())
}

impl<T> Default for Vfs<T> {
    fn default() -> Self {
        Vfs {
            root: Node::Dir(BTreeMap::new()),
        }
    }
}

impl<T> Vfs<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a file at `abspath`, creating any missing intermediate
    /// directories. Fails if a path component along the way is already a
    /// file (`NotADir`), or if the final component already names a
    /// directory (`IsADir`). A duplicate file entry at the same path is
    /// tolerated and keeps the first value inserted.
    pub fn add_file(&mut self, abspath: &str, value: T) -> Result<()> {
        let names = split_path(abspath)?;
        if names.is_empty() {
            return Err(PakError::IsADir(abspath.to_string()));
        }

        let mut current = &mut self.root;
        for name in &names[..names.len() - 1] {
            current = match current {
                Node::Dir(children) => children
                    .entry((*name).to_string())
                    .or_insert_with(|| Node::Dir(BTreeMap::new())),
                Node::File(_) => return Err(PakError::NotADir(abspath.to_string())),
            };
            if matches!(current, Node::File(_)) {
                return Err(PakError::NotADir(abspath.to_string()));
            }
        }

        let leaf_name = names[names.len() - 1];
        match current {
            Node::Dir(children) => match children.get(leaf_name) {
                Some(Node::Dir(_)) => Err(PakError::IsADir(abspath.to_string())),
                Some(Node::File(_)) => Ok(()), // duplicate: keep the first
                None => {
                    children.insert(leaf_name.to_string(), Node::File(value));
                    Ok(())
                }
            },
            Node::File(_) => Err(PakError::NotADir(abspath.to_string())),
        }
    }

    /// Resolves `abspath` to its node. `"/"` resolves to the root
    /// directory; a missing path component is `NotFound`.
    pub fn lookup(&self, abspath: &str) -> Result<&Node<T>> {
        let names = split_path(abspath)?;
        let mut current = &self.root;
        for name in &names {
            current = match current {
                Node::Dir(children) => children
                    .get(*name)
                    .ok_or_else(|| PakError::NotFound(abspath.to_string()))?,
                Node::File(_) => return Err(PakError::NotADir(abspath.to_string())),
            };
        }
        Ok(current)
    }

    /// Resolves `abspath` and reports whether it names a file, without
    /// requiring the caller to match on [`Node`] directly.
    pub fn entry(&self, abspath: &str) -> Result<(&Node<T>, bool)> {
        let node = self.lookup(abspath)?;
        Ok((node, !node.is_dir()))
    }

    /// `{is_dir, size}`-style stat, generalised: returns whether the node
    /// is a directory, leaving size extraction to the caller (the leaf
    /// value type is opaque here).
    pub fn stat(&self, abspath: &str) -> Result<bool> {
        Ok(self.lookup(abspath)?.is_dir())
    }

    /// Lists the names of a directory's immediate children, sorted.
    pub fn directory_listing(&self, abspath: &str) -> Result<Vec<&str>> {
        match self.lookup(abspath)? {
            Node::Dir(children) => Ok(children.keys().map(String::as_str).collect()),
            Node::File(_) => Err(PakError::NotADir(abspath.to_string())),
        }
    }

    pub fn file_value(&self, abspath: &str) -> Result<&T> {
        match self.lookup(abspath)? {
            Node::File(v) => Ok(v),
            Node::Dir(_) => Err(PakError::IsADir(abspath.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_file_creates_intermediate_directories() {
        let mut vfs: Vfs<u64> = Vfs::new();
        vfs.add_file("/a/b/c.txt", 42).unwrap();
        assert!(vfs.stat("/a").unwrap());
        assert!(vfs.stat("/a/b").unwrap());
        assert!(!vfs.stat("/a/b/c.txt").unwrap());
        assert_eq!(*vfs.file_value("/a/b/c.txt").unwrap(), 42);
    }

    #[test]
    fn directory_listing_is_sorted() {
        let mut vfs: Vfs<u64> = Vfs::new();
        vfs.add_file("/z.txt", 1).unwrap();
        vfs.add_file("/a.txt", 2).unwrap();
        vfs.add_file("/m/n.txt", 3).unwrap();
        assert_eq!(vfs.directory_listing("/").unwrap(), vec!["a.txt", "m", "z.txt"]);
    }

    #[test]
    fn file_then_directory_conflict_is_not_a_dir() {
        let mut vfs: Vfs<u64> = Vfs::new();
        vfs.add_file("/a", 1).unwrap();
        assert!(matches!(vfs.add_file("/a/b", 2), Err(PakError::NotADir(_))));
    }

    #[test]
    fn directory_then_file_conflict_is_is_a_dir() {
        let mut vfs: Vfs<u64> = Vfs::new();
        vfs.add_file("/a/b", 1).unwrap();
        assert!(matches!(vfs.add_file("/a", 2), Err(PakError::IsADir(_))));
    }

    #[test]
    fn lookup_missing_path_is_not_found() {
        let vfs: Vfs<u64> = Vfs::new();
        assert!(matches!(vfs.lookup("/nope"), Err(PakError::NotFound(_))));
    }

    #[test]
    fn lookup_through_a_file_is_not_a_dir() {
        let mut vfs: Vfs<u64> = Vfs::new();
        vfs.add_file("/a", 1).unwrap();
        assert!(matches!(vfs.lookup("/a/b"), Err(PakError::NotADir(_))));
    }

    #[test]
    fn root_directory_listing_on_empty_vfs() {
        let vfs: Vfs<u64> = Vfs::new();
        assert_eq!(vfs.directory_listing("/").unwrap(), Vec::<&str>::new());
    }

    #[test]
    fn duplicate_file_entry_keeps_the_first_value() {
        let mut vfs: Vfs<u64> = Vfs::new();
        vfs.add_file("/a.txt", 1).unwrap();
        vfs.add_file("/a.txt", 2).unwrap();
        assert_eq!(*vfs.file_value("/a.txt").unwrap(), 1);
    }

    #[test]
    fn entry_reports_whether_a_path_is_a_file() {
        let mut vfs: Vfs<u64> = Vfs::new();
        vfs.add_file("/a/b.txt", 5).unwrap();
        let (_, is_file) = vfs.entry("/a/b.txt").unwrap();
        assert!(is_file);
        let (_, is_file) = vfs.entry("/a").unwrap();
        assert!(!is_file);
    }
}
