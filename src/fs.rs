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
//! FUSE glue: binds [`Package`]/[`Vfs`] to `fuser::Filesystem`.
//!
//! Every path the package index enumerates gets a small, stable inode
//! number assigned once, up front, since the whole tree is known at open
//! time and never mutates afterwards -- unlike a general-purpose
//! filesystem driver there is no need to populate inodes lazily as they
//! are touched. Mounted attributes get an unbounded TTL for the same
//! reason: nothing a mounted package exposes will ever change underneath
//! the kernel's cache.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, Request, FUSE_ROOT_ID,
};
use tracing::{debug, warn};

use crate::error::PakError;
use crate::package::Package;
use crate::vfs::Vfs;

struct InodeEntry {
    path: String,
    is_dir: bool,
    size: u64,
    /// `(name, child_ino)`, already in the VFS's sorted order.
    children: Vec<(String, u64)>,
}

/// Assigns every path in `vfs` a stable inode number, root first. The tree
/// is read-only once built, so this table never changes after `open`.
struct InodeTable {
    entries: HashMap<u64, InodeEntry>,
}

impl InodeTable {
    fn build(vfs: &Vfs<u64>) -> crate::error::Result<Self> {
        let mut entries = HashMap::new();
        let mut next_ino = FUSE_ROOT_ID;
        assign(vfs, "/", &mut next_ino, &mut entries)?;
        Ok(InodeTable { entries })
    }

    fn get(&self, ino: u64) -> Option<&InodeEntry> {
        self.entries.get(&ino)
    }
}

fn assign(
    vfs: &Vfs<u64>,
    path: &str,
    next_ino: &mut u64,
    entries: &mut HashMap<u64, InodeEntry>,
) -> crate::error::Result<u64> {
    let ino = *next_ino;
    *next_ino += 1;

    let is_dir = vfs.stat(path)?;
    let mut children = Vec::new();
    let size = if is_dir {
        for name in vfs.directory_listing(path)? {
            let child_path = if path == "/" {
                format!("/{name}")
            } else {
                format!("{path}/{name}")
            };
            let child_ino = assign(vfs, &child_path, next_ino, entries)?;
            children.push((name.to_string(), child_ino));
        }
        0
    } else {
        *vfs.file_value(path)?
    };

    entries.insert(
        ino,
        InodeEntry {
            path: path.to_string(),
            is_dir,
            size,
            children,
        },
    );
    Ok(ino)
}

/// Read-only FUSE filesystem over a `.pak` package.
pub struct PakFilesystem {
    package: Package,
    inodes: InodeTable,
}

impl PakFilesystem {
    /// Allow the kernel to cache attributes and entries for an unlimited
    /// amount of time: nothing a mounted package exposes will ever change.
    const TTL: Duration = Duration::from_secs(u64::MAX);

    pub fn new(package: Package) -> crate::error::Result<Self> {
        let vfs = package.build_vfs()?;
        let inodes = InodeTable::build(&vfs)?;
        Ok(PakFilesystem { package, inodes })
    }

    fn attr_for(&self, ino: u64, entry: &InodeEntry) -> FileAttr {
        let kind = if entry.is_dir {
            FileType::Directory
        } else {
            FileType::RegularFile
        };
        let perm = if entry.is_dir { 0o0555 } else { 0o0444 };
        let now = SystemTime::UNIX_EPOCH;
        FileAttr {
            ino,
            size: entry.size,
            blocks: entry.size.div_ceil(512),
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind,
            perm,
            nlink: 1,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

impl Filesystem for PakFilesystem {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_entry) = self.inodes.get(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let name = name.to_string_lossy();
        match parent_entry.children.iter().find(|(n, _)| n == name.as_ref()) {
            Some((_, child_ino)) => {
                let child = self.inodes.get(*child_ino).expect("child ino must be present");
                reply.entry(&Self::TTL, &self.attr_for(*child_ino, child), 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.inodes.get(ino) {
            Some(entry) => reply.attr(&Self::TTL, &self.attr_for(ino, entry)),
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.inodes.get(ino) {
            Some(entry) if entry.is_dir => reply.error(libc::EISDIR),
            Some(_) => reply.opened(0, fuser::consts::FOPEN_KEEP_CACHE),
            None => reply.error(libc::ENOENT),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(entry) = self.inodes.get(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if entry.is_dir {
            reply.error(libc::EISDIR);
            return;
        }
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        match self.package.file_contents(&entry.path, offset as u64, size as i64) {
            Ok(contents) => reply.data(&contents),
            Err(e @ PakError::KeyNotFound { .. }) => {
                warn!(path = %entry.path, error = %e, "indexed path vanished from the package on read");
                reply.error(pak_errno(&e));
            }
            Err(e) => {
                debug!(path = %entry.path, error = %e, "read failed");
                reply.error(pak_errno(&e));
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.inodes.get(ino) {
            Some(entry) if entry.is_dir => reply.opened(0, fuser::consts::FOPEN_CACHE_DIR),
            Some(_) => reply.error(libc::ENOTDIR),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(entry) = self.inodes.get(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !entry.is_dir {
            reply.error(libc::ENOTDIR);
            return;
        }

        let mut listing: Vec<(u64, FileType, &str)> = Vec::with_capacity(entry.children.len() + 2);
        listing.push((ino, FileType::Directory, "."));
        listing.push((ino, FileType::Directory, ".."));
        for (name, child_ino) in &entry.children {
            let kind = if self.inodes.get(*child_ino).map(|e| e.is_dir).unwrap_or(false) {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            listing.push((*child_ino, kind, name.as_str()));
        }

        for (i, (child_ino, kind, name)) in listing.into_iter().enumerate().skip(offset as usize) {
            let next_offset = (i + 1) as i64;
            if reply.add(child_ino, next_offset, kind, OsStr::from_bytes(name.as_bytes())) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, req: &Request, ino: u64, fh: u64, flags: i32, reply: ReplyEmpty) {
        self.release(req, ino, fh, flags, None, false, reply)
    }

    fn access(&mut self, _req: &Request, _ino: u64, _mask: i32, reply: ReplyEmpty) {
        reply.ok();
    }
}

/// Error -> errno: `NotFound` -> `ENOENT`, `IsADir` -> `EISDIR`, `NotADir`
/// -> `ENOTDIR`, everything else -> `EIO`. [`PakError::to_errno`] already
/// implements the table; this is the one call site that should use it.
fn pak_errno(e: &PakError) -> i32 {
    e.to_errno()
}
