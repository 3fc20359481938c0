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
//! CLI configuration.
//!
//! A `pak_file` and `mount_point` positional pair, `-v/--verbose` to raise
//! the log level, and `--pages` to control the paged-mapping multiplier
//! (default [`crate::paging::mapped_file::DEFAULT_PAGE_COUNT`]).
//! `-o/--option` passes raw FUSE mount options through untouched. There is
//! deliberately no `-w/--write` flag: the on-disk format's two-root commit
//! protocol is modelled in [`crate::btreedb4`] but no write path exists.

use std::path::PathBuf;

use clap::Parser;

use crate::paging::mapped_file::DEFAULT_PAGE_COUNT;

/// Mounts a StarBound `.pak` file as a read-only FUSE filesystem.
#[derive(Debug, Parser)]
#[command(name = "starpak-fuse", version, about)]
pub struct Config {
    /// The `.pak` file to mount.
    pub pak_file: PathBuf,

    /// The directory on which to mount it.
    pub mount_point: PathBuf,

    /// Be noisy (debug-level logging instead of info).
    #[arg(short, long)]
    pub verbose: bool,

    /// Map this many OS pages at a time.
    #[arg(long, default_value_t = DEFAULT_PAGE_COUNT)]
    pub pages: u64,

    /// Re-interpret a free block as a leaf when a chain read lands on one,
    /// instead of failing with a broken-chain error.
    #[arg(long)]
    pub repair: bool,

    /// Raw FUSE mount option, passed straight through to the kernel driver.
    /// May be given more than once.
    #[arg(short = 'o', long = "option")]
    pub options: Vec<String>,
}

impl Config {
    pub fn parse_args() -> Self {
        Config::parse()
    }

    /// The `tracing` level implied by `-v`.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
