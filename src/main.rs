/**
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
use std::process::ExitCode;

use fuser::MountOption;
use starpak_fuse::btreedb4::BTreeDb4Options;
use starpak_fuse::config::Config;
use starpak_fuse::fs::PakFilesystem;
use starpak_fuse::package::Package;

use tracing_subscriber::EnvFilter;

/// Maps a raw `-o` option string to a typed `fuser` mount option. Options
/// this crate doesn't specifically recognize still reach the kernel
/// driver, just as a custom string.
fn parse_mount_option(raw: &str) -> MountOption {
    match raw {
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "dirsync" => MountOption::DirSync,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        other => MountOption::CUSTOM(other.to_string()),
    }
}

fn main() -> ExitCode {
    let config = Config::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())))
        .init();

    let options = BTreeDb4Options {
        repair: config.repair,
    };

    let package = match Package::open(&config.pak_file, config.pages, options) {
        Ok(package) => package,
        Err(e) => {
            tracing::error!(pak_file = %config.pak_file.display(), error = %e, "failed to open package");
            return ExitCode::FAILURE;
        }
    };

    let filesystem = match PakFilesystem::new(package) {
        Ok(fs) => fs,
        Err(e) => {
            tracing::error!(error = %e, "failed to build package index");
            return ExitCode::FAILURE;
        }
    };

    let mut options = vec![
        MountOption::FSName("starpak".to_string()),
        MountOption::RO,
    ];
    options.extend(config.options.iter().map(|o| parse_mount_option(o)));

    tracing::info!(
        pak_file = %config.pak_file.display(),
        mount_point = %config.mount_point.display(),
        "mounting package"
    );

    if let Err(e) = fuser::mount2(filesystem, &config.mount_point, &options) {
        tracing::error!(error = %e, "mount failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
