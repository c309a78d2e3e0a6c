/*
 * Created on Wed Jun 19 2024
 *
 * This file is a part of the SHFS tool suite
 * SHFS (Simon's Hash Filesystem) is a content-addressed filesystem for
 * immutable objects, designed for serving web assets from one or more
 * block devices that compose a single striped volume.
 *
 * Copyright (c) 2024, The shfs-tools developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # shfs-admin
//!
//! The SHFS volume administration tool. Mounts the volume found on the
//! member devices given on the command line, executes the action tokens in
//! order, counting per-token failures, and unmounts, flushing the modified
//! hash-table chunks. Exits zero only if every token succeeded and no
//! cancel signal arrived.

mod actions;
mod args;
mod interrupt;

use {
    crate::args::CliParseReturn,
    env_logger::Builder,
    libshfs::{util::terminal, vol::Volume, TOOLSET, VERSION},
    std::{env, process},
};

const EXIT_CODE_FAILURE: i32 = 0x01;
const EXIT_CODE_CANCEL: i32 = 0x02;

fn main() {
    process::exit(run());
}

fn log_filter(verbosity: u8) -> String {
    env::var("SHFS_LOG").unwrap_or_else(|_| {
        match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
        .to_owned()
    })
}

fn run() -> i32 {
    let parsed = match args::parse_cli_args(env::args()) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Try `shfs-admin --help' for more information.");
            return EXIT_CODE_FAILURE;
        }
    };
    let args = match parsed {
        CliParseReturn::Help => {
            args::print_usage("shfs-admin");
            return 0;
        }
        CliParseReturn::Version => {
            println!("{}: Admin v{}", TOOLSET, VERSION);
            return 0;
        }
        CliParseReturn::Run(args) => args,
    };
    let args::Args {
        tokens,
        devices,
        verbosity,
        force: _force,
    } = args;
    Builder::new().parse_filters(&log_filter(verbosity)).init();
    interrupt::install_handlers();
    if interrupt::cancelled() {
        return EXIT_CODE_CANCEL;
    }

    let mut vol = match Volume::mount(&devices) {
        Ok(vol) => vol,
        Err(e) => {
            log::error!("could not mount volume: {e}");
            return EXIT_CODE_FAILURE;
        }
    };

    let mut executed = 0usize;
    let mut failed = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        if interrupt::cancelled() {
            log::warn!("caught abort signal: cancelling...");
            break;
        }
        log::debug!("*** token {}: {}", i, token.tag());
        if let Err(e) = actions::run(&mut vol, token) {
            log::error!("{e}");
            failed += 1;
        }
        executed += 1;
    }
    log::debug!(
        "*** {} tokens executed on volume '{}'",
        executed,
        vol.volname()
    );

    let volname = vol.volname().to_owned();
    if let Err(e) = vol.umount() {
        let _ = terminal::corruption_alert(&volname, &e);
        return EXIT_CODE_FAILURE;
    }

    if interrupt::cancelled() {
        return EXIT_CODE_CANCEL;
    }
    if failed > 0 {
        eprintln!("some commands failed");
        return EXIT_CODE_FAILURE;
    }
    0
}
