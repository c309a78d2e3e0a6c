/*
 * Created on Fri Jul 12 2024
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

//! # shfs-mkfs
//!
//! Initializes an SHFS volume on one or more member devices: fresh label on
//! every member, configuration header and zeroed hash-table regions.

mod args;

use {
    crate::args::CliParseReturn,
    env_logger::Builder,
    libshfs::{util::terminal, vol::mkfs::format_volume, TOOLSET, VERSION},
    std::{
        env,
        io::{self, BufRead, Write},
        process,
    },
};

const EXIT_CODE_FAILURE: i32 = 0x01;

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

/// Make the user confirm before data on the devices is destroyed
fn confirm_erase(devices: &[String]) -> bool {
    let _ = terminal::erase_warning(devices);
    print!("Continue? [y/N] ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn run() -> i32 {
    let parsed = match args::parse_cli_args(env::args()) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Try `shfs-mkfs --help' for more information.");
            return EXIT_CODE_FAILURE;
        }
    };
    let args = match parsed {
        CliParseReturn::Help => {
            args::print_usage("shfs-mkfs");
            return 0;
        }
        CliParseReturn::Version => {
            println!("{}: MakeFS v{}", TOOLSET, VERSION);
            return 0;
        }
        CliParseReturn::Run(args) => args,
    };
    Builder::new()
        .parse_filters(&log_filter(args.verbosity))
        .init();

    if !args.force && !confirm_erase(&args.devices) {
        eprintln!("aborted");
        return EXIT_CODE_FAILURE;
    }

    let report = match format_volume(&args.devices, &args.setup) {
        Ok(report) => report,
        Err(e) => {
            log::error!("could not initialize volume: {e}");
            return EXIT_CODE_FAILURE;
        }
    };
    println!("Volume UUID:       {}", report.vol_uuid);
    println!(
        "Volume size:       {} chunks of {} bytes",
        report.vol_size + 1,
        report.chunksize
    );
    println!("Members:           {}", report.nb_members);
    println!(
        "Hash table:        chunk {} (+{} chunks)",
        report.htable_ref, report.htable_len
    );
    if report.htable_bak_ref != 0 {
        println!(
            "Backup hash table: chunk {} (+{} chunks)",
            report.htable_bak_ref, report.htable_len
        );
    }
    0
}
