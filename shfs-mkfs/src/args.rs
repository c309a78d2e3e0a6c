/*
 * Created on Thu Jul 04 2024
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

//! Command-line parsing for `shfs-mkfs`.

use libshfs::{
    vol::{alloc::AllocPolicy, hdr::StripeMode, mkfs::MkfsSetup},
    ShfsError, ShfsResult,
};

#[derive(Debug)]
pub struct Args {
    pub setup: MkfsSetup,
    pub devices: Vec<String>,
    pub verbosity: u8,
    pub force: bool,
}

#[derive(Debug)]
pub enum CliParseReturn {
    Help,
    Version,
    Run(Args),
}

fn parse_num<T: std::str::FromStr>(value: &str, what: &str) -> ShfsResult<T> {
    value
        .parse::<T>()
        .map_err(|_| ShfsError::inval(format!("{} expects a number, got `{}`", what, value)))
}

/// Parse CLI args. Striping defaults to INDEPENDENT when more than one
/// device is supplied, COMBINED otherwise; `--combined-striping` forces
/// COMBINED
pub fn parse_cli_args<'a, T: 'a + AsRef<str>>(
    src: impl Iterator<Item = T>,
) -> ShfsResult<CliParseReturn> {
    let mut args_iter = src.into_iter().skip(1);
    let mut setup = MkfsSetup::default();
    let mut devices: Vec<String> = Vec::new();
    let mut verbosity: u8 = 0;
    let mut force = false;
    let mut combined = false;

    macro_rules! next_value {
        ($inline:expr, $opt:expr) => {
            match $inline {
                Some(v) => v,
                None => match args_iter.next() {
                    Some(v) => v.as_ref().to_string(),
                    None => {
                        return Err(ShfsError::inval(format!(
                            "missing value for option `{}`",
                            $opt
                        )))
                    }
                },
            }
        };
    }

    while let Some(arg) = args_iter.next() {
        let arg = arg.as_ref();
        if arg == "--help" || arg == "-h" || arg == "-?" {
            return Ok(CliParseReturn::Help);
        }
        if arg == "--version" || arg == "-V" {
            return Ok(CliParseReturn::Version);
        }
        if let Some(long) = arg.strip_prefix("--") {
            let (opt, inline) = match long.split_once('=') {
                Some((o, v)) => (o, Some(v.to_string())),
                None => (long, None),
            };
            match opt {
                "verbose" => verbosity = verbosity.saturating_add(1).min(2),
                "force" => force = true,
                "name" => setup.volname = next_value!(inline, arg),
                "stripesize" => {
                    setup.stripesize = parse_num(&next_value!(inline, arg), "--stripesize")?
                }
                "combined-striping" => combined = true,
                "bucket-count" => {
                    setup.bucket_count = parse_num(&next_value!(inline, arg), "--bucket-count")?
                }
                "entries-per-bucket" => {
                    setup.entries_per_bucket =
                        parse_num(&next_value!(inline, arg), "--entries-per-bucket")?
                }
                "hash-length" => {
                    setup.hlen = parse_num(&next_value!(inline, arg), "--hash-length")?
                }
                "first-fit" => setup.allocator = AllocPolicy::FirstFit,
                "no-backup" => setup.backup = false,
                "erase" => setup.fullerase = true,
                _ => return Err(ShfsError::inval(format!("unknown option `{}`", arg))),
            }
        } else if arg.len() > 1 && arg.starts_with('-') {
            let mut chars = arg[1..].chars();
            while let Some(flag) = chars.next() {
                match flag {
                    'v' => verbosity = verbosity.saturating_add(1).min(2),
                    'f' => force = true,
                    'c' => combined = true,
                    'F' => setup.allocator = AllocPolicy::FirstFit,
                    'B' => setup.backup = false,
                    'x' => setup.fullerase = true,
                    'n' | 's' | 'b' | 'e' | 'l' => {
                        let rest: String = chars.collect();
                        let inline = if rest.is_empty() { None } else { Some(rest) };
                        let value = next_value!(inline, format!("-{}", flag));
                        match flag {
                            'n' => setup.volname = value,
                            's' => setup.stripesize = parse_num(&value, "-s")?,
                            'b' => setup.bucket_count = parse_num(&value, "-b")?,
                            'e' => setup.entries_per_bucket = parse_num(&value, "-e")?,
                            _ => setup.hlen = parse_num(&value, "-l")?,
                        }
                        break;
                    }
                    _ => {
                        return Err(ShfsError::inval(format!("unknown option `-{}`", flag)));
                    }
                }
            }
        } else {
            devices.push(arg.to_string());
        }
    }
    if devices.is_empty() {
        return Err(ShfsError::inval(
            "path to volume member device(s) not specified",
        ));
    }
    setup.stripemode = if combined || devices.len() == 1 {
        StripeMode::Combined
    } else {
        StripeMode::Independent
    };
    Ok(CliParseReturn::Run(Args {
        setup,
        devices,
        verbosity,
        force,
    }))
}

pub fn print_usage(argv0: &str) {
    println!("Usage: {} [OPTION]... [DEVICE]...", argv0);
    println!("Initializes an SHFS volume.");
    println!();
    println!("  -h, --help                   displays this help and exit");
    println!("  -V, --version                displays program version and exit");
    println!("  -v, --verbose                increases verbosity level (max. 2 times)");
    println!("  -f, --force                  suppresses warnings and user questions");
    println!("  -n, --name [NAME]            sets the volume name (max. 16 bytes)");
    println!("  -s, --stripesize [BYTES]     stripe size, a power of two >= 4096 (default 4096)");
    println!("  -c, --combined-striping      forces combined striping (default for one member)");
    println!("  -b, --bucket-count [COUNT]   hash table buckets (default 4096)");
    println!("  -e, --entries-per-bucket [N] entries per bucket (default 16)");
    println!("  -l, --hash-length [BYTES]    hash digest length, 1..=64 (default 32)");
    println!("  -F, --first-fit              first-fit allocator (default best-fit)");
    println!("  -B, --no-backup              omits the backup hash table region");
    println!("  -x, --erase                  erases the whole volume before writing");
    println!();
    println!("Example:");
    println!(" {} -n vol -s 4096 /dev/ram15", argv0);
}

#[cfg(test)]
mod tests {
    use {
        super::{parse_cli_args, CliParseReturn},
        libshfs::vol::{alloc::AllocPolicy, hdr::StripeMode},
    };

    fn run_args(args: &[&str]) -> super::Args {
        match parse_cli_args(["shfs-mkfs"].iter().chain(args.iter())).unwrap() {
            CliParseReturn::Run(a) => a,
            ret => panic!("expected a run configuration, got {:?}", ret),
        }
    }

    #[test]
    fn defaults_and_overrides() {
        let args = run_args(&["-n", "vol", "-s", "8192", "-b", "32", "-e", "8", "-B", "dev"]);
        assert_eq!(args.setup.volname, "vol");
        assert_eq!(args.setup.stripesize, 8192);
        assert_eq!(args.setup.bucket_count, 32);
        assert_eq!(args.setup.entries_per_bucket, 8);
        assert!(!args.setup.backup);
        assert_eq!(args.setup.stripemode, StripeMode::Combined);
        assert_eq!(args.setup.allocator, AllocPolicy::BestFit);
    }

    #[test]
    fn striping_defaults_to_independent_for_multiple_members() {
        let args = run_args(&["dev0", "dev1"]);
        assert_eq!(args.setup.stripemode, StripeMode::Independent);
        let args = run_args(&["-c", "dev0", "dev1"]);
        assert_eq!(args.setup.stripemode, StripeMode::Combined);
    }

    #[test]
    fn rejects_non_numeric_values() {
        assert!(parse_cli_args(["x", "-s", "lots", "dev"].iter()).is_err());
        assert!(parse_cli_args(["x", "--bucket-count=many", "dev"].iter()).is_err());
    }

    #[test]
    fn first_fit_selection() {
        let args = run_args(&["-F", "dev"]);
        assert_eq!(args.setup.allocator, AllocPolicy::FirstFit);
    }
}
