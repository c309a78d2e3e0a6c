/*
 * Created on Mon May 13 2024
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

//! Command-line parsing for `shfs-admin`. Arguments form an ordered list of
//! action tokens (`--add-obj`, `--rm-obj`, ...) executed in the order given;
//! `--mime` and `--name` attach to the `--add-obj` token they follow.
//! Everything that is not an option is a member device path. Supports
//! `--opt value`, `--opt=value`, grouped short flags (`-vv`, `-li`) and
//! short options with attached values (`-afile`).

use libshfs::{ShfsError, ShfsResult};

#[derive(Debug, PartialEq)]
pub enum Action {
    AddObj {
        path: String,
        mime: Option<String>,
        name: Option<String>,
    },
    RmObj { hash: String },
    CatObj { hash: String },
    SetDefault { hash: String },
    ClearDefault,
    Ls,
    Info,
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::AddObj { .. } => "add-obj",
            Self::RmObj { .. } => "rm-obj",
            Self::CatObj { .. } => "cat-obj",
            Self::SetDefault { .. } => "set-default",
            Self::ClearDefault => "clear-default",
            Self::Ls => "ls",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Args {
    pub tokens: Vec<Action>,
    pub devices: Vec<String>,
    pub verbosity: u8,
    pub force: bool,
}

#[derive(Debug, PartialEq)]
/// Return from parsing CLI configuration
pub enum CliParseReturn {
    /// Output help menu
    Help,
    /// Output version
    Version,
    /// We yielded a run configuration
    Run(Args),
}

const VERBOSITY_MAX: u8 = 2;

fn attach_obj_opt(
    tokens: &mut [Action],
    which: &str,
    value: String,
) -> ShfsResult<()> {
    match tokens.last_mut() {
        Some(Action::AddObj { mime, name, .. }) => {
            match which {
                "mime" => *mime = Some(value),
                _ => *name = Some(value),
            }
            Ok(())
        }
        _ => Err(ShfsError::inval(format!(
            "please set {} after an add-obj token",
            which
        ))),
    }
}

/// Parse CLI args:
/// - `--{option} {value}`
/// - `--{option}={value}`
/// - grouped short flags and short options with attached values
pub fn parse_cli_args<'a, T: 'a + AsRef<str>>(
    src: impl Iterator<Item = T>,
) -> ShfsResult<CliParseReturn> {
    let mut args_iter = src.into_iter().skip(1);
    let mut tokens: Vec<Action> = Vec::new();
    let mut devices: Vec<String> = Vec::new();
    let mut verbosity: u8 = 0;
    let mut force = false;

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
                "verbose" => verbosity = (verbosity + 1).min(VERBOSITY_MAX),
                "force" => force = true,
                "add-obj" => tokens.push(Action::AddObj {
                    path: next_value!(inline, arg),
                    mime: None,
                    name: None,
                }),
                "mime" => attach_obj_opt(&mut tokens, "mime", next_value!(inline, arg))?,
                "name" => attach_obj_opt(&mut tokens, "name", next_value!(inline, arg))?,
                "rm-obj" => tokens.push(Action::RmObj {
                    hash: next_value!(inline, arg),
                }),
                "cat-obj" => tokens.push(Action::CatObj {
                    hash: next_value!(inline, arg),
                }),
                "set-default" => tokens.push(Action::SetDefault {
                    hash: next_value!(inline, arg),
                }),
                "clear-default" => tokens.push(Action::ClearDefault),
                "ls" => tokens.push(Action::Ls),
                "info" => tokens.push(Action::Info),
                _ => {
                    return Err(ShfsError::inval(format!("unknown option `{}`", arg)));
                }
            }
        } else if arg.len() > 1 && arg.starts_with('-') {
            let mut chars = arg[1..].chars();
            while let Some(flag) = chars.next() {
                match flag {
                    'v' => verbosity = (verbosity + 1).min(VERBOSITY_MAX),
                    'f' => force = true,
                    'C' => tokens.push(Action::ClearDefault),
                    'l' => tokens.push(Action::Ls),
                    'i' => tokens.push(Action::Info),
                    'a' | 'r' | 'c' | 'd' | 'm' | 'n' => {
                        let rest: String = chars.collect();
                        let inline = if rest.is_empty() { None } else { Some(rest) };
                        let value = next_value!(inline, format!("-{}", flag));
                        match flag {
                            'a' => tokens.push(Action::AddObj {
                                path: value,
                                mime: None,
                                name: None,
                            }),
                            'r' => tokens.push(Action::RmObj { hash: value }),
                            'c' => tokens.push(Action::CatObj { hash: value }),
                            'd' => tokens.push(Action::SetDefault { hash: value }),
                            'm' => attach_obj_opt(&mut tokens, "mime", value)?,
                            _ => attach_obj_opt(&mut tokens, "name", value)?,
                        }
                        break;
                    }
                    _ => {
                        return Err(ShfsError::inval(format!(
                            "unknown option `-{}`",
                            flag
                        )));
                    }
                }
            }
        } else {
            // everything else is a member device path
            devices.push(arg.to_string());
        }
    }
    if devices.is_empty() {
        return Err(ShfsError::inval(
            "path to volume member device(s) not specified",
        ));
    }
    Ok(CliParseReturn::Run(Args {
        tokens,
        devices,
        verbosity,
        force,
    }))
}

pub fn print_usage(argv0: &str) {
    println!("Usage: {} [OPTION]... [DEVICE]...", argv0);
    println!("Administration of an SHFS volume.");
    println!();
    println!("Mandatory arguments to long options are mandatory for short options too.");
    println!("  -h, --help                   displays this help and exit");
    println!("  -V, --version                displays program version and exit");
    println!(
        "  -v, --verbose                increases verbosity level (max. {} times)",
        VERBOSITY_MAX
    );
    println!("  -f, --force                  suppresses warnings and user questions");
    println!("  -a, --add-obj [FILE]         adds FILE as object to the volume");
    println!("  For each add-obj token:");
    println!("    -m, --mime [MIME]          sets the MIME type for the object");
    println!("    -n, --name [NAME]          sets an additional name for the object");
    println!("  -r, --rm-obj [HASH]          removes an object from the volume");
    println!("  -c, --cat-obj [HASH]         exports an object to stdout");
    println!("  -d, --set-default [HASH]     sets the object with HASH as default");
    println!("  -C, --clear-default          clears reference to default object");
    println!("  -l, --ls                     lists the volume contents");
    println!("  -i, --info                   shows volume information");
    println!();
    println!("Example (adding a file):");
    println!(
        " {} --add-obj song.mp3 -m audio/mpeg3 /dev/ram15",
        argv0
    );
}
