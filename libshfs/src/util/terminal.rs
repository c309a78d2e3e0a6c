/*
 * Created on Thu Jan 11 2024
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

//! The data-loss announcements of the tool frontends. Ordinary diagnostics
//! go through the `log` facade and can be filtered away; the two messages
//! here must reach the operator even then, so they are written straight to
//! stderr, emphasized.

use {
    crate::IoResult,
    std::{fmt, io::Write},
    termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor},
};

fn emphasized(color: Color, text: &str) -> IoResult<()> {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    stderr.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    stderr.write_all(text.as_bytes())?;
    stderr.reset()?;
    stderr.flush()
}

/// Announce that flushing the hash table back to the volume failed: the
/// on-disk index can no longer be trusted
pub fn corruption_alert(volname: &str, cause: &impl fmt::Display) -> IoResult<()> {
    emphasized(
        Color::Red,
        &format!(
            "Could not write the hash table back to volume '{volname}': {cause}\n\
             The filesystem might be in a corrupted state right now\n"
        ),
    )
}

/// Warn that initialization is about to destroy whatever the member
/// devices currently hold
pub fn erase_warning(devices: &[String]) -> IoResult<()> {
    emphasized(
        Color::Yellow,
        &format!(
            "About to initialize an SHFS volume on: {}\n\
             All existing data on these devices will be lost.\n",
            devices.join(", ")
        ),
    )
}
