/*
 * Created on Mon Jan 08 2024
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

//! # libshfs
//!
//! The administration core for SHFS volumes. This crate holds everything the
//! tool frontends share: the on-disk protocols (volume label, configuration
//! header, hash-table entries), the striped chunk I/O layer, the in-memory
//! bucket table and free-space allocator, the hash-table chunk cache and the
//! mount/unmount orchestration. The frontends (`shfs-admin`, `shfs-mkfs`)
//! only add argument handling and the per-token action drivers on top.

#[macro_use]
mod macros;
pub mod digest;
pub mod error;
pub mod util;
pub mod vol;

pub use error::{ShfsError, ShfsResult};

/// Result of raw device and file I/O
pub type IoResult<T> = Result<T, std::io::Error>;

/// Version of the tool suite (shared by all frontends)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the tool suite, used by the `--version` outputs
pub const TOOLSET: &str = "Simon's HashFS Tools";
