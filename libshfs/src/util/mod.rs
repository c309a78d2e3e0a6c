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

pub mod os;
pub mod terminal;

use {
    crate::{
        digest::{Hash, HASH_MAX_LEN},
        error::{ShfsError, ShfsResult},
    },
    std::path::Path,
};

#[inline(always)]
pub const fn div_round_up(n: u64, div: u64) -> u64 {
    (n + div - 1) / div
}

/// Render the first `hlen` bytes of a digest as lowercase hex
pub fn hash_unparse(h: &Hash, hlen: u8) -> String {
    hex::encode(&h[..hlen as usize])
}

/// Parse a hex digest string of exactly `hlen` bytes into a zero-padded
/// [`Hash`]. Wrong length and non-hex characters are invalid arguments
pub fn hash_parse(s: &str, hlen: u8) -> ShfsResult<Hash> {
    if s.len() != hlen as usize * 2 {
        return Err(ShfsError::inval(format!(
            "hash value must be {} hex characters",
            hlen as usize * 2
        )));
    }
    let raw = hex::decode(s)
        .map_err(|_| ShfsError::inval("hash value contains non-hex characters"))?;
    let mut h: Hash = [0; HASH_MAX_LEN];
    h[..raw.len()].copy_from_slice(&raw);
    Ok(h)
}

/// Copy a string into a fixed null-padded field, truncating at the field
/// size (and at the first interior NUL, which the format cannot carry)
pub fn pack_str_field(s: &str, field: &mut [u8]) {
    field.fill(0);
    let bytes = s.as_bytes();
    let upto = bytes
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(bytes.len())
        .min(field.len());
    field[..upto].copy_from_slice(&bytes[..upto]);
}

/// Decode a null-padded field back into a string, dropping the padding
pub fn unpack_str_field(field: &[u8]) -> String {
    let upto = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..upto]).into_owned()
}

/// Final component of a path, used as the fallback object name in `add-obj`
pub fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_owned())
}
