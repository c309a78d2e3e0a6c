/*
 * Created on Sun Jan 14 2024
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

//! The on-disk hash-table entry (hentry). Entries are packed row-major into
//! the hash-table region: entry `i` sits in chunk `htable_ref + i /
//! entries_per_chunk` at byte offset `(i % entries_per_chunk) × 256`. The
//! bucket of entry `i` is `i / entries_per_bucket`, its slot `i %
//! entries_per_bucket`. An entry is empty iff its digest is all-zero.

use {
    crate::{
        digest::{hash_is_zero, Hash, HASH_MAX_LEN},
        util::{div_round_up, pack_str_field, unpack_str_field},
        vol::hdr::Chk,
    },
    std::ops::Range,
};

pub const SHFS_HENTRY_SIZE: usize = 256;

pub const HENTRY_FLAG_DEFAULT: u8 = 1 << 0;
pub const HENTRY_FLAG_HIDDEN: u8 = 1 << 1;

pub const HENTRY_ENCODING_LEN: usize = 15;
pub const HENTRY_MIME_LEN: usize = 32;
pub const HENTRY_NAME_LEN: usize = 64;

/// Number of whole hash-table entries per chunk; entries never straddle a
/// chunk boundary
pub const fn hentries_per_chunk(chunksize: u64) -> u64 {
    chunksize / SHFS_HENTRY_SIZE as u64
}

/// Hash-table chunk (relative to `htable_ref`) containing entry `i`
pub const fn hentry_chunk_no(i: u64, per_chunk: u64) -> Chk {
    i / per_chunk
}

/// Byte offset of entry `i` within its hash-table chunk
pub const fn hentry_chunk_offset(i: u64, per_chunk: u64) -> usize {
    ((i % per_chunk) as usize) * SHFS_HENTRY_SIZE
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hentry {
    pub hash: Hash,
    /// first chunk of the object's container
    pub chunk: Chk,
    /// byte offset of the payload within the first chunk
    pub offset: u64,
    /// payload length in bytes
    pub len: u64,
    /// seconds since the Unix epoch
    pub ts_creation: u64,
    pub flags: u8,
    pub encoding: String,
    pub mime: String,
    pub name: String,
}

impl Hentry {
    const SEG_HASH: Range<usize> = 0..64;
    const SEG_CHUNK: Range<usize> = 64..72;
    const SEG_OFFSET: Range<usize> = 72..80;
    const SEG_LEN: Range<usize> = 80..88;
    const SEG_TS_CREATION: Range<usize> = 88..96;
    const SEG_FLAGS: usize = 96;
    const SEG_ENCODING: Range<usize> = 97..112;
    const SEG_MIME: Range<usize> = 112..144;
    const SEG_NAME: Range<usize> = 144..208;
    pub const SIZE: usize = SHFS_HENTRY_SIZE;

    pub fn decode(block: &[u8]) -> Self {
        debug_assert!(block.len() >= Self::SIZE);
        let mut hash: Hash = [0; HASH_MAX_LEN];
        hash.copy_from_slice(&block[Self::SEG_HASH]);
        Self {
            hash,
            chunk: int_le!(u64, block, Self::SEG_CHUNK),
            offset: int_le!(u64, block, Self::SEG_OFFSET),
            len: int_le!(u64, block, Self::SEG_LEN),
            ts_creation: int_le!(u64, block, Self::SEG_TS_CREATION),
            flags: block[Self::SEG_FLAGS],
            encoding: unpack_str_field(&block[Self::SEG_ENCODING]),
            mime: unpack_str_field(&block[Self::SEG_MIME]),
            name: unpack_str_field(&block[Self::SEG_NAME]),
        }
    }
    pub fn encode(&self, block: &mut [u8]) {
        block[..Self::SIZE].fill(0);
        block[Self::SEG_HASH].copy_from_slice(&self.hash);
        block[Self::SEG_CHUNK].copy_from_slice(&self.chunk.to_le_bytes());
        block[Self::SEG_OFFSET].copy_from_slice(&self.offset.to_le_bytes());
        block[Self::SEG_LEN].copy_from_slice(&self.len.to_le_bytes());
        block[Self::SEG_TS_CREATION].copy_from_slice(&self.ts_creation.to_le_bytes());
        block[Self::SEG_FLAGS] = self.flags;
        pack_str_field(&self.encoding, &mut block[Self::SEG_ENCODING]);
        pack_str_field(&self.mime, &mut block[Self::SEG_MIME]);
        pack_str_field(&self.name, &mut block[Self::SEG_NAME]);
    }
    pub fn is_empty(&self) -> bool {
        hash_is_zero(&self.hash)
    }
    pub fn is_default(&self) -> bool {
        self.flags & HENTRY_FLAG_DEFAULT != 0
    }
    pub fn is_hidden(&self) -> bool {
        self.flags & HENTRY_FLAG_HIDDEN != 0
    }
    /// Chunks the payload occupies, starting at `self.chunk`
    pub fn footprint(&self, chunksize: u64) -> Chk {
        div_round_up(self.offset + self.len, chunksize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Hentry {
        let mut hash = [0u8; HASH_MAX_LEN];
        hash[..4].copy_from_slice(&[0xb9, 0x4d, 0x27, 0xb9]);
        Hentry {
            hash,
            chunk: 2,
            offset: 0,
            len: 11,
            ts_creation: 1_700_000_000,
            flags: HENTRY_FLAG_DEFAULT,
            encoding: String::new(),
            mime: "text/plain".to_owned(),
            name: "hi".to_owned(),
        }
    }

    #[test]
    fn codec_roundtrip() {
        let e = sample();
        let mut block = [0u8; SHFS_HENTRY_SIZE];
        e.encode(&mut block);
        assert_eq!(Hentry::decode(&block), e);
    }

    #[test]
    fn names_truncate_to_field_size() {
        let mut e = sample();
        e.name = "n".repeat(2 * HENTRY_NAME_LEN);
        e.mime = "m".repeat(2 * HENTRY_MIME_LEN);
        let mut block = [0u8; SHFS_HENTRY_SIZE];
        e.encode(&mut block);
        let d = Hentry::decode(&block);
        assert_eq!(d.name, "n".repeat(HENTRY_NAME_LEN));
        assert_eq!(d.mime, "m".repeat(HENTRY_MIME_LEN));
    }

    #[test]
    fn zeroed_block_is_empty() {
        let block = [0u8; SHFS_HENTRY_SIZE];
        let e = Hentry::decode(&block);
        assert!(e.is_empty());
        assert!(!e.is_default());
    }

    #[test]
    fn footprint_rounds_up() {
        let mut e = sample();
        e.len = 11;
        assert_eq!(e.footprint(4096), 1);
        e.len = 4097;
        assert_eq!(e.footprint(4096), 2);
        e.len = 0;
        assert_eq!(e.footprint(4096), 0);
        e.offset = 4000;
        e.len = 200;
        assert_eq!(e.footprint(4096), 2);
    }

    #[test]
    fn slot_addressing() {
        // 4K chunks hold 16 entries
        assert_eq!(hentries_per_chunk(4096), 16);
        assert_eq!(hentry_chunk_no(0, 16), 0);
        assert_eq!(hentry_chunk_no(16, 16), 1);
        assert_eq!(hentry_chunk_offset(17, 16), SHFS_HENTRY_SIZE);
    }
}
