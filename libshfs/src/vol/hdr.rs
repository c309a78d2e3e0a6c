/*
 * Created on Sat Jan 13 2024
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

//! # SHFSv1 on-disk headers
//!
//! Chunk 0 carries the boot area followed by the common header; it is
//! replicated byte-identically (except for the per-member UUID field) on
//! every member, at byte offset 0 of the raw device. Chunk 1 carries the
//! configuration header and is addressed through the stripe mapper like any
//! other chunk. All integers are little-endian; reserved bytes are written
//! as zero and ignored on read.

use {
    crate::{
        error::FormatError,
        util::{pack_str_field, unpack_str_field},
        vol::alloc::AllocPolicy,
    },
    std::ops::Range,
    uuid::Uuid,
};

/// Chunk address within the logical volume
pub type Chk = u64;

pub const SHFS_MAGIC: [u8; 4] = *b"SHFS";
pub const SHFS_MAJOR: u8 = 1;
pub const SHFS_MINOR: u8 = 0;

/// Reserved space at the head of chunk 0, before the common header
pub const BOOT_AREA_LENGTH: usize = 1024;
/// The label is always read and written as the first 4 KiB of each member
pub const FIRST_CHUNK_LEN: usize = 4096;

pub const SHFS_MAX_NB_MEMBERS: usize = 32;
/// Upper bound on devices accepted on the command line for a single volume
pub const MAX_NB_TRY_BLKDEVS: usize = 32;

pub const SHFS_MIN_STRIPESIZE: u32 = 4096;
pub const SHFS_MIN_BLKSIZE: u32 = 512;

pub const VOL_NAME_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StripeMode {
    /// every stripe is mirrored onto each member; `chunksize == stripesize`
    Combined = 0,
    /// stripes round-robin across members; `chunksize == stripesize × nb_members`
    Independent = 1,
}

impl StripeMode {
    pub const fn dscr(self) -> u8 {
        self as u8
    }
    pub fn try_from_raw(raw: u8) -> Result<Self, FormatError> {
        match raw {
            0 => Ok(Self::Combined),
            1 => Ok(Self::Independent),
            _ => Err(FormatError::UnsupportedStripeMode),
        }
    }
    /// Chunk size for this mode given the stripe size and member count
    pub const fn chunksize(self, stripesize: u32, nb_members: usize) -> u64 {
        match self {
            Self::Combined => stripesize as u64,
            Self::Independent => stripesize as u64 * nb_members as u64,
        }
    }
}

/// Verify the label magic and version of a freshly read chunk 0
pub fn detect_hdr0(chk0: &[u8]) -> Result<(), FormatError> {
    debug_assert!(chk0.len() >= FIRST_CHUNK_LEN);
    let hdr = &chk0[BOOT_AREA_LENGTH..];
    if hdr[HdrCommon::SEG_MAGIC] != SHFS_MAGIC {
        return Err(FormatError::BadMagic);
    }
    let okay_version = okay!(
        hdr[HdrCommon::SEG_VERSION_MAJOR] == SHFS_MAJOR,
        hdr[HdrCommon::SEG_VERSION_MINOR] == SHFS_MINOR,
    );
    if okay_version {
        Ok(())
    } else {
        Err(FormatError::UnsupportedVersion)
    }
}

/*
    common header (chunk 0)
    ---
    - 1: Magic block (8B): magic (4B) + version (2B) + padding (2B)
    - 2: Volume block (56B):
        - volume UUID (16B)
        - volume name (16B, null-padded)
        - stripesize (4B)
        - stripemode (1B) + padding (3B)
        - vol_size (8B)
        - member_count (1B) + padding (7B)
    - 3: Member table (512B): 32 slots x member UUID (16B), canonical order
    - 4: This member's UUID (16B)
*/

#[derive(Debug, Clone, PartialEq)]
pub struct HdrCommon {
    pub vol_uuid: Uuid,
    pub vol_name: String,
    pub stripesize: u32,
    pub stripemode: StripeMode,
    pub vol_size: Chk,
    /// member UUIDs in canonical order; fixes the stripe-to-member mapping
    pub member: Vec<Uuid>,
    /// the UUID of the member this copy of the label was read from
    pub member_uuid: Uuid,
}

impl HdrCommon {
    const SEG_MAGIC: Range<usize> = 0..4;
    const SEG_VERSION_MAJOR: usize = 4;
    const SEG_VERSION_MINOR: usize = 5;
    const SEG_VOL_UUID: Range<usize> = 8..24;
    const SEG_VOL_NAME: Range<usize> = 24..40;
    const SEG_STRIPESIZE: Range<usize> = 40..44;
    const SEG_STRIPEMODE: usize = 44;
    const SEG_VOL_SIZE: Range<usize> = 48..56;
    const SEG_MEMBER_COUNT: usize = 56;
    const SEG_MEMBER_TABLE: Range<usize> = 64..576;
    const SEG_MEMBER_UUID: Range<usize> = 576..592;
    pub const SIZE: usize = 592;

    /// Decode the common header out of a full chunk 0 read
    pub fn decode_chunk0(chk0: &[u8]) -> Result<Self, FormatError> {
        detect_hdr0(chk0)?;
        Self::decode(&chk0[BOOT_AREA_LENGTH..])
    }
    /// Decode the header block itself (magic and version must have been
    /// verified by [`detect_hdr0`]; this re-checks them anyway)
    pub fn decode(block: &[u8]) -> Result<Self, FormatError> {
        if block.len() < Self::SIZE || block[Self::SEG_MAGIC] != SHFS_MAGIC {
            return Err(FormatError::BadMagic);
        }
        let okay_version = okay!(
            block[Self::SEG_VERSION_MAJOR] == SHFS_MAJOR,
            block[Self::SEG_VERSION_MINOR] == SHFS_MINOR,
        );
        if !okay_version {
            return Err(FormatError::UnsupportedVersion);
        }
        let stripemode = StripeMode::try_from_raw(block[Self::SEG_STRIPEMODE])?;
        let member_count = block[Self::SEG_MEMBER_COUNT] as usize;
        if member_count == 0 || member_count > SHFS_MAX_NB_MEMBERS {
            return Err(FormatError::MissingMember);
        }
        let table = &block[Self::SEG_MEMBER_TABLE];
        let member = (0..member_count)
            .map(|i| uuid_from_field(&table[i * 16..(i + 1) * 16]))
            .collect();
        Ok(Self {
            vol_uuid: uuid_from_field(&block[Self::SEG_VOL_UUID]),
            vol_name: unpack_str_field(&block[Self::SEG_VOL_NAME]),
            stripesize: int_le!(u32, block, Self::SEG_STRIPESIZE),
            stripemode,
            vol_size: int_le!(u64, block, Self::SEG_VOL_SIZE),
            member,
            member_uuid: uuid_from_field(&block[Self::SEG_MEMBER_UUID]),
        })
    }
    /// Encode into a header block of at least [`Self::SIZE`] bytes
    pub fn encode(&self, block: &mut [u8]) {
        debug_assert!(self.member.len() <= SHFS_MAX_NB_MEMBERS);
        block[..Self::SIZE].fill(0);
        block[Self::SEG_MAGIC].copy_from_slice(&SHFS_MAGIC);
        block[Self::SEG_VERSION_MAJOR] = SHFS_MAJOR;
        block[Self::SEG_VERSION_MINOR] = SHFS_MINOR;
        block[Self::SEG_VOL_UUID].copy_from_slice(self.vol_uuid.as_bytes());
        pack_str_field(&self.vol_name, &mut block[Self::SEG_VOL_NAME]);
        block[Self::SEG_STRIPESIZE].copy_from_slice(&self.stripesize.to_le_bytes());
        block[Self::SEG_STRIPEMODE] = self.stripemode.dscr();
        block[Self::SEG_VOL_SIZE].copy_from_slice(&self.vol_size.to_le_bytes());
        block[Self::SEG_MEMBER_COUNT] = self.member.len() as u8;
        let table = &mut block[Self::SEG_MEMBER_TABLE];
        for (i, m) in self.member.iter().enumerate() {
            table[i * 16..(i + 1) * 16].copy_from_slice(m.as_bytes());
        }
        block[Self::SEG_MEMBER_UUID].copy_from_slice(self.member_uuid.as_bytes());
    }
    /// Chunk size of the volume this header describes
    pub fn chunksize(&self) -> u64 {
        self.stripemode
            .chunksize(self.stripesize, self.member.len())
    }
}

/*
    config header (chunk 1)
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdrConfig {
    pub htable_ref: Chk,
    /// 0 means no backup hash-table region
    pub htable_bak_ref: Chk,
    pub htable_bucket_count: u32,
    pub htable_entries_per_bucket: u32,
    pub hlen: u8,
    pub allocator: AllocPolicy,
    /// reserved for preencoded content support
    pub encoding: u8,
}

impl HdrConfig {
    const SEG_HTABLE_REF: Range<usize> = 0..8;
    const SEG_HTABLE_BAK_REF: Range<usize> = 8..16;
    const SEG_BUCKET_COUNT: Range<usize> = 16..20;
    const SEG_ENTRIES_PER_BUCKET: Range<usize> = 20..24;
    const SEG_HLEN: usize = 24;
    const SEG_ALLOCATOR: usize = 25;
    const SEG_ENCODING: usize = 26;
    pub const SIZE: usize = 32;

    pub fn decode(block: &[u8]) -> Result<Self, FormatError> {
        if block.len() < Self::SIZE {
            return Err(FormatError::BadConfig);
        }
        let hlen = block[Self::SEG_HLEN];
        let allocator = AllocPolicy::try_from_raw(block[Self::SEG_ALLOCATOR])
            .ok_or(FormatError::BadConfig)?;
        let hdr = Self {
            htable_ref: int_le!(u64, block, Self::SEG_HTABLE_REF),
            htable_bak_ref: int_le!(u64, block, Self::SEG_HTABLE_BAK_REF),
            htable_bucket_count: int_le!(u32, block, Self::SEG_BUCKET_COUNT),
            htable_entries_per_bucket: int_le!(u32, block, Self::SEG_ENTRIES_PER_BUCKET),
            hlen,
            allocator,
            encoding: block[Self::SEG_ENCODING],
        };
        let okay_cfg = okay!(
            hdr.htable_ref >= 2,
            hdr.htable_bucket_count != 0,
            hdr.htable_entries_per_bucket != 0,
            hdr.hlen >= 1,
            hdr.hlen as usize <= crate::digest::HASH_MAX_LEN,
        );
        if okay_cfg {
            Ok(hdr)
        } else {
            Err(FormatError::BadConfig)
        }
    }
    pub fn encode(&self, block: &mut [u8]) {
        block[..Self::SIZE].fill(0);
        block[Self::SEG_HTABLE_REF].copy_from_slice(&self.htable_ref.to_le_bytes());
        block[Self::SEG_HTABLE_BAK_REF].copy_from_slice(&self.htable_bak_ref.to_le_bytes());
        block[Self::SEG_BUCKET_COUNT].copy_from_slice(&self.htable_bucket_count.to_le_bytes());
        block[Self::SEG_ENTRIES_PER_BUCKET]
            .copy_from_slice(&self.htable_entries_per_bucket.to_le_bytes());
        block[Self::SEG_HLEN] = self.hlen;
        block[Self::SEG_ALLOCATOR] = self.allocator.dscr();
        block[Self::SEG_ENCODING] = self.encoding;
    }
    /// Total number of hash-table entries the volume indexes
    pub fn htable_nb_entries(&self) -> u64 {
        self.htable_bucket_count as u64 * self.htable_entries_per_bucket as u64
    }
    /// Length of one hash-table region in chunks
    pub fn htable_len(&self, chunksize: u64) -> Chk {
        let per_chunk = crate::vol::hentry::hentries_per_chunk(chunksize);
        crate::util::div_round_up(self.htable_nb_entries(), per_chunk)
    }
}

fn uuid_from_field(field: &[u8]) -> Uuid {
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&field[..16]);
    Uuid::from_bytes(raw)
}

#[cfg(test)]
mod tests {
    use {
        super::{
            detect_hdr0, HdrCommon, HdrConfig, StripeMode, BOOT_AREA_LENGTH, FIRST_CHUNK_LEN,
            SHFS_MAGIC,
        },
        crate::{error::FormatError, vol::alloc::AllocPolicy},
        uuid::Uuid,
    };

    fn sample_common() -> HdrCommon {
        HdrCommon {
            vol_uuid: Uuid::new_v4(),
            vol_name: "testvol".to_owned(),
            stripesize: 4096,
            stripemode: StripeMode::Independent,
            vol_size: 1023,
            member: vec![Uuid::new_v4(), Uuid::new_v4()],
            member_uuid: Uuid::new_v4(),
        }
    }

    #[test]
    fn common_header_roundtrip() {
        let hdr = sample_common();
        let mut chk0 = vec![0u8; FIRST_CHUNK_LEN];
        hdr.encode(&mut chk0[BOOT_AREA_LENGTH..]);
        assert_eq!(detect_hdr0(&chk0), Ok(()));
        let decoded = HdrCommon::decode_chunk0(&chk0).unwrap();
        assert_eq!(decoded, hdr);
        assert_eq!(decoded.chunksize(), 8192);
    }

    #[test]
    fn detect_rejects_bad_magic() {
        let chk0 = vec![0u8; FIRST_CHUNK_LEN];
        assert_eq!(detect_hdr0(&chk0), Err(FormatError::BadMagic));
    }

    #[test]
    fn detect_rejects_future_version() {
        let hdr = sample_common();
        let mut chk0 = vec![0u8; FIRST_CHUNK_LEN];
        hdr.encode(&mut chk0[BOOT_AREA_LENGTH..]);
        chk0[BOOT_AREA_LENGTH + 4] = 9;
        assert_eq!(detect_hdr0(&chk0), Err(FormatError::UnsupportedVersion));
        assert_eq!(&chk0[BOOT_AREA_LENGTH..BOOT_AREA_LENGTH + 4], &SHFS_MAGIC);
    }

    #[test]
    fn config_header_roundtrip() {
        let cfg = HdrConfig {
            htable_ref: 2,
            htable_bak_ref: 18,
            htable_bucket_count: 64,
            htable_entries_per_bucket: 4,
            hlen: 32,
            allocator: AllocPolicy::BestFit,
            encoding: 0,
        };
        let mut block = vec![0u8; 4096];
        cfg.encode(&mut block);
        assert_eq!(HdrConfig::decode(&block).unwrap(), cfg);
        // 64 * 4 = 256 entries, 16 entries per 4K chunk
        assert_eq!(cfg.htable_nb_entries(), 256);
        assert_eq!(cfg.htable_len(4096), 16);
    }

    #[test]
    fn config_rejects_garbage() {
        let mut block = vec![0u8; 4096];
        // htable_ref = 0, bucket_count = 0
        assert_eq!(HdrConfig::decode(&block), Err(FormatError::BadConfig));
        let cfg = HdrConfig {
            htable_ref: 2,
            htable_bak_ref: 0,
            htable_bucket_count: 64,
            htable_entries_per_bucket: 4,
            hlen: 32,
            allocator: AllocPolicy::FirstFit,
            encoding: 0,
        };
        cfg.encode(&mut block);
        block[25] = 0xaa; // unknown allocator tag
        assert_eq!(HdrConfig::decode(&block), Err(FormatError::BadConfig));
    }
}
