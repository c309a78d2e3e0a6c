/*
 * Created on Sat Apr 20 2024
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

//! Volume initialization. Sizes the volume to the smallest supplied member,
//! lays out the reserved area (label, configuration chunk, primary and
//! optional backup hash-table regions) and writes a fresh label onto every
//! member. The data area is left untouched unless a full erase is requested.

use {
    crate::{
        digest::HASH_MAX_LEN,
        error::{CapacityError, ShfsError, ShfsResult},
        util::div_round_up,
        vol::{
            alloc::AllocPolicy,
            disk::Disk,
            hdr::{
                Chk, HdrCommon, HdrConfig, StripeMode, BOOT_AREA_LENGTH, FIRST_CHUNK_LEN,
                MAX_NB_TRY_BLKDEVS, SHFS_MIN_BLKSIZE, SHFS_MIN_STRIPESIZE, VOL_NAME_LEN,
            },
            hentry::hentries_per_chunk,
            stripe::Striping,
        },
    },
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct MkfsSetup {
    pub volname: String,
    pub stripesize: u32,
    pub stripemode: StripeMode,
    pub allocator: AllocPolicy,
    pub hlen: u8,
    pub bucket_count: u32,
    pub entries_per_bucket: u32,
    pub encoding: u8,
    /// lay out a backup hash-table region right after the primary one
    pub backup: bool,
    /// zero the whole volume instead of only the reserved area
    pub fullerase: bool,
}

impl Default for MkfsSetup {
    fn default() -> Self {
        Self {
            volname: "untitled".to_owned(),
            stripesize: 4096,
            stripemode: StripeMode::Combined,
            allocator: AllocPolicy::BestFit,
            hlen: 32,
            bucket_count: 4096,
            entries_per_bucket: 16,
            encoding: 0,
            backup: true,
            fullerase: false,
        }
    }
}

/// What `format_volume` ended up writing, for the frontend to report
#[derive(Debug)]
pub struct MkfsReport {
    pub vol_uuid: Uuid,
    pub vol_size: Chk,
    pub chunksize: u64,
    pub htable_ref: Chk,
    pub htable_bak_ref: Chk,
    pub htable_len: Chk,
    pub nb_members: usize,
}

fn validate(paths: &[String], setup: &MkfsSetup) -> ShfsResult<()> {
    if paths.is_empty() {
        return Err(ShfsError::inval("no devices passed"));
    }
    if paths.len() > MAX_NB_TRY_BLKDEVS {
        return Err(ShfsError::inval(
            "more devices passed than supported by a single SHFS volume",
        ));
    }
    if setup.volname.is_empty() || setup.volname.len() > VOL_NAME_LEN {
        return Err(ShfsError::inval(format!(
            "volume name must be 1..={} bytes",
            VOL_NAME_LEN
        )));
    }
    if setup.stripesize < SHFS_MIN_STRIPESIZE || !setup.stripesize.is_power_of_two() {
        return Err(ShfsError::inval("stripe size must be a power of two >= 4096"));
    }
    if setup.hlen < 1 || setup.hlen as usize > HASH_MAX_LEN {
        return Err(ShfsError::inval("hash digest length must be in 1..=64"));
    }
    if setup.bucket_count == 0 || setup.entries_per_bucket == 0 {
        return Err(ShfsError::inval(
            "bucket count and entries per bucket must be nonzero",
        ));
    }
    Ok(())
}

/// Initialize an SHFS volume across the given member devices
pub fn format_volume(paths: &[String], setup: &MkfsSetup) -> ShfsResult<MkfsReport> {
    validate(paths, setup)?;
    let mut members = Vec::with_capacity(paths.len());
    for path in paths {
        let d = Disk::open(path)?;
        if d.blksize() < SHFS_MIN_BLKSIZE || !d.blksize().is_power_of_two() {
            log::error!("{} has an incompatible block size", path);
            return Err(crate::error::FormatError::BadBlockSize.into());
        }
        members.push(d);
    }
    let nb_members = members.len();
    let stripesize = setup.stripesize as u64;

    // both modes store one stripe row per chunk on every member, so the
    // smallest member bounds the chunk count
    let min_size = members.iter().map(Disk::size).min().unwrap_or(0);
    let nb_chunks = min_size / stripesize;
    let chunksize = setup.stripemode.chunksize(setup.stripesize, nb_members);
    let per_chunk = hentries_per_chunk(chunksize);
    let nb_entries = setup.bucket_count as u64 * setup.entries_per_bucket as u64;
    let htable_len = div_round_up(nb_entries, per_chunk);
    // the hash-table regions go to the tail of the volume so the data area
    // starts right after the label
    let region_chunks = htable_len * if setup.backup { 2 } else { 1 };
    let meta_chunks = 2 + region_chunks;
    if nb_chunks <= meta_chunks {
        log::error!("devices are too small for the requested hash table");
        return Err(CapacityError::MemberTooSmall.into());
    }
    let htable_ref: Chk = nb_chunks - region_chunks;
    let htable_bak_ref: Chk = if setup.backup { htable_ref + htable_len } else { 0 };
    let vol_size = nb_chunks - 1;

    let vol_uuid = Uuid::new_v4();
    let member_uuids: Vec<Uuid> = (0..nb_members).map(|_| Uuid::new_v4()).collect();
    let striping = Striping::new(setup.stripesize, setup.stripemode, nb_chunks, members);

    // wipe: everything on a full erase, otherwise just the reserved area
    let zero_chunk = vec![0u8; chunksize as usize];
    if setup.fullerase {
        log::info!("erasing volume ({} chunks)...", nb_chunks);
        for c in 0..nb_chunks {
            striping.write_chunks(c, 1, &zero_chunk)?;
        }
    } else {
        for c in htable_ref..htable_ref + region_chunks {
            striping.write_chunks(c, 1, &zero_chunk)?;
        }
    }

    // configuration chunk
    let cfg = HdrConfig {
        htable_ref,
        htable_bak_ref,
        htable_bucket_count: setup.bucket_count,
        htable_entries_per_bucket: setup.entries_per_bucket,
        hlen: setup.hlen,
        allocator: setup.allocator,
        encoding: setup.encoding,
    };
    let mut chk1 = vec![0u8; chunksize as usize];
    cfg.encode(&mut chk1);
    striping.write_chunks(1, 1, &chk1)?;

    // label, replicated per member with its own member UUID
    for (i, member_uuid) in member_uuids.iter().enumerate() {
        let hdr = HdrCommon {
            vol_uuid,
            vol_name: setup.volname.clone(),
            stripesize: setup.stripesize,
            stripemode: setup.stripemode,
            vol_size,
            member: member_uuids.clone(),
            member_uuid: *member_uuid,
        };
        let mut chk0 = vec![0u8; FIRST_CHUNK_LEN];
        hdr.encode(&mut chk0[BOOT_AREA_LENGTH..]);
        let d = striping.member(i);
        d.write_at(0, &chk0)
            .map_err(|e| ShfsError::io_extra(e, format!("writing label to {}", d.path())))?;
    }
    log::info!(
        "volume '{}' initialized: {} chunks of {} bytes, hash table of {} chunks{}",
        setup.volname,
        nb_chunks,
        chunksize,
        htable_len,
        if setup.backup { " (backed up)" } else { "" }
    );
    Ok(MkfsReport {
        vol_uuid,
        vol_size,
        chunksize,
        htable_ref,
        htable_bak_ref,
        htable_len,
        nb_members,
    })
}
