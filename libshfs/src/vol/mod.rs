/*
 * Created on Fri Apr 05 2024
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

//! # Volume assembly
//!
//! Mounting walks the classic sequence: open and label-check every supplied
//! device, adopt the first as the reference member, establish the canonical
//! member mapping from the label's member table, validate striping geometry
//! and member capacity, load the configuration chunk, then stream the hash
//! table into the bucket table while pinning its chunks, and finally rebuild
//! the allocator from the reserved regions and every container. Unmounting
//! writes every modified hash-table chunk back (primary region first, then
//! the backup) and releases everything.

pub mod alloc;
pub mod cache;
pub mod disk;
pub mod hdr;
pub mod hentry;
pub mod htable;
pub mod mkfs;
pub mod stripe;

use {
    crate::{
        digest::Hash,
        error::{AllocError, CapacityError, FormatError, ShfsError, ShfsResult},
        vol::{
            alloc::AllocList,
            cache::HtChunkCache,
            disk::Disk,
            hdr::{
                detect_hdr0, Chk, HdrCommon, HdrConfig, StripeMode, FIRST_CHUNK_LEN,
                MAX_NB_TRY_BLKDEVS, SHFS_MIN_BLKSIZE, SHFS_MIN_STRIPESIZE,
            },
            hentry::{hentries_per_chunk, hentry_chunk_no, hentry_chunk_offset, Hentry},
            htable::BucketTable,
            stripe::Striping,
        },
    },
    uuid::Uuid,
};

/// A mounted SHFS volume. One per process; actions borrow it for exactly as
/// long as they run
#[derive(Debug)]
pub struct Volume {
    vol_uuid: Uuid,
    volname: String,
    chunksize: u64,
    volsize: Chk,
    striping: Striping,
    htable_ref: Chk,
    htable_bak_ref: Chk,
    htable_nb_entries: u64,
    htable_nb_entries_per_chunk: u64,
    htable_len: Chk,
    hlen: u8,
    bt: BucketTable,
    cache: HtChunkCache,
    al: AllocList,
    def_bentry: Option<usize>,
}

/// Open one device and verify it carries a valid SHFS label
fn checkopen_disk(path: &str) -> ShfsResult<(Disk, HdrCommon)> {
    let d = Disk::open(path)?;
    if d.blksize() < SHFS_MIN_BLKSIZE || !d.blksize().is_power_of_two() {
        log::error!("{} has an incompatible block size", path);
        return Err(FormatError::BadBlockSize.into());
    }
    let mut chk0 = vec![0u8; FIRST_CHUNK_LEN];
    d.read_at(0, &mut chk0)
        .map_err(|e| ShfsError::io_extra(e, format!("reading from {}", path)))?;
    if let Err(e) = detect_hdr0(&chk0) {
        log::error!("invalid or unsupported SHFS label detected on {}", path);
        return Err(e.into());
    }
    let hdr = HdrCommon::decode_chunk0(&chk0)?;
    log::debug!("SHFSv1 label on {} detected", path);
    Ok((d, hdr))
}

impl Volume {
    /// Mount the volume found on the given member devices. The devices may
    /// be passed in any order; the label's member table fixes the mapping
    pub fn mount(paths: &[String]) -> ShfsResult<Self> {
        if paths.is_empty() {
            return Err(ShfsError::inval("no devices passed"));
        }
        if paths.len() > MAX_NB_TRY_BLKDEVS {
            return Err(ShfsError::inval(
                "more devices passed than supported by a single SHFS volume",
            ));
        }
        log::debug!("detecting SHFS volume...");
        let mut detected: Vec<Option<(Disk, HdrCommon)>> = Vec::with_capacity(paths.len());
        for path in paths {
            detected.push(Some(checkopen_disk(path)?));
        }

        // the first device that passed the label check becomes the
        // reference member for all volume-wide fields
        let ref_hdr = detected[0].as_ref().map(|(_, h)| h.clone()).unwrap();
        let volname = ref_hdr.vol_name.clone();
        if ref_hdr.stripesize < SHFS_MIN_STRIPESIZE || !ref_hdr.stripesize.is_power_of_two() {
            log::error!("stripe size invalid on volume '{}'", volname);
            return Err(FormatError::BadStripeSize.into());
        }

        // establish the canonical member mapping
        let mut seen: Vec<Uuid> = Vec::with_capacity(ref_hdr.member.len());
        let mut ordered: Vec<Disk> = Vec::with_capacity(ref_hdr.member.len());
        for wanted in &ref_hdr.member {
            if seen.contains(wanted) {
                log::error!(
                    "a member is specified multiple times for volume '{}'",
                    volname
                );
                return Err(FormatError::DuplicateMember.into());
            }
            seen.push(*wanted);
            let mut found: Option<usize> = None;
            for (i, slot) in detected.iter().enumerate() {
                match slot {
                    Some((_, h)) if h.member_uuid == *wanted => {
                        if found.is_some() {
                            log::error!(
                                "a member is specified multiple times for volume '{}'",
                                volname
                            );
                            return Err(FormatError::DuplicateMember.into());
                        }
                        found = Some(i);
                    }
                    _ => {}
                }
            }
            match found {
                Some(i) => ordered.push(detected[i].take().map(|(d, _)| d).unwrap()),
                None => {
                    log::error!("could not establish member mapping for volume '{}'", volname);
                    return Err(FormatError::MissingMember.into());
                }
            }
        }
        if detected.iter().any(|s| s.is_some()) {
            log::error!(
                "more members specified than actually required for volume '{}'",
                volname
            );
            return Err(FormatError::MissingMember.into());
        }

        // validate member capacity against the declared volume size
        let nb_members = ordered.len();
        let stripesize = ref_hdr.stripesize as u64;
        let min_member_size = match ref_hdr.stripemode {
            StripeMode::Combined => (ref_hdr.vol_size + 1) * stripesize,
            StripeMode::Independent => ((ref_hdr.vol_size + 1) / nb_members as u64) * stripesize,
        };
        for (i, d) in ordered.iter().enumerate() {
            if d.size() < min_member_size {
                log::error!("member {} of volume '{}' is too small", i, volname);
                return Err(CapacityError::MemberTooSmall.into());
            }
        }

        let volsize = ref_hdr.vol_size;
        let striping = Striping::new(
            ref_hdr.stripesize,
            ref_hdr.stripemode,
            volsize + 1,
            ordered,
        );
        let chunksize = striping.chunksize();

        // configuration chunk
        log::debug!("loading SHFS configuration chunk");
        let mut chk1 = vec![0u8; chunksize as usize];
        striping.read_chunks(1, 1, &mut chk1)?;
        let cfg = HdrConfig::decode(&chk1)?;
        let per_chunk = hentries_per_chunk(chunksize);
        let nb_entries = cfg.htable_nb_entries();
        let htable_len = cfg.htable_len(chunksize);
        let nb_chunks = volsize + 1;
        let okay_cfg = okay!(
            htable_len != 0,
            cfg.htable_ref + htable_len <= nb_chunks,
            cfg.htable_bak_ref == 0
                || (cfg.htable_bak_ref >= 2 && cfg.htable_bak_ref + htable_len <= nb_chunks),
        );
        if !okay_cfg {
            log::error!("malformed SHFS configuration on volume '{}'", volname);
            return Err(FormatError::BadConfig.into());
        }

        // stream the hash table into the bucket table, pinning each chunk
        // the first time a slot inside it is visited
        log::debug!("reading hash table...");
        let mut bt = BucketTable::new(
            cfg.htable_bucket_count,
            cfg.htable_entries_per_bucket,
            cfg.hlen,
        );
        let mut cache = HtChunkCache::new(htable_len);
        let mut def_bentry = None;
        for i in 0..nb_entries {
            let htchk = hentry_chunk_no(i, per_chunk);
            if !cache.is_pinned(htchk) {
                let mut buf = vec![0u8; chunksize as usize];
                striping.read_chunks(cfg.htable_ref + htchk, 1, &mut buf)?;
                cache.pin(htchk, buf);
            }
            let off = hentry_chunk_offset(i, per_chunk);
            let e = Hentry::decode(&cache.chunk(htchk)[off..off + Hentry::SIZE]);
            let bentry = bt.feed(i, e.hash);
            bentry.hentry_htchunk = htchk;
            bentry.hentry_htoffset = off;
            if !e.is_empty() && e.is_default() {
                def_bentry = Some(i as usize);
            }
        }

        // rebuild the allocator: label, hash-table regions, then containers
        log::debug!("initializing volume allocator...");
        let mut al = AllocList::new(volsize, cfg.allocator);
        let register = |al: &mut AllocList, start, len| -> ShfsResult<()> {
            al.register(start, len).map_err(|aerr| {
                log::error!(
                    "could not register an allocator entry for volume '{}': {}",
                    volname,
                    aerr
                );
                FormatError::BadConfig.into()
            })
        };
        register(&mut al, 0, 2)?;
        register(&mut al, cfg.htable_ref, htable_len)?;
        if cfg.htable_bak_ref != 0 {
            register(&mut al, cfg.htable_bak_ref, htable_len)?;
        }
        for slot in bt.iter_occupied() {
            let be = bt.entry(slot);
            let e = Hentry::decode(
                &cache.chunk(be.hentry_htchunk)
                    [be.hentry_htoffset..be.hentry_htoffset + Hentry::SIZE],
            );
            register(&mut al, e.chunk, e.footprint(chunksize))?;
        }

        Ok(Self {
            vol_uuid: ref_hdr.vol_uuid,
            volname,
            chunksize,
            volsize,
            striping,
            htable_ref: cfg.htable_ref,
            htable_bak_ref: cfg.htable_bak_ref,
            htable_nb_entries: nb_entries,
            htable_nb_entries_per_chunk: per_chunk,
            htable_len,
            hlen: cfg.hlen,
            bt,
            cache,
            al,
            def_bentry,
        })
    }

    /// Unmount: write every modified hash-table chunk back to the primary
    /// region, then to the backup region, and release the volume. A write
    /// failure here leaves the on-disk hash table in an undefined state
    pub fn umount(self) -> ShfsResult<()> {
        for (htchk, buf) in self.cache.iter_modified() {
            self.striping
                .write_chunks(self.htable_ref + htchk, 1, buf)?;
        }
        if self.htable_bak_ref != 0 {
            for (htchk, buf) in self.cache.iter_modified() {
                self.striping
                    .write_chunks(self.htable_bak_ref + htchk, 1, buf)?;
            }
        }
        Ok(())
    }
}

/*
    accessors and the action-facing surface
*/

impl Volume {
    pub fn vol_uuid(&self) -> Uuid {
        self.vol_uuid
    }
    pub fn volname(&self) -> &str {
        &self.volname
    }
    pub fn chunksize(&self) -> u64 {
        self.chunksize
    }
    pub fn volsize(&self) -> Chk {
        self.volsize
    }
    pub fn hlen(&self) -> u8 {
        self.hlen
    }
    pub fn htable_ref(&self) -> Chk {
        self.htable_ref
    }
    pub fn htable_bak_ref(&self) -> Chk {
        self.htable_bak_ref
    }
    pub fn htable_len(&self) -> Chk {
        self.htable_len
    }
    pub fn htable_nb_entries(&self) -> u64 {
        self.htable_nb_entries
    }
    pub fn htable_nb_entries_per_chunk(&self) -> u64 {
        self.htable_nb_entries_per_chunk
    }
    pub fn striping(&self) -> &Striping {
        &self.striping
    }
    pub fn default_slot(&self) -> Option<usize> {
        self.def_bentry
    }
    pub fn set_default_slot(&mut self, slot: Option<usize>) {
        self.def_bentry = slot;
    }
    pub fn lookup(&self, hash: &Hash) -> Option<usize> {
        self.bt.lookup(hash)
    }
    pub fn add_entry(&mut self, hash: Hash) -> Option<usize> {
        self.bt.add_entry(hash)
    }
    pub fn rm_entry(&mut self, hash: &Hash) -> Option<usize> {
        self.bt.rm_entry(hash)
    }
    /// Slots of all stored objects, in bucket-major order
    pub fn occupied_slots(&self) -> Vec<usize> {
        self.bt.iter_occupied().collect()
    }
    /// Decode the on-disk entry a bucket-table slot points at
    pub fn hentry(&self, slot: usize) -> Hentry {
        let be = self.bt.entry(slot);
        Hentry::decode(
            &self.cache.chunk(be.hentry_htchunk)
                [be.hentry_htoffset..be.hentry_htoffset + Hentry::SIZE],
        )
    }
    /// Write an entry back into its cached hash-table chunk and raise the
    /// chunk's dirty flag; the disk copy follows at unmount
    pub fn update_hentry(&mut self, slot: usize, e: &Hentry) {
        let be = self.bt.entry(slot);
        let (htchk, off) = (be.hentry_htchunk, be.hentry_htoffset);
        e.encode(&mut self.cache.chunk_mut(htchk)[off..off + Hentry::SIZE]);
    }
    pub fn find_free(&self, len: Chk) -> Chk {
        self.al.find_free(len)
    }
    pub fn register(&mut self, start: Chk, len: Chk) -> Result<(), AllocError> {
        self.al.register(start, len)
    }
    pub fn unregister(&mut self, start: Chk, len: Chk) -> Result<(), AllocError> {
        self.al.unregister(start, len)
    }
    pub fn occupied_chunks(&self) -> Chk {
        self.al.occupied_chunks()
    }
    pub fn read_chunks(&self, start: Chk, count: Chk, buf: &mut [u8]) -> ShfsResult<()> {
        self.striping.read_chunks(start, count, buf)
    }
    pub fn write_chunks(&self, start: Chk, count: Chk, buf: &[u8]) -> ShfsResult<()> {
        self.striping.write_chunks(start, count, buf)
    }
}
