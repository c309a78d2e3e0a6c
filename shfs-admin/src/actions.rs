/*
 * Created on Tue Jun 11 2024
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

//! # Object actions
//!
//! The per-token operations on a mounted volume. Hash-table mutations stay
//! in the chunk cache until unmount; only object payloads are written
//! immediately. Every action reports its failure to the driver and leaves
//! the volume consistent: a failed or cancelled `add` releases its container
//! reservation and rolls back any entry it had already installed.

use {
    crate::{args::Action, interrupt},
    chrono::{Local, TimeZone},
    libshfs::{
        digest::{ObjectDigest, HASH_MAX_LEN},
        error::{CapacityError, ShfsError, ShfsResult},
        util::{basename, div_round_up, hash_parse, hash_unparse, os::get_epoch_time_secs},
        vol::{
            hdr::{Chk, HdrCommon, HdrConfig, StripeMode, FIRST_CHUNK_LEN},
            hentry::{Hentry, HENTRY_FLAG_DEFAULT},
            Volume,
        },
    },
    std::{
        fs::File,
        io::{self, Read, Seek, SeekFrom, Write},
    },
};

/// Execute one token against the mounted volume
pub fn run(vol: &mut Volume, token: &Action) -> ShfsResult<()> {
    match token {
        Action::AddObj { path, mime, name } => {
            add_obj(vol, path, mime.as_deref(), name.as_deref())
        }
        Action::RmObj { hash } => rm_obj(vol, hash),
        Action::CatObj { hash } => cat_obj(vol, hash, &mut io::stdout().lock()),
        Action::SetDefault { hash } => set_default(vol, hash),
        Action::ClearDefault => clear_default(vol),
        Action::Ls => ls(vol, &mut io::stdout().lock()),
        Action::Info => info(vol, &mut io::stdout().lock()),
    }
}

/*
    add-obj
*/

pub fn add_obj(
    vol: &mut Volume,
    path: &str,
    mime: Option<&str>,
    name: Option<&str>,
) -> ShfsResult<()> {
    log::debug!("opening {}...", path);
    let mut fd =
        File::open(path).map_err(|e| ShfsError::io_extra(e, format!("opening {}", path)))?;
    let md = fd
        .metadata()
        .map_err(|e| ShfsError::io_extra(e, format!("retrieving stats of {}", path)))?;
    if !md.is_file() {
        return Err(ShfsError::inval(format!("{} is not a regular file", path)));
    }
    let fsize = md.len();
    let csize = div_round_up(fsize, vol.chunksize());

    // reserve a container; empty objects occupy no chunks at all
    let cchk: Chk = if csize > 0 {
        log::debug!(
            "searching for an appropriate container to store file contents ({} chunks)...",
            csize
        );
        let cchk = vol.find_free(csize);
        if cchk == 0 || cchk >= vol.volsize() {
            log::error!("could not find appropriate volume area to store {}", path);
            return Err(CapacityError::VolumeFull.into());
        }
        log::debug!("reserving container at chunk {}...", cchk);
        vol.register(cchk, csize)
            .expect("free range conflicts with a registered range");
        cchk
    } else {
        0
    };

    match add_obj_reserved(vol, &mut fd, fsize, cchk, path, mime, name) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::debug!("discarding container reservation...");
            if csize > 0 {
                let _ = vol.unregister(cchk, csize);
            }
            Err(e)
        }
    }
}

/// The part of `add-obj` that runs with the container reserved; any error
/// return makes the caller release the reservation
fn add_obj_reserved(
    vol: &mut Volume,
    fd: &mut File,
    fsize: u64,
    cchk: Chk,
    path: &str,
    mime: Option<&str>,
    name: Option<&str>,
) -> ShfsResult<()> {
    let chunksize = vol.chunksize() as usize;
    let mut tmp_chk = vec![0u8; chunksize];

    // first pass: hash the content chunk by chunk
    log::debug!("calculating hash of file contents...");
    let mut td = ObjectDigest::new(vol.hlen());
    let mut left = fsize;
    while left > 0 {
        let rlen = left.min(chunksize as u64) as usize;
        fd.read_exact(&mut tmp_chk[..rlen])
            .map_err(|e| ShfsError::io_extra(e, format!("reading from {}", path)))?;
        if interrupt::cancelled() {
            return Err(ShfsError::Cancelled);
        }
        td.update(&tmp_chk[..rlen]);
        left -= rlen as u64;
    }
    let fhash = td.finish();
    log::debug!("hash of {} is: {}", path, hash_unparse(&fhash, vol.hlen()));

    // install the entry; it stays in the chunk cache until unmount
    log::debug!("trying to add a hash table entry...");
    if vol.lookup(&fhash).is_some() {
        return Err(ShfsError::DuplicateObject);
    }
    let slot = vol.add_entry(fhash).ok_or(CapacityError::BucketFull)?;
    let hentry = Hentry {
        hash: fhash,
        chunk: cchk,
        offset: 0,
        len: fsize,
        ts_creation: get_epoch_time_secs(),
        flags: 0,
        encoding: String::new(),
        mime: mime.unwrap_or("").to_owned(),
        name: name.map(str::to_owned).unwrap_or_else(|| basename(path)),
    };
    vol.update_hentry(slot, &hentry);

    // second pass: copy the content; the tail chunk is zero-padded
    log::debug!("copying file contents...");
    match copy_into_container(vol, fd, fsize, cchk, path, &mut tmp_chk) {
        Ok(()) => Ok(()),
        Err(e) => {
            // roll the entry back so the hash table never points at a
            // released container
            vol.rm_entry(&fhash);
            let mut cleared = hentry;
            cleared.hash = [0; HASH_MAX_LEN];
            vol.update_hentry(slot, &cleared);
            Err(e)
        }
    }
}

fn copy_into_container(
    vol: &Volume,
    fd: &mut File,
    fsize: u64,
    cchk: Chk,
    path: &str,
    tmp_chk: &mut [u8],
) -> ShfsResult<()> {
    fd.seek(SeekFrom::Start(0))
        .map_err(|e| ShfsError::io_extra(e, format!("seeking on {}", path)))?;
    let chunksize = tmp_chk.len() as u64;
    let mut left = fsize;
    let mut c: Chk = 0;
    while left > 0 {
        let rlen = if left >= chunksize {
            chunksize as usize
        } else {
            tmp_chk.fill(0);
            left as usize
        };
        fd.read_exact(&mut tmp_chk[..rlen])
            .map_err(|e| ShfsError::io_extra(e, format!("reading from {}", path)))?;
        vol.write_chunks(cchk + c, 1, tmp_chk)?;
        if interrupt::cancelled() {
            return Err(ShfsError::Cancelled);
        }
        left -= rlen as u64;
        c += 1;
    }
    Ok(())
}

/*
    rm-obj
*/

pub fn rm_obj(vol: &mut Volume, hash_str: &str) -> ShfsResult<()> {
    log::debug!("finding hash table entry of object {}...", hash_str);
    let h = hash_parse(hash_str, vol.hlen())?;
    let slot = vol.lookup(&h).ok_or(ShfsError::NotFound)?;
    let mut hentry = vol.hentry(slot);

    log::debug!("releasing container...");
    vol.unregister(hentry.chunk, hentry.footprint(vol.chunksize()))?;

    log::debug!("clearing hash table entry...");
    vol.rm_entry(&h);
    hentry.hash = [0; HASH_MAX_LEN];
    vol.update_hentry(slot, &hentry);
    if vol.default_slot() == Some(slot) {
        vol.set_default_slot(None);
    }
    Ok(())
}

/*
    cat-obj
*/

pub fn cat_obj(vol: &Volume, hash_str: &str, out: &mut impl Write) -> ShfsResult<()> {
    log::debug!("finding hash table entry of object {}...", hash_str);
    let h = hash_parse(hash_str, vol.hlen())?;
    let slot = vol.lookup(&h).ok_or(ShfsError::NotFound)?;
    let hentry = vol.hentry(slot);

    let chunksize = vol.chunksize();
    let mut buf = vec![0u8; chunksize as usize];
    let mut c = hentry.chunk;
    let mut off = hentry.offset;
    let mut left = hentry.len;
    while left > 0 {
        vol.read_chunks(c, 1, &mut buf)?;
        let rlen = (chunksize - off).min(left);
        out.write_all(&buf[off as usize..(off + rlen) as usize])
            .map_err(|e| ShfsError::io_extra(e, "writing to output"))?;
        left -= rlen;
        c += 1;
        off = 0;
    }
    Ok(())
}

/*
    default object
*/

fn bentry_setflags(vol: &mut Volume, slot: usize, flags: u8) {
    let mut e = vol.hentry(slot);
    log::debug!(
        "set flags 0x{:02x} on object {}",
        flags,
        hash_unparse(&e.hash, vol.hlen())
    );
    e.flags |= flags;
    vol.update_hentry(slot, &e);
}

fn bentry_clearflags(vol: &mut Volume, slot: usize, flags: u8) {
    let mut e = vol.hentry(slot);
    log::debug!(
        "clear flags 0x{:02x} on object {}",
        flags,
        hash_unparse(&e.hash, vol.hlen())
    );
    e.flags &= !flags;
    vol.update_hentry(slot, &e);
}

pub fn clear_default(vol: &mut Volume) -> ShfsResult<()> {
    if let Some(slot) = vol.default_slot() {
        bentry_clearflags(vol, slot, HENTRY_FLAG_DEFAULT);
        vol.set_default_slot(None);
    }
    Ok(())
}

pub fn set_default(vol: &mut Volume, hash_str: &str) -> ShfsResult<()> {
    log::debug!("looking for hash table entry of object {}...", hash_str);
    let h = hash_parse(hash_str, vol.hlen())?;
    let slot = vol.lookup(&h).ok_or(ShfsError::NotFound)?;

    clear_default(vol)?;
    bentry_setflags(vol, slot, HENTRY_FLAG_DEFAULT);
    vol.set_default_slot(Some(slot));
    Ok(())
}

/*
    ls
*/

fn strftimestamp(ts: u64) -> String {
    match Local.timestamp_opt(ts as i64, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%b %d, %y %H:%M").to_string(),
        _ => String::from("-"),
    }
}

pub fn ls(vol: &Volume, out: &mut impl Write) -> ShfsResult<()> {
    let werr = |e| ShfsError::io_extra(e, "writing listing");
    let hash_w: usize = if vol.hlen() <= 32 { 64 } else { 128 };
    writeln!(
        out,
        "{:<hash_w$} {:>12} {:>12} {:>5} {:<24} {:<16} {}",
        "Hash",
        "At (chk)",
        "Size (chk)",
        "Flags",
        "MIME",
        "Added",
        "Name",
        hash_w = hash_w
    )
    .map_err(werr)?;
    for slot in vol.occupied_slots() {
        let e = vol.hentry(slot);
        let flags = [
            if e.is_default() { 'D' } else { '-' },
            '-', // reserved for future use
            '-', // reserved for future use
            if e.is_hidden() { 'H' } else { '-' },
        ]
        .iter()
        .collect::<String>();
        writeln!(
            out,
            "{:<hash_w$} {:>12} {:>12}  {} {:<24} {:<16} {}",
            hash_unparse(&e.hash, vol.hlen()),
            e.chunk,
            e.footprint(vol.chunksize()),
            flags,
            e.mime,
            strftimestamp(e.ts_creation),
            e.name,
            hash_w = hash_w
        )
        .map_err(werr)?;
    }
    Ok(())
}

/*
    info
*/

pub fn info(vol: &Volume, out: &mut impl Write) -> ShfsResult<()> {
    let werr = |e| ShfsError::io_extra(e, "writing volume information");

    // re-read both headers from the reference member rather than trusting
    // the mounted state
    let mut chk0 = vec![0u8; FIRST_CHUNK_LEN];
    vol.striping().read_label(0, &mut chk0)?;
    let hdr = HdrCommon::decode_chunk0(&chk0)?;
    log::debug!("loading SHFS configuration chunk");
    let mut chk1 = vec![0u8; vol.chunksize() as usize];
    vol.read_chunks(1, 1, &mut chk1)?;
    let cfg = HdrConfig::decode(&chk1)?;

    let chunksize = hdr.chunksize();
    let nb_chunks = hdr.vol_size + 1;
    let htable_len = cfg.htable_len(chunksize);
    let metadata_size = 2 + htable_len * if cfg.htable_bak_ref != 0 { 2 } else { 1 };

    writeln!(out, "SHFSv1 volume '{}'", hdr.vol_name).map_err(werr)?;
    writeln!(out, "Volume UUID:          {}", hdr.vol_uuid).map_err(werr)?;
    writeln!(
        out,
        "Volume size:          {} chunks of {} bytes",
        nb_chunks, chunksize
    )
    .map_err(werr)?;
    writeln!(
        out,
        "Striping:             {} x {} bytes, {}",
        hdr.member.len(),
        hdr.stripesize,
        match hdr.stripemode {
            StripeMode::Combined => "combined",
            StripeMode::Independent => "independent",
        }
    )
    .map_err(werr)?;
    for (i, m) in hdr.member.iter().enumerate() {
        writeln!(out, "  Member {:>2}:          {}", i, m).map_err(werr)?;
    }
    writeln!(
        out,
        "Hash table:           {} buckets x {} entries, hlen {} ({})",
        cfg.htable_bucket_count,
        cfg.htable_entries_per_bucket,
        cfg.hlen,
        if cfg.hlen <= 32 { "sha256" } else { "sha512" }
    )
    .map_err(werr)?;
    writeln!(
        out,
        "Hash table region:    chunk {} (+{} chunks)",
        cfg.htable_ref, htable_len
    )
    .map_err(werr)?;
    if cfg.htable_bak_ref != 0 {
        writeln!(
            out,
            "Backup region:        chunk {} (+{} chunks)",
            cfg.htable_bak_ref, htable_len
        )
        .map_err(werr)?;
    } else {
        writeln!(out, "Backup region:        none").map_err(werr)?;
    }
    writeln!(
        out,
        "Allocator:            {}",
        match cfg.allocator {
            libshfs::vol::alloc::AllocPolicy::FirstFit => "first-fit",
            libshfs::vol::alloc::AllocPolicy::BestFit => "best-fit",
        }
    )
    .map_err(werr)?;
    writeln!(out, "Metadata size:        {} chunks", metadata_size).map_err(werr)?;
    writeln!(
        out,
        "Available space:      {} chunks",
        nb_chunks - metadata_size
    )
    .map_err(werr)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::interrupt::CANCEL,
        libshfs::vol::mkfs::{format_volume, MkfsSetup},
        rand::RngCore,
        std::sync::{atomic::Ordering, Mutex},
    };

    // action tests share the process-wide cancel flag, so they run one at
    // a time
    static TLOCK: Mutex<()> = Mutex::new(());

    const HELLO_DIGEST: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn scratch_path(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("shfs-actn-{}-{}", std::process::id(), tag))
            .to_string_lossy()
            .into_owned()
    }

    fn write_file(tag: &str, content: &[u8]) -> String {
        let path = scratch_path(tag);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content).unwrap();
        path
    }

    fn small_setup() -> MkfsSetup {
        MkfsSetup {
            volname: "testvol".to_owned(),
            bucket_count: 8,
            entries_per_bucket: 2,
            ..MkfsSetup::default()
        }
    }

    fn mkvol(tag: &str, chunks: usize, setup: &MkfsSetup) -> (Volume, Vec<String>) {
        let path = write_file(tag, &vec![0u8; chunks * 4096]);
        let paths = vec![path];
        format_volume(&paths, setup).unwrap();
        (Volume::mount(&paths).unwrap(), paths)
    }

    fn cleanup(paths: &[String]) {
        for p in paths {
            let _ = std::fs::remove_file(p);
        }
    }

    fn ls_string(vol: &Volume) -> String {
        let mut out = Vec::new();
        ls(vol, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn fresh_volume_lists_header_only() {
        let _g = TLOCK.lock().unwrap();
        let (vol, paths) = mkvol("fresh-ls", 64, &small_setup());
        let listing = ls_string(&vol);
        assert_eq!(listing.lines().count(), 1);
        assert!(listing.starts_with("Hash"));
        vol.umount().unwrap();
        cleanup(&paths);
    }

    #[test]
    fn add_places_hello_world_at_chunk_two() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("add-hello", 64, &small_setup());
        let src = write_file("add-hello-src", b"hello world");
        let base = vol.occupied_chunks();
        add_obj(&mut vol, &src, Some("text/plain"), Some("hi")).unwrap();
        assert_eq!(vol.occupied_chunks(), base + 1);
        let listing = ls_string(&vol);
        assert_eq!(listing.lines().count(), 2);
        let row = listing.lines().nth(1).unwrap();
        assert!(row.starts_with(HELLO_DIGEST));
        assert!(row.contains("----"));
        assert!(row.contains("text/plain"));
        assert!(row.ends_with("hi"));
        let e = vol.hentry(vol.lookup(&hash_parse(HELLO_DIGEST, 32).unwrap()).unwrap());
        assert_eq!(e.chunk, 2);
        assert_eq!(e.len, 11);
        assert_eq!(e.footprint(vol.chunksize()), 1);
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }

    #[test]
    fn default_flag_set_and_clear() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("default", 64, &small_setup());
        let src = write_file("default-src", b"hello world");
        add_obj(&mut vol, &src, None, None).unwrap();
        set_default(&mut vol, HELLO_DIGEST).unwrap();
        assert!(ls_string(&vol).contains("D---"));
        assert!(vol.default_slot().is_some());
        clear_default(&mut vol).unwrap();
        assert!(!ls_string(&vol).contains("D---"));
        assert!(vol.default_slot().is_none());
        // clearing with no default is a no-op success
        clear_default(&mut vol).unwrap();
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }

    #[test]
    fn cat_reproduces_the_exact_bytes() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("cat", 64, &small_setup());
        let src = write_file("cat-src", b"hello world");
        add_obj(&mut vol, &src, None, None).unwrap();
        let mut out = Vec::new();
        cat_obj(&vol, HELLO_DIGEST, &mut out).unwrap();
        assert_eq!(out, b"hello world");
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }

    #[test]
    fn rm_frees_the_container_for_reuse() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("rm-reuse", 64, &small_setup());
        let src = write_file("rm-reuse-src", b"hello world");
        let base = vol.occupied_chunks();
        add_obj(&mut vol, &src, None, None).unwrap();
        rm_obj(&mut vol, HELLO_DIGEST).unwrap();
        assert_eq!(vol.occupied_chunks(), base);
        assert_eq!(ls_string(&vol).lines().count(), 1);
        // a two-chunk object lands on the freed range
        let big = write_file("rm-reuse-big", &vec![0x42u8; 4097]);
        add_obj(&mut vol, &big, None, None).unwrap();
        let slot = vol.occupied_slots()[0];
        let e = vol.hentry(slot);
        assert_eq!(e.chunk, 2);
        assert_eq!(e.footprint(vol.chunksize()), 2);
        assert_eq!(vol.occupied_chunks(), base + 2);
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src, big]);
    }

    #[test]
    fn add_rm_add_yields_the_same_digest() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("readd", 64, &small_setup());
        let src = write_file("readd-src", b"hello world");
        add_obj(&mut vol, &src, None, None).unwrap();
        rm_obj(&mut vol, HELLO_DIGEST).unwrap();
        add_obj(&mut vol, &src, None, None).unwrap();
        assert!(vol
            .lookup(&hash_parse(HELLO_DIGEST, 32).unwrap())
            .is_some());
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("dup", 64, &small_setup());
        let src = write_file("dup-src", b"hello world");
        add_obj(&mut vol, &src, None, None).unwrap();
        let base = vol.occupied_chunks();
        assert!(matches!(
            add_obj(&mut vol, &src, None, None),
            Err(ShfsError::DuplicateObject)
        ));
        assert_eq!(vol.occupied_chunks(), base);
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }

    #[test]
    fn zero_byte_object_roundtrip() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("zero", 64, &small_setup());
        let src = write_file("zero-src", b"");
        let base = vol.occupied_chunks();
        add_obj(&mut vol, &src, None, None).unwrap();
        assert_eq!(vol.occupied_chunks(), base);
        let slot = vol.occupied_slots()[0];
        let e = vol.hentry(slot);
        assert_eq!(e.len, 0);
        let mut out = Vec::new();
        cat_obj(&vol, &hash_unparse(&e.hash, 32), &mut out).unwrap();
        assert!(out.is_empty());
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }

    #[test]
    fn oversized_add_fails_without_leaking_reservations() {
        let _g = TLOCK.lock().unwrap();
        // 6 chunks total, 4 reserved -> data area of 2 chunks
        let (mut vol, paths) = mkvol("oversz", 6, &small_setup());
        let base = vol.occupied_chunks();
        let big = write_file("oversz-src", &vec![1u8; 3 * 4096]);
        assert!(matches!(
            add_obj(&mut vol, &big, None, None),
            Err(ShfsError::Capacity(CapacityError::VolumeFull))
        ));
        assert_eq!(vol.occupied_chunks(), base);
        assert!(vol.occupied_slots().is_empty());
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[big]);
    }

    #[test]
    fn saturated_bucket_rejects_and_rolls_back() {
        let _g = TLOCK.lock().unwrap();
        // a single one-entry bucket: the second object must collide
        let setup = MkfsSetup {
            bucket_count: 1,
            entries_per_bucket: 1,
            ..small_setup()
        };
        let (mut vol, paths) = mkvol("satur", 64, &setup);
        let a = write_file("satur-a", b"object a");
        let b = write_file("satur-b", b"object b");
        add_obj(&mut vol, &a, None, None).unwrap();
        let base = vol.occupied_chunks();
        assert!(matches!(
            add_obj(&mut vol, &b, None, None),
            Err(ShfsError::Capacity(CapacityError::BucketFull))
        ));
        assert_eq!(vol.occupied_chunks(), base);
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[a, b]);
    }

    #[test]
    fn malformed_digest_strings_are_invalid_arguments() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("badhash", 64, &small_setup());
        assert!(matches!(
            rm_obj(&mut vol, "b94d"),
            Err(ShfsError::InvalidArgument(_))
        ));
        assert!(matches!(
            rm_obj(&mut vol, &"zz".repeat(32)),
            Err(ShfsError::InvalidArgument(_))
        ));
        // well-formed but absent
        assert!(matches!(
            rm_obj(&mut vol, &"aa".repeat(32)),
            Err(ShfsError::NotFound)
        ));
        vol.umount().unwrap();
        cleanup(&paths);
    }

    #[test]
    fn cancel_mid_add_leaves_the_volume_unchanged() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("cancel", 64, &small_setup());
        let src = write_file("cancel-src", &vec![7u8; 2 * 4096]);
        let base = vol.occupied_chunks();
        CANCEL.store(true, Ordering::Relaxed);
        let res = add_obj(&mut vol, &src, None, None);
        CANCEL.store(false, Ordering::Relaxed);
        assert!(matches!(res, Err(ShfsError::Cancelled)));
        assert_eq!(vol.occupied_chunks(), base);
        assert!(vol.occupied_slots().is_empty());
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }

    #[test]
    fn random_content_roundtrip() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("rand", 64, &small_setup());
        let mut content = vec![0u8; 10_000];
        rand::thread_rng().fill_bytes(&mut content);
        let src = write_file("rand-src", &content);
        add_obj(&mut vol, &src, Some("application/octet-stream"), None).unwrap();
        let slot = vol.occupied_slots()[0];
        let digest = hash_unparse(&vol.hentry(slot).hash, 32);
        let mut out = Vec::new();
        cat_obj(&vol, &digest, &mut out).unwrap();
        assert_eq!(out, content);
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }

    #[test]
    fn remount_reconstructs_table_and_allocator() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("remount", 64, &small_setup());
        let a = write_file("remount-a", b"hello world");
        let b = write_file("remount-b", &vec![9u8; 5000]);
        add_obj(&mut vol, &a, Some("text/plain"), None).unwrap();
        add_obj(&mut vol, &b, None, Some("nine")).unwrap();
        set_default(&mut vol, HELLO_DIGEST).unwrap();
        let listing = ls_string(&vol);
        let occupied = vol.occupied_chunks();
        vol.umount().unwrap();

        let vol = Volume::mount(&paths).unwrap();
        assert_eq!(ls_string(&vol), listing);
        assert_eq!(vol.occupied_chunks(), occupied);
        let def = vol.default_slot().expect("default entry survives remount");
        assert_eq!(hash_unparse(&vol.hentry(def).hash, 32), HELLO_DIGEST);
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[a, b]);
    }

    #[test]
    fn backup_region_restores_a_wiped_primary() {
        let _g = TLOCK.lock().unwrap();
        let (mut vol, paths) = mkvol("bak", 64, &small_setup());
        let src = write_file("bak-src", b"hello world");
        add_obj(&mut vol, &src, None, None).unwrap();
        let htable_ref = vol.htable_ref() as usize;
        let htable_bak_ref = vol.htable_bak_ref() as usize;
        let htable_len = vol.htable_len() as usize;
        let cs = vol.chunksize() as usize;
        vol.umount().unwrap();

        // wipe the primary region, then copy the backup over it
        let mut raw = std::fs::read(&paths[0]).unwrap();
        raw[htable_ref * cs..(htable_ref + htable_len) * cs].fill(0);
        let bak: Vec<u8> =
            raw[htable_bak_ref * cs..(htable_bak_ref + htable_len) * cs].to_vec();
        raw[htable_ref * cs..(htable_ref + htable_len) * cs].copy_from_slice(&bak);
        std::fs::write(&paths[0], &raw).unwrap();

        let vol = Volume::mount(&paths).unwrap();
        assert!(vol
            .lookup(&hash_parse(HELLO_DIGEST, 32).unwrap())
            .is_some());
        let mut out = Vec::new();
        cat_obj(&vol, HELLO_DIGEST, &mut out).unwrap();
        assert_eq!(out, b"hello world");
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }

    #[test]
    fn info_reports_the_header_fields() {
        let _g = TLOCK.lock().unwrap();
        let (vol, paths) = mkvol("info", 64, &small_setup());
        let mut out = Vec::new();
        info(&vol, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("SHFSv1 volume 'testvol'"));
        assert!(text.contains("64 chunks of 4096 bytes"));
        assert!(text.contains("8 buckets x 2 entries, hlen 32 (sha256)"));
        assert!(text.contains("Hash table region:    chunk 62 (+1 chunks)"));
        assert!(text.contains("Backup region:        chunk 63"));
        assert!(text.contains("Allocator:            best-fit"));
        assert!(text.contains("Metadata size:        4 chunks"));
        assert!(text.contains("Available space:      60 chunks"));
        vol.umount().unwrap();
        cleanup(&paths);
    }

    #[test]
    fn spec_geometry_end_to_end() {
        let _g = TLOCK.lock().unwrap();
        // the reference geometry: 4K chunks, hlen 32, volsize 1023,
        // 64 buckets x 4 entries, single member, combined striping
        let setup = MkfsSetup {
            volname: "reference".to_owned(),
            bucket_count: 64,
            entries_per_bucket: 4,
            ..MkfsSetup::default()
        };
        let (mut vol, paths) = mkvol("specgeo", 1024, &setup);
        assert_eq!(vol.volsize(), 1023);
        let src = write_file("specgeo-src", b"hello world");
        add_obj(&mut vol, &src, Some("text/plain"), Some("hi")).unwrap();
        let slot = vol
            .lookup(&hash_parse(HELLO_DIGEST, 32).unwrap())
            .expect("sha-256 digest of the reference object");
        // the data area starts right after the label, at chunk 2
        let e = vol.hentry(slot);
        assert_eq!(e.chunk, 2);
        assert_eq!(vol.htable_ref(), 1024 - 32);
        vol.umount().unwrap();
        cleanup(&paths);
        cleanup(&[src]);
    }
}
