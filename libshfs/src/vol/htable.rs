/*
 * Created on Wed Mar 06 2024
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

//! # The bucket table
//!
//! The in-memory digest index. One bentry per on-disk hash-table slot, laid
//! out bucket-major in a flat array, so slot `i` belongs to bucket `i /
//! entries_per_bucket`. Every bentry keeps the location of its on-disk form
//! (hash-table chunk and byte offset inside it), attached once during the
//! mount-time feed; empty slots keep theirs too, since `add_entry` reuses
//! them. Single-threaded by design, like everything else in this core.

use crate::{
    digest::{hash_is_zero, Hash, HASH_MAX_LEN},
    vol::hdr::Chk,
};

/// Bucket of a digest: its first 8 bytes as a big-endian integer, reduced
/// modulo the bucket count. Digests shorter than 8 bytes are zero-padded,
/// which this formula sees as trailing zero bits. The placement is part of
/// the on-disk format; it must never drift between versions
pub fn bucket_index(h: &Hash, nb_buckets: u32) -> u64 {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&h[..8]);
    u64::from_be_bytes(prefix) % nb_buckets as u64
}

#[derive(Debug, Clone)]
pub struct Bentry {
    pub hash: Hash,
    /// hash-table chunk (relative to `htable_ref`) holding the on-disk entry
    pub hentry_htchunk: Chk,
    /// byte offset of the on-disk entry within that chunk
    pub hentry_htoffset: usize,
}

impl Bentry {
    fn empty() -> Self {
        Self {
            hash: [0; HASH_MAX_LEN],
            hentry_htchunk: 0,
            hentry_htoffset: 0,
        }
    }
    pub fn is_empty(&self) -> bool {
        hash_is_zero(&self.hash)
    }
}

#[derive(Debug)]
pub struct BucketTable {
    nb_buckets: u32,
    entries_per_bucket: u32,
    hlen: u8,
    entries: Vec<Bentry>,
}

impl BucketTable {
    pub fn new(nb_buckets: u32, entries_per_bucket: u32, hlen: u8) -> Self {
        let nb_entries = nb_buckets as usize * entries_per_bucket as usize;
        Self {
            nb_buckets,
            entries_per_bucket,
            hlen,
            entries: vec![Bentry::empty(); nb_entries],
        }
    }
    pub fn nb_entries(&self) -> u64 {
        self.entries.len() as u64
    }
    pub fn hlen(&self) -> u8 {
        self.hlen
    }
    pub fn entry(&self, slot: usize) -> &Bentry {
        &self.entries[slot]
    }
    /// Install the digest found in on-disk slot `slot` during mount. Called
    /// once per slot, in slot order; empty digests still claim the slot so
    /// the on-disk location can be attached to it
    pub fn feed(&mut self, slot: u64, hash: Hash) -> &mut Bentry {
        let bentry = &mut self.entries[slot as usize];
        bentry.hash = hash;
        bentry
    }
    /// Find the slot holding `hash`, probing its bucket linearly. A probe
    /// for the all-zero digest never matches: empty slots are not entries
    pub fn lookup(&self, hash: &Hash) -> Option<usize> {
        let base = bucket_index(hash, self.nb_buckets) as usize * self.entries_per_bucket as usize;
        (base..base + self.entries_per_bucket as usize)
            .find(|i| !self.entries[*i].is_empty() && self.entries[*i].hash == *hash)
    }
    /// Claim an empty slot in the bucket of `hash`. `None` when the bucket
    /// is saturated
    pub fn add_entry(&mut self, hash: Hash) -> Option<usize> {
        debug_assert!(self.lookup(&hash).is_none());
        let base = bucket_index(&hash, self.nb_buckets) as usize * self.entries_per_bucket as usize;
        let slot =
            (base..base + self.entries_per_bucket as usize).find(|i| self.entries[*i].is_empty())?;
        self.entries[slot].hash = hash;
        Some(slot)
    }
    /// Clear the slot holding `hash`
    pub fn rm_entry(&mut self, hash: &Hash) -> Option<usize> {
        let slot = self.lookup(hash)?;
        self.entries[slot].hash = [0; HASH_MAX_LEN];
        Some(slot)
    }
    /// Slots of all non-empty bentries, bucket index ascending, then slot
    /// index ascending
    pub fn iter_occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_empty())
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{bucket_index, BucketTable},
        crate::digest::{Hash, HASH_MAX_LEN},
    };

    fn hash_with_prefix(prefix: &[u8]) -> Hash {
        let mut h = [0u8; HASH_MAX_LEN];
        h[..prefix.len()].copy_from_slice(prefix);
        h
    }

    #[test]
    fn bucket_selection_reference_vectors() {
        // the first 8 bytes read big-endian, mod the bucket count
        let h = hash_with_prefix(&[0xb9, 0x4d, 0x27, 0xb9, 0x93, 0x4d, 0x3e, 0x08]);
        assert_eq!(bucket_index(&h, 64), 0x08 % 64);
        assert_eq!(bucket_index(&h, 7), 0xb94d_27b9_934d_3e08u64 % 7);
        let low = hash_with_prefix(&[0, 0, 0, 0, 0, 0, 0, 0x2a]);
        assert_eq!(bucket_index(&low, 64), 0x2a);
        // a short digest is zero-padded, so its prefix carries trailing zeros
        let short = hash_with_prefix(&[0x01, 0x02]);
        assert_eq!(bucket_index(&short, 1 << 16), 0);
    }

    #[test]
    fn feed_then_lookup() {
        let mut bt = BucketTable::new(4, 2, 8);
        let h = hash_with_prefix(&[0, 0, 0, 0, 0, 0, 0, 2, 0xff]);
        // bucket 2 -> slots 4 and 5; feed installs positionally
        let bentry = bt.feed(4, h);
        bentry.hentry_htchunk = 3;
        bentry.hentry_htoffset = 512;
        assert_eq!(bt.lookup(&h), Some(4));
        assert_eq!(bt.entry(4).hentry_htchunk, 3);
        assert_eq!(bt.entry(4).hentry_htoffset, 512);
    }

    #[test]
    fn add_fills_bucket_slots_then_saturates() {
        let mut bt = BucketTable::new(1, 2, 8);
        let h1 = hash_with_prefix(&[0, 0, 0, 0, 0, 0, 0, 1]);
        let h2 = hash_with_prefix(&[0, 0, 0, 0, 0, 0, 0, 2]);
        let h3 = hash_with_prefix(&[0, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(bt.add_entry(h1), Some(0));
        assert_eq!(bt.add_entry(h2), Some(1));
        assert_eq!(bt.add_entry(h3), None);
    }

    #[test]
    fn rm_clears_and_frees_the_slot() {
        let mut bt = BucketTable::new(1, 2, 8);
        let h1 = hash_with_prefix(&[1]);
        let h2 = hash_with_prefix(&[2]);
        bt.add_entry(h1).unwrap();
        bt.add_entry(h2).unwrap();
        assert_eq!(bt.rm_entry(&h1), Some(0));
        assert_eq!(bt.lookup(&h1), None);
        assert_eq!(bt.lookup(&h2), Some(1));
        // freed slot is reusable
        let h3 = hash_with_prefix(&[3]);
        assert_eq!(bt.add_entry(h3), Some(0));
    }

    #[test]
    fn iteration_is_bucket_major() {
        let mut bt = BucketTable::new(4, 2, 8);
        let in_b3 = hash_with_prefix(&[0, 0, 0, 0, 0, 0, 0, 3]);
        let in_b0 = hash_with_prefix(&[0, 0, 0, 0, 0, 0, 0, 4]);
        let in_b1 = hash_with_prefix(&[0, 0, 0, 0, 0, 0, 0, 1]);
        bt.add_entry(in_b3).unwrap();
        bt.add_entry(in_b0).unwrap();
        bt.add_entry(in_b1).unwrap();
        let order: Vec<usize> = bt.iter_occupied().collect();
        assert_eq!(order, vec![0, 2, 6]);
    }
}
