/*
 * Created on Mon Feb 05 2024
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

//! The free-space allocator. Occupied chunk ranges are kept as a sorted,
//! non-overlapping, merged list; the allocator is never persisted and is
//! rebuilt from the hash-table contents on every mount. `find_free` never
//! returns a start below 2: chunk 0 is the label, chunk 1 the configuration
//! header, so a returned 0 unambiguously signals "no space".

use crate::{error::AllocError, vol::hdr::Chk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AllocPolicy {
    /// lowest adequate gap wins
    FirstFit = 0,
    /// smallest adequate gap wins
    BestFit = 1,
}

impl AllocPolicy {
    pub const fn dscr(self) -> u8 {
        self as u8
    }
    pub fn try_from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::FirstFit),
            1 => Some(Self::BestFit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ARange {
    start: Chk,
    len: Chk,
}

impl ARange {
    const fn end(&self) -> Chk {
        self.start + self.len
    }
}

/// First chunk `find_free` may ever hand out
const DATA_AREA_FIRST_CHUNK: Chk = 2;

#[derive(Debug)]
pub struct AllocList {
    /// total chunks in the volume (`volsize + 1`)
    nb_chunks: Chk,
    policy: AllocPolicy,
    ranges: Vec<ARange>,
}

impl AllocList {
    pub fn new(volsize: Chk, policy: AllocPolicy) -> Self {
        Self {
            nb_chunks: volsize + 1,
            policy,
            ranges: Vec::new(),
        }
    }
    pub fn policy(&self) -> AllocPolicy {
        self.policy
    }
    /// Sum of all registered range lengths
    pub fn occupied_chunks(&self) -> Chk {
        self.ranges.iter().map(|r| r.len).sum()
    }
    /// Mark `[start, start + len)` occupied, merging with adjacent occupied
    /// ranges. Zero-length registrations are a no-op
    pub fn register(&mut self, start: Chk, len: Chk) -> Result<(), AllocError> {
        if len == 0 {
            return Ok(());
        }
        if start + len > self.nb_chunks {
            return Err(AllocError::Overlap);
        }
        let end = start + len;
        let idx = self.ranges.partition_point(|r| r.start < start);
        if idx > 0 && self.ranges[idx - 1].end() > start {
            return Err(AllocError::Overlap);
        }
        if idx < self.ranges.len() && self.ranges[idx].start < end {
            return Err(AllocError::Overlap);
        }
        let merge_prev = idx > 0 && self.ranges[idx - 1].end() == start;
        let merge_next = idx < self.ranges.len() && self.ranges[idx].start == end;
        match (merge_prev, merge_next) {
            (true, true) => {
                self.ranges[idx - 1].len += len + self.ranges[idx].len;
                self.ranges.remove(idx);
            }
            (true, false) => self.ranges[idx - 1].len += len,
            (false, true) => {
                self.ranges[idx].start = start;
                self.ranges[idx].len += len;
            }
            (false, false) => self.ranges.insert(idx, ARange { start, len }),
        }
        Ok(())
    }
    /// Release `[start, start + len)`. The range must be fully occupied;
    /// splits the containing range when it releases a middle piece
    pub fn unregister(&mut self, start: Chk, len: Chk) -> Result<(), AllocError> {
        if len == 0 {
            return Ok(());
        }
        let end = start + len;
        let idx = self.ranges.partition_point(|r| r.end() <= start);
        if idx >= self.ranges.len() {
            return Err(AllocError::NotOccupied);
        }
        let r = self.ranges[idx];
        if r.start > start || r.end() < end {
            return Err(AllocError::NotOccupied);
        }
        let keep_left = start > r.start;
        let keep_right = end < r.end();
        match (keep_left, keep_right) {
            (false, false) => {
                self.ranges.remove(idx);
            }
            (true, false) => self.ranges[idx].len = start - r.start,
            (false, true) => {
                self.ranges[idx].start = end;
                self.ranges[idx].len = r.end() - end;
            }
            (true, true) => {
                self.ranges[idx].len = start - r.start;
                self.ranges.insert(
                    idx + 1,
                    ARange {
                        start: end,
                        len: r.end() - end,
                    },
                );
            }
        }
        Ok(())
    }
    /// Find a free gap of at least `len` chunks within the data area.
    /// Returns the gap start, or 0 if no adequate gap exists (or `len` is 0)
    pub fn find_free(&self, len: Chk) -> Chk {
        if len == 0 {
            return 0;
        }
        let mut best: Option<(Chk, Chk)> = None; // (start, gap_len)
        let mut cursor = DATA_AREA_FIRST_CHUNK;
        for r in &self.ranges {
            if r.start > cursor {
                let gap = r.start - cursor;
                if gap >= len {
                    match self.policy {
                        AllocPolicy::FirstFit => return cursor,
                        AllocPolicy::BestFit => {
                            if best.map_or(true, |(_, blen)| gap < blen) {
                                best = Some((cursor, gap));
                            }
                        }
                    }
                }
            }
            if r.end() > cursor {
                cursor = r.end();
            }
        }
        if self.nb_chunks > cursor {
            let gap = self.nb_chunks - cursor;
            if gap >= len {
                match self.policy {
                    AllocPolicy::FirstFit => return cursor,
                    AllocPolicy::BestFit => {
                        if best.map_or(true, |(_, blen)| gap < blen) {
                            best = Some((cursor, gap));
                        }
                    }
                }
            }
        }
        best.map_or(0, |(start, _)| start)
    }
}

#[cfg(test)]
mod tests {
    use super::{AllocList, AllocPolicy};
    use crate::error::AllocError;

    fn labeled(volsize: u64, policy: AllocPolicy) -> AllocList {
        let mut al = AllocList::new(volsize, policy);
        al.register(0, 2).unwrap();
        al
    }

    #[test]
    fn register_merges_adjacent() {
        let mut al = labeled(63, AllocPolicy::FirstFit);
        al.register(2, 4).unwrap();
        al.register(6, 2).unwrap();
        // [0, 8) is now one range, so the first free chunk is 8
        assert_eq!(al.find_free(1), 8);
        assert_eq!(al.occupied_chunks(), 8);
    }

    #[test]
    fn register_rejects_overlap() {
        let mut al = labeled(63, AllocPolicy::FirstFit);
        al.register(4, 4).unwrap();
        assert_eq!(al.register(6, 4), Err(AllocError::Overlap));
        assert_eq!(al.register(2, 3), Err(AllocError::Overlap));
        assert_eq!(al.register(60, 10), Err(AllocError::Overlap));
        assert_eq!(al.occupied_chunks(), 6);
    }

    #[test]
    fn unregister_splits_middle() {
        let mut al = labeled(63, AllocPolicy::FirstFit);
        al.register(2, 10).unwrap();
        al.unregister(5, 2).unwrap();
        // the hole at [5, 7) is now the first fit for <= 2 chunks
        assert_eq!(al.find_free(2), 5);
        assert_eq!(al.find_free(3), 12);
        assert_eq!(al.occupied_chunks(), 10);
    }

    #[test]
    fn unregister_rejects_free_range() {
        let mut al = labeled(63, AllocPolicy::FirstFit);
        al.register(4, 2).unwrap();
        assert_eq!(al.unregister(8, 1), Err(AllocError::NotOccupied));
        assert_eq!(al.unregister(4, 4), Err(AllocError::NotOccupied));
        al.unregister(4, 2).unwrap();
        assert_eq!(al.unregister(4, 2), Err(AllocError::NotOccupied));
    }

    #[test]
    fn find_free_never_returns_label_area() {
        let al = AllocList::new(63, AllocPolicy::FirstFit);
        // nothing registered at all, yet chunks 0 and 1 are off limits
        assert_eq!(al.find_free(1), 2);
        assert_eq!(al.find_free(62), 2);
        assert_eq!(al.find_free(63), 0);
    }

    #[test]
    fn find_free_zero_len_is_failure() {
        let al = labeled(63, AllocPolicy::FirstFit);
        assert_eq!(al.find_free(0), 0);
    }

    #[test]
    fn best_fit_prefers_smallest_gap() {
        let mut al = labeled(63, AllocPolicy::BestFit);
        // occupied: [0,2) [10,20) [24,30) -> gaps [2,10)=8, [20,24)=4, [30,64)=34
        al.register(10, 10).unwrap();
        al.register(24, 6).unwrap();
        assert_eq!(al.find_free(3), 20);
        assert_eq!(al.find_free(5), 2);
        assert_eq!(al.find_free(20), 30);
        assert_eq!(al.find_free(40), 0);
    }

    #[test]
    fn first_fit_prefers_lowest_gap() {
        let mut al = labeled(63, AllocPolicy::FirstFit);
        al.register(10, 10).unwrap();
        al.register(24, 6).unwrap();
        assert_eq!(al.find_free(3), 2);
        assert_eq!(al.find_free(30), 30);
    }

    #[test]
    fn free_then_reuse() {
        let mut al = labeled(63, AllocPolicy::FirstFit);
        al.register(2, 1).unwrap();
        assert_eq!(al.find_free(1), 3);
        al.unregister(2, 1).unwrap();
        assert_eq!(al.find_free(1), 2);
    }
}
