/*
 * Created on Tue Feb 13 2024
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

//! The hash-table chunk cache. Every hash-table chunk visited during mount
//! stays pinned for the lifetime of the mount; the dirty flag is
//! chunk-granular, so any mutation of any entry in a chunk writes the whole
//! chunk back at unmount.

use crate::vol::hdr::Chk;

const CCS_MODIFIED: u8 = 1 << 0;

#[derive(Debug)]
struct CachedChunk {
    buf: Vec<u8>,
    state: u8,
}

#[derive(Debug)]
pub struct HtChunkCache {
    chunks: Vec<Option<CachedChunk>>,
}

impl HtChunkCache {
    pub fn new(htable_len: Chk) -> Self {
        let mut chunks = Vec::with_capacity(htable_len as usize);
        chunks.resize_with(htable_len as usize, || None);
        Self { chunks }
    }
    pub fn len(&self) -> Chk {
        self.chunks.len() as Chk
    }
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
    pub fn is_pinned(&self, htchunk: Chk) -> bool {
        self.chunks[htchunk as usize].is_some()
    }
    /// Pin a freshly read hash-table chunk. Mount pins each chunk exactly
    /// once, the first time a slot inside it is visited
    pub fn pin(&mut self, htchunk: Chk, buf: Vec<u8>) {
        let slot = &mut self.chunks[htchunk as usize];
        debug_assert!(slot.is_none());
        *slot = Some(CachedChunk {
            buf,
            state: 0,
        });
    }
    pub fn chunk(&self, htchunk: Chk) -> &[u8] {
        &self.chunks[htchunk as usize]
            .as_ref()
            .expect("hash-table chunk not pinned")
            .buf
    }
    /// Mutable view of a pinned chunk; raises the dirty flag
    pub fn chunk_mut(&mut self, htchunk: Chk) -> &mut [u8] {
        let cc = self.chunks[htchunk as usize]
            .as_mut()
            .expect("hash-table chunk not pinned");
        cc.state |= CCS_MODIFIED;
        &mut cc.buf
    }
    pub fn is_modified(&self, htchunk: Chk) -> bool {
        self.chunks[htchunk as usize]
            .as_ref()
            .map_or(false, |cc| cc.state & CCS_MODIFIED != 0)
    }
    /// Pinned chunks with the dirty flag raised, in region order
    pub fn iter_modified(&self) -> impl Iterator<Item = (Chk, &[u8])> {
        self.chunks.iter().enumerate().filter_map(|(i, cc)| {
            cc.as_ref()
                .filter(|cc| cc.state & CCS_MODIFIED != 0)
                .map(|cc| (i as Chk, cc.buf.as_slice()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::HtChunkCache;

    #[test]
    fn pin_and_read_back() {
        let mut cache = HtChunkCache::new(4);
        cache.pin(1, vec![0xaa; 64]);
        assert!(cache.is_pinned(1));
        assert!(!cache.is_pinned(0));
        assert_eq!(cache.chunk(1)[0], 0xaa);
        assert!(!cache.is_modified(1));
    }

    #[test]
    fn mutation_raises_dirty_flag() {
        let mut cache = HtChunkCache::new(2);
        cache.pin(0, vec![0; 64]);
        cache.pin(1, vec![0; 64]);
        cache.chunk_mut(1)[5] = 7;
        assert!(!cache.is_modified(0));
        assert!(cache.is_modified(1));
        let dirty: Vec<_> = cache.iter_modified().map(|(c, _)| c).collect();
        assert_eq!(dirty, vec![1]);
    }
}
