/*
 * Created on Thu Mar 14 2024
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

//! The stripe mapper and chunk I/O layer. A logical chunk is made of
//! stripe-sized slices: in COMBINED mode the single slice is mirrored onto
//! every member (reads are served from the first member), in INDEPENDENT
//! mode slice `s` of chunk `c` lives on member `(c·n + s) mod n` at stripe
//! row `(c·n + s) / n` of that member, which works out to row `c` for every
//! member. Callers only ever see whole chunks; ordering between the
//! per-stripe transfers is unobservable.

use crate::{
    error::{FormatError, ShfsError, ShfsResult},
    vol::{
        disk::Disk,
        hdr::{Chk, StripeMode},
    },
};

#[derive(Debug)]
pub struct Striping {
    stripesize: u32,
    mode: StripeMode,
    /// total chunks in the volume (`vol_size + 1`)
    nb_chunks: Chk,
    /// members in canonical label order
    members: Vec<Disk>,
}

impl Striping {
    pub fn new(stripesize: u32, mode: StripeMode, nb_chunks: Chk, members: Vec<Disk>) -> Self {
        debug_assert!(!members.is_empty());
        Self {
            stripesize,
            mode,
            nb_chunks,
            members,
        }
    }
    pub fn stripesize(&self) -> u32 {
        self.stripesize
    }
    pub fn mode(&self) -> StripeMode {
        self.mode
    }
    pub fn nb_members(&self) -> usize {
        self.members.len()
    }
    pub fn nb_chunks(&self) -> Chk {
        self.nb_chunks
    }
    pub fn chunksize(&self) -> u64 {
        self.mode.chunksize(self.stripesize, self.members.len())
    }
    pub fn member(&self, idx: usize) -> &Disk {
        &self.members[idx]
    }
    fn check_range(&self, start: Chk, count: Chk, buf_len: usize) -> Result<(), FormatError> {
        if start + count > self.nb_chunks {
            return Err(FormatError::OutOfRange);
        }
        debug_assert!(buf_len as u64 >= count * self.chunksize());
        Ok(())
    }
    /// Read `count` chunks starting at `start` into `buf`
    pub fn read_chunks(&self, start: Chk, count: Chk, buf: &mut [u8]) -> ShfsResult<()> {
        self.check_range(start, count, buf.len())?;
        let ss = self.stripesize as u64;
        let cs = self.chunksize() as usize;
        for c in 0..count {
            let chunk = start + c;
            let chunk_buf = &mut buf[c as usize * cs..(c as usize + 1) * cs];
            match self.mode {
                StripeMode::Combined => {
                    let d = &self.members[0];
                    d.read_at(chunk * ss, chunk_buf)
                        .map_err(|e| ShfsError::io_extra(e, format!("reading from {}", d.path())))?;
                }
                StripeMode::Independent => {
                    for (s, d) in self.members.iter().enumerate() {
                        let slice = &mut chunk_buf[s * ss as usize..(s + 1) * ss as usize];
                        d.read_at(chunk * ss, slice).map_err(|e| {
                            ShfsError::io_extra(e, format!("reading from {}", d.path()))
                        })?;
                    }
                }
            }
        }
        Ok(())
    }
    /// Write `count` chunks starting at `start` from `buf`
    pub fn write_chunks(&self, start: Chk, count: Chk, buf: &[u8]) -> ShfsResult<()> {
        self.check_range(start, count, buf.len())?;
        let ss = self.stripesize as u64;
        let cs = self.chunksize() as usize;
        for c in 0..count {
            let chunk = start + c;
            let chunk_buf = &buf[c as usize * cs..(c as usize + 1) * cs];
            match self.mode {
                StripeMode::Combined => {
                    // mirror the chunk onto every member
                    for d in &self.members {
                        d.write_at(chunk * ss, chunk_buf)
                            .map_err(|e| ShfsError::io_extra(e, format!("writing to {}", d.path())))?;
                    }
                }
                StripeMode::Independent => {
                    for (s, d) in self.members.iter().enumerate() {
                        let slice = &chunk_buf[s * ss as usize..(s + 1) * ss as usize];
                        d.write_at(chunk * ss, slice).map_err(|e| {
                            ShfsError::io_extra(e, format!("writing to {}", d.path()))
                        })?;
                    }
                }
            }
        }
        Ok(())
    }
    /// Read the raw label block (first 4 KiB) of one member, bypassing the
    /// stripe mapping: chunk 0 is replicated per member, not striped
    pub fn read_label(&self, member: usize, buf: &mut [u8]) -> ShfsResult<()> {
        let d = &self.members[member];
        d.read_at(0, buf)
            .map_err(|e| ShfsError::io_extra(e, format!("reading label from {}", d.path())))
    }
}
