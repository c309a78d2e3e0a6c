/*
 * Created on Wed Jan 10 2024
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

//! The streaming digest primitive. Object content is hashed chunk by chunk
//! while it is buffered for the write path, so the source is only ever read
//! sequentially. The digest family is implied by the volume's `hlen`: up to
//! 32 bytes we truncate SHA-256, beyond that SHA-512.

use sha2::{Digest, Sha256, Sha512};

/// Maximum digest length supported by the on-disk format
pub const HASH_MAX_LEN: usize = 64;

/// A digest, zero-padded to [`HASH_MAX_LEN`]. The all-zero value denotes an
/// empty hash-table slot
pub type Hash = [u8; HASH_MAX_LEN];

pub fn hash_is_zero(h: &[u8]) -> bool {
    h.iter().all(|b| *b == 0)
}

enum DigestState {
    Sha256(Sha256),
    Sha512(Sha512),
}

/// Streaming content digest, truncated to the volume's `hlen` on finish
pub struct ObjectDigest {
    state: DigestState,
    hlen: u8,
}

impl ObjectDigest {
    /// Start a new digest for a volume with the given `hlen` (1..=64)
    pub fn new(hlen: u8) -> Self {
        debug_assert!(hlen >= 1 && hlen as usize <= HASH_MAX_LEN);
        let state = if hlen <= 32 {
            DigestState::Sha256(Sha256::new())
        } else {
            DigestState::Sha512(Sha512::new())
        };
        Self { state, hlen }
    }
    pub fn update(&mut self, bytes: &[u8]) {
        match &mut self.state {
            DigestState::Sha256(d) => d.update(bytes),
            DigestState::Sha512(d) => d.update(bytes),
        }
    }
    /// Finish the digest, truncating to `hlen` bytes and zero-padding the
    /// rest of the [`Hash`]
    pub fn finish(self) -> Hash {
        let mut h: Hash = [0; HASH_MAX_LEN];
        match self.state {
            DigestState::Sha256(d) => {
                let full = d.finalize();
                let take = (self.hlen as usize).min(full.len());
                h[..take].copy_from_slice(&full[..take]);
            }
            DigestState::Sha512(d) => {
                let full = d.finalize();
                let take = (self.hlen as usize).min(full.len());
                h[..take].copy_from_slice(&full[..take]);
            }
        }
        h
    }
}
