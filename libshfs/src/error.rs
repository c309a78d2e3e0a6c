/*
 * Created on Tue Jan 09 2024
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

use std::{fmt, io::Error as IoError};

pub type ShfsResult<T> = Result<T, ShfsError>;

#[derive(Debug)]
pub enum ShfsError {
    /// I/O failure on a member device or a source file
    Io(IoError),
    /// I/O failure, with a description of what was being done
    IoExtra(IoError, String),
    /// On-disk format violation
    Format(FormatError),
    /// Volume, member or bucket capacity exhausted
    Capacity(CapacityError),
    /// Allocator range conflict
    Alloc(AllocError),
    /// Invalid user-supplied argument
    InvalidArgument(String),
    /// An object with the same digest is already stored
    DuplicateObject,
    /// No object with the given digest
    NotFound,
    /// Operation aborted by a termination signal
    Cancelled,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Label and header decode errors
pub enum FormatError {
    /// the label magic did not match
    BadMagic,
    /// the label version is not supported by this build
    UnsupportedVersion,
    /// unknown stripe mode tag
    UnsupportedStripeMode,
    /// stripe size below minimum or not a power of two
    BadStripeSize,
    /// device logical block size below 512 or not a power of two
    BadBlockSize,
    /// a member device mapped to more than one slot of the member table
    DuplicateMember,
    /// the member mapping could not be established
    MissingMember,
    /// malformed or inconsistent configuration header
    BadConfig,
    /// chunk address beyond the end of the volume
    OutOfRange,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Space accounting errors
pub enum CapacityError {
    /// a member device is smaller than the volume declares
    MemberTooSmall,
    /// no free chunk range is large enough
    VolumeFull,
    /// the target bucket has no empty slot left
    BucketFull,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum AllocError {
    /// the range overlaps an already registered range
    Overlap,
    /// the range is not fully occupied
    NotOccupied,
}

impl ShfsError {
    pub fn io_extra(ioe: IoError, doing: impl ToString) -> Self {
        Self::IoExtra(ioe, doing.to_string())
    }
    pub fn inval(what: impl ToString) -> Self {
        Self::InvalidArgument(what.to_string())
    }
}

impl fmt::Display for ShfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(ioe) => write!(f, "I/O error: {}", ioe),
            Self::IoExtra(ioe, doing) => write!(f, "I/O error while {doing}: {ioe}"),
            Self::Format(ferr) => write!(f, "format error: {}", ferr),
            Self::Capacity(cerr) => write!(f, "{}", cerr),
            Self::Alloc(aerr) => write!(f, "allocator error: {}", aerr),
            Self::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            Self::DuplicateObject => write!(f, "an entry with the same hash already exists"),
            Self::NotFound => write!(f, "no such entry found"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::BadMagic => "invalid SHFS label",
            Self::UnsupportedVersion => "unsupported SHFS label version",
            Self::UnsupportedStripeMode => "stripe mode is not supported",
            Self::BadStripeSize => "stripe size invalid",
            Self::BadBlockSize => "incompatible device block size",
            Self::DuplicateMember => "a member is specified multiple times",
            Self::MissingMember => "could not establish member mapping",
            Self::BadConfig => "malformed SHFS configuration",
            Self::OutOfRange => "chunk address beyond end of volume",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::MemberTooSmall => "member device is too small",
            Self::VolumeFull => "could not find an appropriate free volume area",
            Self::BucketFull => "target bucket of hash table is full",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Overlap => "range overlaps a registered range",
            Self::NotOccupied => "range is not fully occupied",
        };
        f.write_str(msg)
    }
}

impl From<IoError> for ShfsError {
    fn from(ioe: IoError) -> Self {
        Self::Io(ioe)
    }
}

impl From<FormatError> for ShfsError {
    fn from(ferr: FormatError) -> Self {
        Self::Format(ferr)
    }
}

impl From<CapacityError> for ShfsError {
    fn from(cerr: CapacityError) -> Self {
        Self::Capacity(cerr)
    }
}

impl From<AllocError> for ShfsError {
    fn from(aerr: AllocError) -> Self {
        Self::Alloc(aerr)
    }
}
