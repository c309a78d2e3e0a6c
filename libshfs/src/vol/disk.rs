/*
 * Created on Fri Jan 12 2024
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

//! The member-device handle. A member is anything that supports positioned
//! reads and writes and reports a byte size and a logical block size: real
//! block devices in production, regular files in tests and staging setups.

use {
    crate::{error::ShfsError, IoResult, ShfsResult},
    std::fs::{File, OpenOptions},
};

/// Logical block size reported for regular files standing in for devices
const REGULAR_FILE_BLKSIZE: u32 = 512;

#[derive(Debug)]
pub struct Disk {
    file: File,
    path: String,
    size: u64,
    blksize: u32,
}

impl Disk {
    /// Open a member device read-write and capture its geometry
    pub fn open(path: &str) -> ShfsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| ShfsError::io_extra(e, format!("opening {}", path)))?;
        let (size, blksize) = Self::geometry(&file)
            .map_err(|e| ShfsError::io_extra(e, format!("reading geometry of {}", path)))?;
        Ok(Self {
            file,
            path: path.to_owned(),
            size,
            blksize,
        })
    }
    pub fn path(&self) -> &str {
        &self.path
    }
    /// Total capacity in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
    /// Logical block size in bytes
    pub fn blksize(&self) -> u32 {
        self.blksize
    }
    #[cfg(target_os = "linux")]
    fn geometry(file: &File) -> IoResult<(u64, u32)> {
        use std::os::unix::{fs::MetadataExt, io::AsRawFd};
        let md = file.metadata()?;
        if (md.mode() & libc::S_IFMT) == libc::S_IFBLK {
            crate::util::os::blkdev_geometry(file.as_raw_fd())
        } else {
            Ok((md.len(), REGULAR_FILE_BLKSIZE))
        }
    }
    #[cfg(not(target_os = "linux"))]
    fn geometry(file: &File) -> IoResult<(u64, u32)> {
        let md = file.metadata()?;
        Ok((md.len(), REGULAR_FILE_BLKSIZE))
    }
}

#[cfg(unix)]
impl Disk {
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> IoResult<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> IoResult<()> {
        use std::os::unix::fs::FileExt;
        self.file.write_all_at(buf, offset)
    }
}

#[cfg(windows)]
impl Disk {
    pub fn read_at(&self, mut offset: u64, mut buf: &mut [u8]) -> IoResult<()> {
        use std::{
            io::{Error, ErrorKind},
            os::windows::fs::FileExt,
        };
        while !buf.is_empty() {
            match self.file.seek_read(buf, offset)? {
                0 => return Err(Error::from(ErrorKind::UnexpectedEof)),
                n => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
    pub fn write_at(&self, mut offset: u64, mut buf: &[u8]) -> IoResult<()> {
        use std::{
            io::{Error, ErrorKind},
            os::windows::fs::FileExt,
        };
        while !buf.is_empty() {
            match self.file.seek_write(buf, offset)? {
                0 => return Err(Error::from(ErrorKind::WriteZero)),
                n => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::Disk, std::io::Write};

    fn scratch_file(name: &str, len: usize) -> String {
        let path = std::env::temp_dir().join(format!("shfs-disk-{}-{}", std::process::id(), name));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![0u8; len]).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn regular_file_geometry() {
        let path = scratch_file("geom", 8192);
        let d = Disk::open(&path).unwrap();
        assert_eq!(d.size(), 8192);
        assert_eq!(d.blksize(), 512);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn positioned_io_roundtrip() {
        let path = scratch_file("pio", 8192);
        let d = Disk::open(&path).unwrap();
        d.write_at(4096, b"shfs rules").unwrap();
        let mut buf = [0u8; 10];
        d.read_at(4096, &mut buf).unwrap();
        assert_eq!(&buf, b"shfs rules");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn open_missing_member_fails() {
        assert!(Disk::open("/definitely/not/here").is_err());
    }
}
