/*
 * Created on Thu Jan 11 2024
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

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, as stored in `ts_creation`
pub fn get_epoch_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(target_os = "linux")]
pub use linux::blkdev_geometry;

#[cfg(target_os = "linux")]
mod linux {
    use {
        crate::IoResult,
        std::{io::Error as IoError, os::unix::io::RawFd},
    };

    // ioctl request numbers from <linux/fs.h>
    const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;
    const BLKSSZGET: libc::c_ulong = 0x1268;

    /// Total byte size and logical block size of a block device
    pub fn blkdev_geometry(fd: RawFd) -> IoResult<(u64, u32)> {
        let mut size: u64 = 0;
        let mut blksize: libc::c_int = 0;
        unsafe {
            if libc::ioctl(fd, BLKGETSIZE64 as _, &mut size as *mut u64) != 0 {
                return Err(IoError::last_os_error());
            }
            if libc::ioctl(fd, BLKSSZGET as _, &mut blksize as *mut libc::c_int) != 0 {
                return Err(IoError::last_os_error());
            }
        }
        Ok((size, blksize as u32))
    }
}
