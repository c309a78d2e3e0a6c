/*
 * Created on Mon Jan 08 2024
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

/// Fold a sequence of conditions with `&&`
macro_rules! okay {
    ($($cond:expr),+ $(,)?) => {
        $($cond)&&+
    };
}

/// Little-endian integer read out of a byte slice at a const range
macro_rules! int_le {
    ($ty:ty, $block:expr, $range:expr) => {{
        let mut buf = [0u8; { <$ty>::BITS as usize / 8 }];
        buf.copy_from_slice(&$block[$range]);
        <$ty>::from_le_bytes(buf)
    }};
}
