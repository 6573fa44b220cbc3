/*
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

//! Portable SWAR fallback for hosts without SSE2: an 8-byte word holds the
//! same control bytes the SSE2 path loads into a `__m128i`, compared with
//! the classic "does this word contain this byte" bit trick instead of a
//! hardware compare.

use super::bitmask::Bitmask;
use super::control;
use core::ptr;

pub const WIDTH: usize = 8;

type GroupWord = u64;
pub type BitmaskWord = GroupWord;

fn repeat(byte: u8) -> GroupWord {
    GroupWord::from_ne_bytes([byte; WIDTH])
}

pub const BITMASK_STRIDE: usize = 8;
pub const BITMASK_MASK: BitmaskWord = 0x8080_8080_8080_8080;

#[derive(Clone, Copy)]
pub struct Group(GroupWord);

impl Group {
    pub fn empty() -> [u8; WIDTH] {
        [control::EMPTY; WIDTH]
    }

    pub unsafe fn load(ptr: *const u8) -> Self {
        Group(ptr::read_unaligned(ptr.cast()))
    }

    /// See `graphics.stanford.edu/~seander/bithacks.html#ValueInWord`: a
    /// false positive is possible but harmless, since the caller always
    /// confirms the candidate slot against the full item afterwards.
    pub fn match_byte(self, byte: u8) -> Bitmask {
        let cmp = self.0 ^ repeat(byte);
        Bitmask((cmp.wrapping_sub(repeat(0x01)) & !cmp & repeat(0x80)).to_le())
    }
}
