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

//! SSE2 group comparison for the `Open8` bucket (spec §4.3). One group
//! holds the short-hash control bytes of a bucket; `match_byte` finds every
//! slot whose control byte equals the probed short hash in one instruction
//! rather than an 8-iteration scalar loop.

use super::bitmask::Bitmask;
use super::control;

#[cfg(target_arch = "x86")]
use core::arch::x86;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64 as x86;

pub type BitmaskWord = u16;
pub const BITMASK_STRIDE: usize = 1;
pub const BITMASK_MASK: BitmaskWord = 0xffff;

/// Number of short-hash control bytes packed per bucket, matching the
/// original's `int64_t` control word (`BucketOpenN1<..., 7, ...,
/// int64_t>`): 8 bytes of storage for a 7-item bucket.
pub const WIDTH: usize = 8;

#[derive(Clone, Copy)]
pub struct Group(x86::__m128i);

impl Group {
    pub fn empty() -> [u8; WIDTH] {
        [control::EMPTY; WIDTH]
    }

    /// Loads the 8-byte control word into the low half of a 128-bit
    /// register, zeroing the high half (mirrors `_mm_set_epi64x(0, data)`).
    pub unsafe fn load(ptr: *const u8) -> Self {
        Group(x86::_mm_loadl_epi64(ptr.cast()))
    }

    /// Returns a bitmask of every byte in the group equal to `byte`. Only
    /// the low `WIDTH` bits are meaningful; the caller masks the rest away.
    pub fn match_byte(self, byte: u8) -> Bitmask {
        unsafe {
            let cmp = x86::_mm_cmpeq_epi8(self.0, x86::_mm_set1_epi8(byte as i8));
            Bitmask(x86::_mm_movemask_epi8(cmp) as u16)
        }
    }
}
