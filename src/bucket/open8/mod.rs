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

//! `max_count = 7` (spec §4.3 "Open8"). Open addressing with a short-hash
//! control byte per slot, compared 8-at-a-time: one `_mm_cmpeq_epi8`
//! against the group on SSE2 hosts (`sse2.rs`, mirrors
//! `server/src/skymap/sse2.rs`), a SWAR byte-in-word trick everywhere else
//! (`generic.rs`, mirrors `server/src/skymap/generic.rs`). `Open2N2` is a
//! separate policy entirely (its own type, its own bucket header) that a
//! table author picks directly for large items rather than something
//! `Open8` falls back to at runtime.

use crate::bucket::{open_addr, AddRejected, BucketPolicy, MaxCount};
use crate::mem::uarray::UArray;
use cfg_if::cfg_if;

mod bitmask;
mod control;

cfg_if! {
    if #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), target_feature = "sse2"))] {
        mod sse2;
        use sse2 as imp;
    } else {
        mod generic;
        use generic as imp;
    }
}

use imp::Group;

pub const MAX_COUNT: usize = 7;

/// 7-bit short hash: the group comparison covers a full control byte per
/// slot, but bit 7 is reserved so a real short hash can never collide with
/// [`control::EMPTY`] (`0xff`).
fn short_hash(hash_code: u64) -> u8 {
    ((hash_code >> (u64::BITS - 7)) as u8) & 0x7f
}

pub struct Open8<T> {
    items: UArray<MAX_COUNT, T>,
    ctrl: [u8; imp::WIDTH],
    max_probe_exp: u8,
}

impl<T> Default for Open8<T> {
    fn default() -> Self {
        Self {
            items: UArray::new(),
            ctrl: Group::empty(),
            max_probe_exp: 0,
        }
    }
}

impl<T> Open8<T> {
    fn group(&self) -> Group {
        unsafe {
            // SAFETY: `ctrl` is `imp::WIDTH` bytes, exactly what `load`
            // reads.
            Group::load(self.ctrl.as_ptr())
        }
    }
}

impl<T> BucketPolicy<T> for Open8<T> {
    type Params = ();

    const MAX_COUNT: MaxCount = MaxCount::Bounded(MAX_COUNT);
    const LOAD_RATIO: (usize, usize) = (13, 14);

    fn bounds(&self) -> &[T] {
        self.items.as_slice()
    }

    fn bounds_mut(&mut self) -> &mut [T] {
        self.items.as_slice_mut()
    }

    /// Masks the group compare down to the short hash of interest, then
    /// confirms each candidate lane against `predicate` — the false
    /// positives a narrowed compare can produce are harmless here, same as
    /// in `generic::Group::match_byte`.
    fn find(&self, hash_code: u64, predicate: impl Fn(&T) -> bool) -> Option<usize> {
        let group = self.group();
        let want = short_hash(hash_code);
        let len = self.items.len();
        for lane in group.match_byte(want) {
            if lane < len && predicate(&self.items[lane]) {
                return Some(lane);
            }
        }
        None
    }

    fn add(&mut self, _params: &mut (), hash_code: u64, item: T) -> Result<(), AddRejected<T>> {
        if self.items.is_full() {
            return Err(AddRejected(item));
        }
        let index = self.items.len();
        self.items.push(item);
        self.ctrl[index] = short_hash(hash_code);
        Ok(())
    }

    fn remove(&mut self, _params: &mut (), index: usize) -> T {
        let last = self.items.len() - 1;
        self.ctrl[index] = self.ctrl[last];
        self.ctrl[last] = control::EMPTY;
        self.items.swap_remove(index)
    }

    fn is_full(&self) -> bool {
        // spec: "is_full means the short-hash of the last slot is non-empty"
        self.ctrl[MAX_COUNT - 1] != control::EMPTY
    }

    fn was_full(&self) -> bool {
        true
    }

    fn clear(&mut self, _params: &mut ()) {
        self.items.clear();
        self.ctrl = Group::empty();
        self.max_probe_exp = 0;
    }

    fn hash_code_part(&self, index: usize) -> Option<u64> {
        self.ctrl
            .get(index)
            .filter(|&&b| b != control::EMPTY)
            .map(|&b| b as u64)
    }

    fn max_probe(&self) -> usize {
        open_addr::max_probe(self.max_probe_exp)
    }

    fn update_max_probe(&mut self, probe: usize) {
        self.max_probe_exp = open_addr::update_max_probe(self.max_probe_exp, probe);
    }

    /// Spec §4.3 calls this probing "quadratic", but the formula it gives —
    /// `(i + probe) mod bucket_count` — is the same linear step every other
    /// open-addressing policy here uses. `Open8` only differs in how a
    /// bucket's own slots compare, not in how the table steps between
    /// buckets, so there is nothing to override; this impl exists only to
    /// document that the trait default is deliberate here, not an oversight.
    fn next_bucket_index(bucket_index: usize, _hash_code: u64, bucket_count: usize, probe: usize) -> usize {
        (bucket_index + probe) % bucket_count
    }

    const IS_NOTHROW_ADDABLE_IF_NOTHROW_CREATABLE: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_locates_by_short_hash() {
        let mut b: Open8<u32> = Open8::default();
        for i in 0..5u32 {
            b.add(&mut (), i as u64, i * 10).ok().unwrap();
        }
        for i in 0..5u32 {
            let found = b.find(i as u64, |&v| v == i * 10);
            assert_eq!(found, Some(i as usize));
        }
    }

    #[test]
    fn is_full_tracks_last_slot() {
        let mut b: Open8<u32> = Open8::default();
        for i in 0..MAX_COUNT as u32 {
            assert!(!b.is_full());
            b.add(&mut (), i as u64, i).ok().unwrap();
        }
        assert!(b.is_full());
    }
}
