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

//! Open addressing with per-bucket short hashes and an explicit
//! mantissa+exponent max-probe field (spec §4.3 "Open2N2"), `max_count ≤
//! 3`. This is `Open8`'s fallback comparison strategy on hosts without
//! SSE2 — used directly (not just as a fallback) when items are large
//! enough that a linear scan over at most 3 slots beats setting up a SIMD
//! compare at all. Structurally this is `OpenN1` with a different ceiling;
//! the original keeps them as separate bucket headers for the same reason
//! `LimP`/`LimP1` stay separate — a C++ tagged-pointer layout distinction
//! that has no Rust counterpart (spec §9).

use crate::bucket::{open_addr, AddRejected, BucketPolicy, MaxCount};
use crate::mem::uarray::UArray;

pub const MAX_COUNT: usize = 3;

pub struct Open2N2<T> {
    items: UArray<MAX_COUNT, T>,
    short_hashes: [u8; MAX_COUNT],
    max_probe_exp: u8,
}

impl<T> Default for Open2N2<T> {
    fn default() -> Self {
        Self {
            items: UArray::new(),
            short_hashes: [open_addr::EMPTY_SHORT_HASH; MAX_COUNT],
            max_probe_exp: 0,
        }
    }
}

impl<T> BucketPolicy<T> for Open2N2<T> {
    type Params = ();

    const MAX_COUNT: MaxCount = MaxCount::Bounded(MAX_COUNT);
    const LOAD_RATIO: (usize, usize) = (5, 6);

    fn bounds(&self) -> &[T] {
        self.items.as_slice()
    }

    fn bounds_mut(&mut self) -> &mut [T] {
        self.items.as_slice_mut()
    }

    fn add(&mut self, _params: &mut (), hash_code: u64, item: T) -> Result<(), AddRejected<T>> {
        if self.items.is_full() {
            return Err(AddRejected(item));
        }
        let index = self.items.len();
        self.items.push(item);
        self.short_hashes[index] = open_addr::short_hash(hash_code);
        Ok(())
    }

    fn remove(&mut self, _params: &mut (), index: usize) -> T {
        let last = self.items.len() - 1;
        self.short_hashes[index] = self.short_hashes[last];
        self.short_hashes[last] = open_addr::EMPTY_SHORT_HASH;
        self.items.swap_remove(index)
    }

    fn is_full(&self) -> bool {
        self.items.is_full()
    }

    fn was_full(&self) -> bool {
        true
    }

    fn clear(&mut self, _params: &mut ()) {
        self.items.clear();
        self.short_hashes = [open_addr::EMPTY_SHORT_HASH; MAX_COUNT];
        self.max_probe_exp = 0;
    }

    fn hash_code_part(&self, index: usize) -> Option<u64> {
        self.short_hashes.get(index).map(|&b| b as u64)
    }

    fn max_probe(&self) -> usize {
        open_addr::max_probe(self.max_probe_exp)
    }

    fn update_max_probe(&mut self, probe: usize) {
        self.max_probe_exp = open_addr::update_max_probe(self.max_probe_exp, probe);
    }

    const IS_NOTHROW_ADDABLE_IF_NOTHROW_CREATABLE: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn was_full_never_clears_without_explicit_clear() {
        let mut b: Open2N2<u32> = Open2N2::default();
        b.add(&mut (), 1, 10).ok().unwrap();
        b.remove(&mut (), 0);
        assert!(b.was_full());
    }

    #[test]
    fn rejects_past_max_count() {
        let mut b: Open2N2<u32> = Open2N2::default();
        for i in 0..MAX_COUNT as u32 {
            b.add(&mut (), i as u64, i).ok().unwrap();
        }
        assert!(b.add(&mut (), 9, 99).is_err());
    }
}
