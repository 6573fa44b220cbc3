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

//! `max_count = UNBOUNDED` (spec §4.3 "UnlimP"). Small counts (up to
//! `FAST_COUNT`) live in the same pool-backed inline storage
//! [`crate::bucket::pooled`] uses; beyond that the bucket holds a
//! conventional growable array. Used where the table must accept arbitrary
//! collisions without ever triggering a table-wide growth — e.g. backing
//! the multi-map's value array (spec §4.5).

use crate::bucket::{
    pooled::{PooledBucket, PooledParams},
    AddRejected, BucketPolicy, MaxCount,
};

const FAST_COUNT: usize = 4;

enum Storage<T> {
    Inline(PooledBucket<T, FAST_COUNT>),
    Grown(Vec<T>),
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Storage::Inline(PooledBucket::default())
    }
}

pub struct UnlimP<T> {
    storage: Storage<T>,
}

impl<T> Default for UnlimP<T> {
    fn default() -> Self {
        Self {
            storage: Storage::default(),
        }
    }
}

#[derive(Default)]
pub struct UnlimPParams<T> {
    inline: PooledParams<T, FAST_COUNT>,
}

impl<T> UnlimP<T> {
    /// Empties the bucket and hands back everything it held, in no
    /// particular order. Used by `HashMultiMap::remove_key` (spec §4.5),
    /// which discards a key's whole value-array at once rather than one
    /// item at a time.
    pub fn take_all(&mut self, params: &mut UnlimPParams<T>) -> Vec<T> {
        match core::mem::replace(&mut self.storage, Storage::Grown(Vec::new())) {
            Storage::Inline(mut b) => b.drain_into_vec(&mut params.inline),
            Storage::Grown(v) => v,
        }
    }
}

impl<T> BucketPolicy<T> for UnlimP<T> {
    type Params = UnlimPParams<T>;

    // UNBOUNDED: `is_full`/`was_full` are always false — a bucket of this
    // policy never forces the hash table to grow on its account.
    const MAX_COUNT: MaxCount = MaxCount::Unbounded;

    fn bounds(&self) -> &[T] {
        match &self.storage {
            Storage::Inline(b) => b.bounds(),
            Storage::Grown(v) => v.as_slice(),
        }
    }

    fn bounds_mut(&mut self) -> &mut [T] {
        match &mut self.storage {
            Storage::Inline(b) => b.bounds_mut(),
            Storage::Grown(v) => v.as_mut_slice(),
        }
    }

    fn add(
        &mut self,
        params: &mut Self::Params,
        hash_code: u64,
        item: T,
    ) -> Result<(), AddRejected<T>> {
        match &mut self.storage {
            Storage::Inline(b) => match b.add(&mut params.inline, hash_code, item) {
                Ok(()) => Ok(()),
                Err(AddRejected(item)) => {
                    // inline capacity exhausted: migrate to a growable Vec
                    let mut v: Vec<T> = b.drain_into_vec(&mut params.inline);
                    v.push(item);
                    self.storage = Storage::Grown(v);
                    Ok(())
                }
            },
            Storage::Grown(v) => {
                v.push(item);
                Ok(())
            }
        }
    }

    fn remove(&mut self, params: &mut Self::Params, index: usize) -> T {
        match &mut self.storage {
            Storage::Inline(b) => b.remove(&mut params.inline, index),
            Storage::Grown(v) => v.swap_remove(index),
        }
    }

    fn is_full(&self) -> bool {
        false
    }

    fn was_full(&self) -> bool {
        // unbounded: this policy never reaches MAX_COUNT, so it never
        // contributes a was-full witness to probe termination
        false
    }

    fn clear(&mut self, params: &mut Self::Params) {
        match &mut self.storage {
            Storage::Inline(b) => b.clear(&mut params.inline),
            Storage::Grown(v) => v.clear(),
        }
        self.storage = Storage::Inline(PooledBucket::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_past_inline_capacity() {
        let mut params = UnlimPParams::default();
        let mut bucket: UnlimP<u32> = UnlimP::default();
        for i in 0..20u32 {
            bucket.add(&mut params, i as u64, i).ok().unwrap();
        }
        assert_eq!(bucket.bounds().len(), 20);
        assert!(!bucket.is_full());
    }
}
