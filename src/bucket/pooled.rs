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

//! Shared pool-backed bucket storage for `LimP4`, `LimP` and `Lim4` (spec
//! §4.3). The three differ in the original only by `max_count` and the
//! exact tagged-pointer encoding used to track which size-class pool a
//! bucket's payload currently lives in (`details/BucketLim4.h`); since this
//! crate stores bucket state in plain fields rather than packed pointer
//! bits (spec §9's "pad the payload or move the tag into a separate byte"),
//! all three are one generic implementation parameterised only by
//! `MAX_COUNT`.
//!
//! Growth: a bucket with `n` items lives in a block from the size-class-`n`
//! pool (one pool per count from 1 to `MAX_COUNT`). Adding past the current
//! block's capacity allocates from the next size class, copies the
//! existing items across, and frees the old block back to its own pool —
//! this is the "transitions the payload to the next pool" behavior spec.md
//! describes for `LimP4`, generalized to any `MAX_COUNT`.

use crate::{
    bucket::{AddRejected, BucketPolicy, MaxCount},
    error::Error,
    mem::pool::{ChunkHeader, MemPool, PoolParams},
};
use core::{mem, ptr::NonNull};

pub struct PooledParams<T, const MAX_COUNT: usize> {
    // pools[i] serves blocks holding exactly i+1 items
    pools: [MemPool; MAX_COUNT],
    _marker: core::marker::PhantomData<T>,
}

impl<T, const MAX_COUNT: usize> Default for PooledParams<T, MAX_COUNT> {
    fn default() -> Self {
        let pools = core::array::from_fn(|i| {
            MemPool::new(PoolParams::new(mem::size_of::<T>() * (i + 1), mem::align_of::<T>()))
        });
        Self {
            pools,
            _marker: core::marker::PhantomData,
        }
    }
}

pub struct PooledBucket<T, const MAX_COUNT: usize> {
    block: Option<NonNull<T>>,
    chunk: Option<NonNull<ChunkHeader>>,
    count: u8,
    was_full: bool,
    short_hashes: [u8; MAX_COUNT],
}

impl<T, const MAX_COUNT: usize> Default for PooledBucket<T, MAX_COUNT> {
    fn default() -> Self {
        Self {
            block: None,
            chunk: None,
            count: 0,
            was_full: false,
            short_hashes: [0; MAX_COUNT],
        }
    }
}

fn short_hash(hash_code: u64) -> u8 {
    (hash_code & 0xff) as u8
}

impl<T, const MAX_COUNT: usize> PooledBucket<T, MAX_COUNT> {
    fn as_slice(&self) -> &[T] {
        match self.block {
            Some(ptr) => unsafe { core::slice::from_raw_parts(ptr.as_ptr(), self.count as usize) },
            None => &[],
        }
    }

    fn as_slice_mut(&mut self) -> &mut [T] {
        match self.block {
            Some(ptr) => unsafe {
                core::slice::from_raw_parts_mut(ptr.as_ptr(), self.count as usize)
            },
            None => &mut [],
        }
    }

    fn grow(
        &mut self,
        params: &mut PooledParams<T, MAX_COUNT>,
        item: T,
        hash_code: u64,
    ) -> Result<(), AddRejected<T>> {
        if self.count as usize >= MAX_COUNT {
            return Err(AddRejected(item));
        }
        let new_count = self.count as usize + 1;
        let new_class = new_count - 1;
        let (new_block, new_chunk) = match params.pools[new_class].allocate() {
            Ok(pair) => pair,
            Err(Error::OutOfMemory) | Err(_) => return Err(AddRejected(item)),
        };
        let new_ptr = new_block.cast::<T>();
        unsafe {
            if let Some(old) = self.block {
                core::ptr::copy_nonoverlapping(old.as_ptr(), new_ptr.as_ptr(), self.count as usize);
                // old block's bytes are logically moved-from now; free the
                // raw storage without running T's destructor again
                let old_class = self.count as usize - 1;
                params.pools[old_class].deallocate(old.cast(), self.chunk.unwrap());
            }
            new_ptr.as_ptr().add(self.count as usize).write(item);
        }
        self.block = Some(new_ptr);
        self.chunk = Some(new_chunk);
        self.short_hashes[self.count as usize] = short_hash(hash_code);
        self.count = new_count as u8;
        if new_count == MAX_COUNT {
            self.was_full = true;
        }
        Ok(())
    }
}

impl<T, const MAX_COUNT: usize> PooledBucket<T, MAX_COUNT> {
    /// Move every item out into a fresh `Vec`, freeing this bucket's pool
    /// block in the process. Used by policies (`UnlimP`) that fall back to
    /// an unbounded growable array once inline capacity is exhausted.
    pub fn drain_into_vec(&mut self, params: &mut PooledParams<T, MAX_COUNT>) -> Vec<T> {
        let count = self.count as usize;
        let mut out = Vec::with_capacity(count + 1);
        if let Some(block) = self.block.take() {
            let chunk = self.chunk.take().unwrap();
            unsafe {
                for i in 0..count {
                    out.push(core::ptr::read(block.as_ptr().add(i)));
                }
                params.pools[count - 1].deallocate(block.cast(), chunk);
            }
        }
        self.count = 0;
        out
    }
}

impl<T, const MAX_COUNT: usize> BucketPolicy<T> for PooledBucket<T, MAX_COUNT> {
    type Params = PooledParams<T, MAX_COUNT>;

    const MAX_COUNT: MaxCount = MaxCount::Bounded(MAX_COUNT);
    // spec §4.4: "max_count/8 × 5" for the LimP family, which `Lim4` and
    // `UnlimP`'s inline storage also inherit by sharing this impl.
    const LOAD_RATIO: (usize, usize) = (5, 8);

    fn bounds(&self) -> &[T] {
        self.as_slice()
    }

    fn bounds_mut(&mut self) -> &mut [T] {
        self.as_slice_mut()
    }

    fn add(
        &mut self,
        params: &mut Self::Params,
        hash_code: u64,
        item: T,
    ) -> Result<(), AddRejected<T>> {
        self.grow(params, item, hash_code)
    }

    fn remove(&mut self, params: &mut Self::Params, index: usize) -> T {
        let count = self.count as usize;
        assert!(index < count, "pooled bucket: index out of range");
        let slice_ptr = self.block.expect("remove on empty bucket").as_ptr();
        let removed = unsafe {
            let target = slice_ptr.add(index);
            let value = core::ptr::read(target);
            let last = slice_ptr.add(count - 1);
            if target != last {
                core::ptr::copy_nonoverlapping(last, target, 1);
                self.short_hashes[index] = self.short_hashes[count - 1];
            }
            value
        };
        self.count -= 1;
        if self.count == 0 {
            let chunk = self.chunk.take().unwrap();
            let block = self.block.take().unwrap();
            unsafe { params.pools[count - 1].deallocate(block.cast(), chunk) };
        }
        removed
    }

    fn is_full(&self) -> bool {
        self.count as usize == MAX_COUNT
    }

    fn was_full(&self) -> bool {
        self.was_full
    }

    fn clear(&mut self, params: &mut Self::Params) {
        if let (Some(block), Some(chunk)) = (self.block.take(), self.chunk.take()) {
            unsafe {
                core::ptr::drop_in_place(core::slice::from_raw_parts_mut(
                    block.as_ptr(),
                    self.count as usize,
                ));
                params.pools[self.count as usize - 1].deallocate(block.cast(), chunk);
            }
        }
        self.count = 0;
        self.was_full = false;
    }

    fn hash_code_part(&self, index: usize) -> Option<u64> {
        self.short_hashes.get(index).map(|&b| b as u64)
    }
}

impl<T, const MAX_COUNT: usize> Drop for PooledBucket<T, MAX_COUNT> {
    fn drop(&mut self) {
        if let Some(block) = self.block {
            unsafe {
                core::ptr::drop_in_place(core::slice::from_raw_parts_mut(
                    block.as_ptr(),
                    self.count as usize,
                ));
            }
        }
        // the backing chunk is intentionally not released here: a bucket
        // never outlives the `Params` (pools) it was allocated from, and
        // the owning hash table clears every bucket (which does release
        // chunk blocks) before dropping the bucket array itself.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_through_size_classes() {
        let mut params: PooledParams<u32, 4> = PooledParams::default();
        let mut bucket: PooledBucket<u32, 4> = PooledBucket::default();
        for i in 0..4u32 {
            bucket.add(&mut params, i as u64, i).ok().unwrap();
        }
        assert!(bucket.is_full());
        assert!(bucket.was_full());
        assert_eq!(bucket.bounds(), &[0, 1, 2, 3]);
        let removed = bucket.remove(&mut params, 1);
        assert_eq!(removed, 1);
        assert_eq!(bucket.bounds().len(), 3);
        // was-full remains true even though the bucket shrank
        assert!(bucket.was_full());
    }

    #[test]
    fn add_beyond_max_count_is_rejected() {
        let mut params: PooledParams<u32, 1> = PooledParams::default();
        let mut bucket: PooledBucket<u32, 1> = PooledBucket::default();
        bucket.add(&mut params, 0, 10).ok().unwrap();
        let err = bucket.add(&mut params, 0, 20);
        assert!(err.is_err());
    }
}
