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

//! The bucket contract (spec §4.2) and its concrete policies (spec §4.3).
//! Every policy in this module satisfies [`BucketPolicy`]; the hash table
//! (`crate::hashtable`) is written against the trait alone and is oblivious
//! to which policy backs a given instantiation.

pub mod lim4;
pub mod lim_p;
pub mod lim_p4;
pub mod one_i;
pub mod open2n2;
pub mod open8;
pub(crate) mod open_addr;
pub mod open_n1;
pub mod pooled;
pub mod unlim_p;

pub use lim4::Lim4;
pub use lim_p::LimP;
pub use lim_p4::LimP4;
pub use one_i::OneI;
pub use open2n2::Open2N2;
pub use open8::Open8;
pub use open_n1::OpenN1;
pub use unlim_p::UnlimP;

/// `max_count` for a bucket policy; `Unbounded` is `UnlimP`'s case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxCount {
    Bounded(usize),
    Unbounded,
}

/// Every bucket policy `B` satisfies this for some item type `T`. Mirrors
/// spec §4.2 exactly: `bounds`/`find` read, `add`/`remove` mutate by one
/// item, `is_full`/`was_full` report fullness state, and the two optional
/// hooks (`hash_code_part`, `next_bucket_index`) default to "no
/// acceleration" / "linear probing" so policies that don't care about them
/// need not implement them.
pub trait BucketPolicy<T>: Default {
    /// Per-hash-table shared state this policy needs (typically one or
    /// more memory pools). `()` for policies that store everything inline.
    type Params: Default;

    const MAX_COUNT: MaxCount;

    /// The bucket's current items, in policy-defined (not necessarily
    /// insertion) order.
    fn bounds(&self) -> &[T];

    /// Mutable counterpart of [`Self::bounds`]; used by the hash table's
    /// `find_mut`/`get_or_insert_with` paths and by in-place column updates
    /// (spec §4.8).
    fn bounds_mut(&mut self) -> &mut [T];

    /// Linear walk over `bounds()`, returning the index of the first match.
    /// `hash_code` is passed through so policies with per-slot short hashes
    /// (`Open8`) can prefilter candidate slots before running `predicate`;
    /// policies without that acceleration just ignore it.
    fn find(&self, hash_code: u64, predicate: impl Fn(&T) -> bool) -> Option<usize> {
        let _ = hash_code;
        self.bounds().iter().position(predicate)
    }

    /// Grow the bucket by one. On failure (bucket already at `MAX_COUNT`,
    /// or allocation failure for a pool-backed policy) the item is handed
    /// back in the error so the caller (the hash table) can try the next
    /// bucket in the probe sequence.
    fn add(
        &mut self,
        params: &mut Self::Params,
        hash_code: u64,
        item: T,
    ) -> Result<(), AddRejected<T>>;

    /// Shrink by one, swap-removing the item at `index` (the last item
    /// takes its slot — the Rust equivalent of the original's
    /// `replacer(last, removed)`). Returns the removed item.
    fn remove(&mut self, params: &mut Self::Params, index: usize) -> T;

    fn is_full(&self) -> bool;

    /// Monotone non-decreasing until `clear`: true iff the bucket has at
    /// some point held `MAX_COUNT` items.
    fn was_full(&self) -> bool;

    fn clear(&mut self, params: &mut Self::Params);

    /// Cheap partial-hash lookup used to accelerate incremental rehash
    /// (spec §4.4 "Draining"). `None` means "fall through to the full hash
    /// getter".
    fn hash_code_part(&self, _index: usize) -> Option<u64> {
        None
    }

    fn max_probe(&self) -> usize {
        0
    }

    fn update_max_probe(&mut self, _probe: usize) {}

    /// Per-policy probe step; the default is linear probing.
    fn next_bucket_index(bucket_index: usize, _hash_code: u64, bucket_count: usize, probe: usize) -> usize {
        (bucket_index + probe) % bucket_count
    }

    /// Whether `add` is guaranteed not to throw when `T`'s constructor is
    /// guaranteed not to throw — lets the hash table tighten its own
    /// exception guarantee (spec §4.3, last paragraph).
    const IS_NOTHROW_ADDABLE_IF_NOTHROW_CREATABLE: bool = false;

    /// `bucket_count × max_count × load_ratio`, as a numerator/denominator
    /// pair (spec §4.4 "Capacity policy"). Default matches Open8's 13/14;
    /// policies the spec gives a different ratio (`OpenN1`: 5/6, the
    /// pool-backed closed policies: 5/8) override it.
    const LOAD_RATIO: (usize, usize) = (13, 14);

    /// Capacity bound for a bucket array of `bucket_count` buckets under
    /// this policy. `UnlimP` is unbounded and never constrains capacity on
    /// its own account.
    fn capacity_for(bucket_count: usize) -> usize {
        match Self::MAX_COUNT {
            MaxCount::Unbounded => usize::MAX,
            MaxCount::Bounded(max_count) => {
                let (num, den) = Self::LOAD_RATIO;
                (bucket_count * max_count * num) / den
            }
        }
    }

    /// Growth shift applied when the hash table's capacity is exceeded
    /// (spec §4.4): quadruple (shift 2) for low-`max_count` policies while
    /// the bucket array is still small, double (shift 1) otherwise, so
    /// early growth amortizes better for policies with little per-bucket
    /// slack.
    fn growth_shift(bucket_count: usize) -> u32 {
        match Self::MAX_COUNT {
            MaxCount::Bounded(max_count) if max_count <= 4 && bucket_count < 64 => 2,
            _ => 1,
        }
    }
}

/// Returned by [`BucketPolicy::add`] when the bucket could not accept the
/// item. Carries the item back so the caller can try elsewhere.
pub struct AddRejected<T>(pub T);
