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

//! A small FNV-1a [`Hasher`] used internally by the hash containers
//! (`hashtable`, `hashmap`) to turn an item's `Hash` impl into the 64-bit
//! hash code the bucket policies and probe sequence operate on. `momo`'s
//! tables are never fed attacker-controlled keys over a network boundary
//! the way a server index would be, so there is no call for a DoS-resistant
//! hasher here; this reuses the same FNV-1a constants `data::column` uses
//! for column codes rather than pulling in a hashing crate (no such crate
//! appears anywhere in the teacher's dependency tree either).

use core::hash::{Hash, Hasher};

const FNV_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

pub struct FnvHasher(u64);

impl Default for FnvHasher {
    fn default() -> Self {
        FnvHasher(FNV_BASIS)
    }
}

impl Hasher for FnvHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 ^ b as u64).wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Hashes a single value through a fresh [`FnvHasher`]. The hash containers
/// call this on both a stored item and, via `Borrow`, on a bare lookup key —
/// the two agree exactly when the item's `Hash` impl writes the same bytes
/// its key component would (the same contract `std`'s `Borrow`-based map
/// lookups rely on).
pub fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FnvHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_value_hashes_equal() {
        assert_eq!(hash_one(&"alice"), hash_one(&"alice"));
    }

    #[test]
    fn different_values_usually_differ() {
        assert_ne!(hash_one(&1u64), hash_one(&2u64));
    }
}
