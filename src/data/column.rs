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

//! Column declaration (spec §4.6, §6). A column is a compile-time pairing
//! of a user tag type with an item type, represented at runtime by a
//! 64-bit code. The tag makes two columns with the same code but different
//! tags distinct at the type level — there's no runtime tag to compare.

use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

const FNV_BASIS_64: u64 = 0xcbf29ce484222325;
const FNV_PRIME_64: u64 = 0x100000001b3;

/// `StrHasher::GetHashCode64` in the original (`DataColumn.h`): FNV-1a,
/// folding the name's bytes from the **last** byte to the first. This byte
/// order is part of the column-code contract, not an implementation
/// accident — two builds of the same column list must agree on the same
/// codes for the same names.
pub fn column_code_for_name(name: &str) -> u64 {
    let mut hash = FNV_BASIS_64;
    for &byte in name.as_bytes().iter().rev() {
        hash = (hash ^ byte as u64).wrapping_mul(FNV_PRIME_64);
    }
    hash
}

/// A column identifier: `Tag` ties it to a single declaration site at the
/// type level, `Item` is the stored value's type. Copy because it's just a
/// 64-bit code plus zero-sized markers.
pub struct Column<Tag, Item> {
    code: u64,
    _marker: PhantomData<fn() -> (Tag, Item)>,
}

impl<Tag, Item> Column<Tag, Item> {
    pub fn from_name(name: &str) -> Self {
        Self { code: column_code_for_name(name), _marker: PhantomData }
    }

    pub fn from_code(code: u64) -> Self {
        Self { code, _marker: PhantomData }
    }

    pub fn code(&self) -> u64 {
        self.code
    }
}

impl<Tag, Item> Clone for Column<Tag, Item> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tag, Item> Copy for Column<Tag, Item> {}

// Two columns are equal iff their tags and codes match (spec §6): the tag
// match is enforced by the type checker (a `Column<A, _>` simply cannot be
// compared to a `Column<B, _>`), so only the code needs comparing here.
impl<Tag, Item> PartialEq for Column<Tag, Item> {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl<Tag, Item> Eq for Column<Tag, Item> {}

impl<Tag, Item> Hash for Column<Tag, Item> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_name_hashes_to_a_pinned_code() {
        // Pins the reversed-byte-order FNV-1a contract: if this ever
        // changes, every `ColumnList` built from persisted column names
        // changes its layout underneath existing data.
        assert_eq!(column_code_for_name(""), FNV_BASIS_64);
        let forward = {
            let mut hash = FNV_BASIS_64;
            for &byte in "id".as_bytes() {
                hash = (hash ^ byte as u64).wrapping_mul(FNV_PRIME_64);
            }
            hash
        };
        let reversed = column_code_for_name("id");
        // "id" is two distinct bytes, so folding in reverse byte order
        // must disagree with folding forwards.
        assert_ne!(forward, reversed);
    }

    #[test]
    fn same_name_always_hashes_the_same() {
        assert_eq!(column_code_for_name("amount"), column_code_for_name("amount"));
    }

    struct Tag;

    #[test]
    fn columns_compare_by_code() {
        let a: Column<Tag, u32> = Column::from_name("x");
        let b: Column<Tag, u32> = Column::from_name("x");
        let c: Column<Tag, u32> = Column::from_name("y");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
