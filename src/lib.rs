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

//! `momo`: generic in-memory hash containers (hash set, hash map, hash
//! multi-map) and a column-oriented in-memory data table with secondary
//! indexes built on top of them.
//!
//! The hash containers (`hashset`, `hashmap`, `hashtable`) are generic over
//! a [`bucket::BucketPolicy`] — the strategy used to store the small
//! cluster of items sharing a hash-table slot. The data table
//! (`data::table`) layers on top: a column list computes a perfect-hash
//! row layout, rows live in a size-matched memory pool, and secondary
//! indexes are themselves hash sets/maps over raw row pointers.

pub mod bucket;
pub mod data;
pub mod error;
mod hash;
pub mod hashmap;
pub mod hashset;
pub mod hashtable;
pub mod mem;
pub mod settings;

pub use data::{
    eq, Column, ColumnList, ColumnListStatic, ColumnProjector, ColumnSpec, DataTable, EqPredicate, IndexColumn,
    MultiHashIndex, Row, RowReference, RowReferenceMut, Selection, TryResult, UniqueHashIndex,
};
pub use error::{Error, IndexName, Result};
pub use hashmap::{HashMap, HashMultiMap};
pub use hashset::HashSet;
pub use settings::Settings;
