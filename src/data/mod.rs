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

//! The data-table stack (spec §4.6-§4.9): a column-oriented row layout, the
//! owning/borrowed row handles built on top of it, the secondary-index
//! machinery that keeps itself synchronized with row mutation, and the
//! table that ties all of it together.

pub mod column;
pub mod column_list;
pub mod index;
pub mod row;
pub mod table;

pub use column::Column;
pub use column_list::{ColumnList, ColumnListStatic, ColumnSpec};
pub use index::{eq, EqPredicate, IndexColumn, IndexHandle, MultiHashIndex, UniqueHashIndex};
pub use row::{Row, RowReference, RowReferenceMut};
pub use table::{ColumnProjector, DataTable, Selection, TryResult};
