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

//! Tunable constants shared by the memory pools, hash containers and the
//! data table's column-list / select machinery.

/// Default number of blocks carved out of a single chunk allocation by a
/// [`crate::mem::pool::MemPool`].
pub const DEFAULT_POOL_BLOCK_COUNT: usize = 32;

/// Default number of freed blocks a pool keeps cached before actually
/// releasing a fully-empty chunk back to the allocator.
pub const DEFAULT_POOL_CACHED_FREE_BLOCK_COUNT: usize = 16;

/// Number of bits in a dynamic [`crate::data::column_list::ColumnList`]'s
/// perfect-hash vertex space (`vertex_count = 1 << LOG_VERTEX_COUNT`).
pub const LOG_VERTEX_COUNT: u32 = 8;

/// Upper bound on the `code_param` salt a dynamic column list will try
/// before giving up with [`crate::Error::TooManyCollisions`].
pub const MAX_CODE_PARAM: u8 = 255;

/// Threshold past which `DataTable::select`'s excess equality predicates are
/// folded into the row-filter closure instead of participating in index
/// selection (see spec §4.9 "Select" step 2).
pub const SELECT_EQUALER_MAX_COUNT: usize = 4;

/// Runtime-overridable knobs. A crate consumer who is happy with the
/// defaults above never needs to construct this directly; every
/// constructor that accepts one also has a `Default`-using convenience
/// form.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub pool_block_count_per_chunk: usize,
    pub pool_cached_free_block_count: usize,
    /// gate the version check described in spec §4.7/§7; disabling this is
    /// only safe once correctness has been established by other means
    pub check_iterator_version: bool,
    pub max_code_param: u8,
    pub log_vertex_count: u32,
    pub select_equaler_max_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pool_block_count_per_chunk: DEFAULT_POOL_BLOCK_COUNT,
            pool_cached_free_block_count: DEFAULT_POOL_CACHED_FREE_BLOCK_COUNT,
            check_iterator_version: true,
            max_code_param: MAX_CODE_PARAM,
            log_vertex_count: LOG_VERTEX_COUNT,
            select_equaler_max_count: SELECT_EQUALER_MAX_COUNT,
        }
    }
}
