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

//! `max_count ∈ {1..4}`, one of four size-class pools, per-slot short
//! hashes for `hash_code_part` (spec §4.3 "LimP4"). See
//! `crate::bucket::pooled` for the shared implementation.

use crate::bucket::pooled::{PooledBucket, PooledParams};

pub type LimP4<T> = PooledBucket<T, 4>;
pub type LimP4Params<T> = PooledParams<T, 4>;
