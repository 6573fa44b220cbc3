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

//! `max_count` up to 15 (spec §4.3 "LimP family"). The original splits this
//! into `LimP` (external pointer tag) and `LimP1` (size packed into the
//! slab header byte) purely to squeeze the bucket header down in C++; both
//! variants have identical observable behavior, so this crate has one
//! `LimP<T>` for both, backed by the same pool-of-size-classes scheme as
//! [`crate::bucket::lim_p4::LimP4`].

use crate::bucket::pooled::{PooledBucket, PooledParams};

pub const MAX_COUNT: usize = 15;

pub type LimP<T> = PooledBucket<T, MAX_COUNT>;
pub type LimPParams<T> = PooledParams<T, MAX_COUNT>;
