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

//! `max_count ≤ 16` (spec §4.3 "Lim4"). The original keeps its bucket
//! header to 4 bytes by storing a 32-bit pointer relative to the owning
//! pool's base address; that trick exists purely to shrink `sizeof(Bucket)`
//! on 64-bit hosts and has no effect on behavior, so it is not replicated
//! here — this is the same pool-of-size-classes scheme as `LimP4`/`LimP`
//! with a 16-item ceiling.

use crate::bucket::pooled::{PooledBucket, PooledParams};

pub const MAX_COUNT: usize = 16;

pub type Lim4<T> = PooledBucket<T, MAX_COUNT>;
pub type Lim4Params<T> = PooledParams<T, MAX_COUNT>;
