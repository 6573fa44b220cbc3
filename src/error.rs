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

//! Crate-wide error type

use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// Identifies the secondary index that rejected a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexName(pub String);

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Error {
    /// the allocator could not satisfy an allocation request
    OutOfMemory,
    /// a dynamic column list could not find a valid perfect-hash assignment
    /// within the configured `code_param` search bound
    TooManyCollisions,
    /// a mutation would have left two rows with equal keys in a unique index
    UniqueIndexViolation {
        index: IndexName,
        /// opaque identity of the row already holding the conflicting key
        existing_raw: usize,
    },
    /// a row-reference, selection iterator, or row-bounds was used after the
    /// table's remove-version moved past the value captured at creation
    VersionCheckFailed,
    /// a checkable precondition on a public API was violated
    InvalidArgument(&'static str),
    /// an invariant the implementation assumed was preserved was broken;
    /// this indicates a bug, not a recoverable runtime condition
    AssertionFailure(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::TooManyCollisions => {
                write!(f, "exhausted code_param search space building column list")
            }
            Self::UniqueIndexViolation { index, existing_raw } => write!(
                f,
                "unique index violation on index `{index}` (conflicts with row {existing_raw:#x})"
            ),
            Self::VersionCheckFailed => write!(f, "stale row-reference or iterator"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::AssertionFailure(msg) => write!(f, "assertion failure: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
