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

//! Owning and borrowed row handles (spec §4.7).
//!
//! A [`Row`] is a buffer a table has allocated and initialized but not
//! (yet) inserted. Dropping one without inserting it runs every column's
//! destructor and prepends the (now-empty) buffer onto the table's
//! free-raws list (spec §5) rather than returning it to the allocator —
//! the next `new_row` call drains that list before reaching for the pool.
//!
//! A [`RowReference`] points at a row that already lives in the table.
//! Every access re-checks a version token captured at creation against the
//! table's live remove-version counter (spec §7). It does this with raw
//! pointers rather than a borrow of the table (spec §4.7: "carries the
//! column list pointer, the raw buffer pointer, and a version token") —
//! a borrow would make the version check unreachable, since the borrow
//! checker would already refuse to compile any `&mut` table operation
//! performed while the reference is alive, which is exactly the situation
//! the check exists to catch. The cost is the usual one for raw pointers:
//! a `RowReference` must not be used once the `DataTable` it points into
//! has been dropped or moved.

use crate::data::column::Column;
use crate::data::column_list::ColumnList;
use crate::error::{Error, Result};
use crate::mem::pool::ChunkHeader;
use core::ptr::NonNull;
use parking_lot::Mutex;
use std::sync::Arc;

/// A raw buffer together with the chunk header its owning pool needs to
/// free it, threaded onto the table's free-raws list.
pub(crate) type FreeRaw = (NonNull<u8>, NonNull<ChunkHeader>);

pub(crate) type FreeRawsList = Arc<Mutex<Vec<FreeRaw>>>;

/// An allocated, initialized row not yet part of any table.
pub struct Row {
    raw: NonNull<u8>,
    chunk: NonNull<ChunkHeader>,
    column_list: Arc<ColumnList>,
    free_raws: FreeRawsList,
    /// set once the row has been handed to `DataTable::add_row`/`insert_row`
    /// and ownership of `raw`/`chunk` has moved into the table's storage;
    /// `Drop` is then a no-op.
    consumed: bool,
}

// `raw`/`chunk` are exclusively owned by this `Row` until `into_raw_parts`
// is called; nothing here is thread-affine.
unsafe impl Send for Row {}

impl Row {
    pub(crate) fn new(raw: NonNull<u8>, chunk: NonNull<ChunkHeader>, column_list: Arc<ColumnList>, free_raws: FreeRawsList) -> Self {
        Self { raw, chunk, column_list, free_raws, consumed: false }
    }

    pub fn get<Tag, Item>(&self, col: Column<Tag, Item>) -> &Item {
        let offset = self.column_list.get_offset(col);
        unsafe { &*(self.raw.as_ptr().add(offset) as *const Item) }
    }

    pub fn get_mut<Tag, Item>(&mut self, col: Column<Tag, Item>) -> &mut Item {
        let offset = self.column_list.get_offset(col);
        unsafe { &mut *(self.raw.as_ptr().add(offset) as *mut Item) }
    }

    pub fn set<Tag, Item>(&mut self, col: Column<Tag, Item>, value: Item) {
        *self.get_mut(col) = value;
    }

    /// Hands the raw buffer to the table storage layer that is about to
    /// take ownership of it. After this call the `Row` no longer owns
    /// `raw`/`chunk` and its `Drop` impl does nothing.
    pub(crate) fn into_raw_parts(mut self) -> FreeRaw {
        self.consumed = true;
        (self.raw, self.chunk)
    }

    pub(crate) fn column_list(&self) -> &Arc<ColumnList> {
        &self.column_list
    }

    /// Read-only raw pointer into this row's bytes, for the table's own
    /// book-keeping (setting the row number, indexing, column-by-column
    /// projection) that needs to operate by byte offset rather than
    /// through a typed `Column`.
    pub(crate) fn raw_ptr(&self) -> NonNull<u8> {
        self.raw
    }
}

impl Drop for Row {
    fn drop(&mut self) {
        if self.consumed {
            return;
        }
        unsafe {
            self.column_list.destroy_raw(self.raw.as_ptr());
        }
        self.free_raws.lock().push((self.raw, self.chunk));
    }
}

/// A version token captured when a reference into the table is created.
/// `DataTable` bumps its own counter on every `remove`/`update`; a
/// reference created before that bump is stale and every access on it
/// fails with [`Error::VersionCheckFailed`] (spec §7), except through the
/// mutable-column fast path the table itself uses internally, which
/// bypasses this check by construction (it never goes through a
/// `RowReference`).
///
/// Carries raw pointers rather than borrows (see the module doc comment):
/// valid only as long as the originating `DataTable` is still alive and
/// hasn't moved. Use-after-free past that point is the caller's
/// responsibility, exactly as in the momo original this mirrors.
#[derive(Clone, Copy)]
pub struct RowReference {
    raw: NonNull<u8>,
    column_list: *const ColumnList,
    captured_remove_version: u64,
    live_remove_version: *const u64,
    check_enabled: bool,
}

impl RowReference {
    pub(crate) fn new(
        raw: NonNull<u8>,
        column_list: *const ColumnList,
        captured_remove_version: u64,
        live_remove_version: *const u64,
        check_enabled: bool,
    ) -> Self {
        Self { raw, column_list, captured_remove_version, live_remove_version, check_enabled }
    }

    fn check(&self) -> Result<()> {
        if self.check_enabled && unsafe { *self.live_remove_version } != self.captured_remove_version {
            return Err(Error::VersionCheckFailed);
        }
        Ok(())
    }

    pub fn get<Tag, Item>(&self, col: Column<Tag, Item>) -> Result<&Item> {
        self.check()?;
        let offset = unsafe { (*self.column_list).get_offset(col) };
        Ok(unsafe { &*(self.raw.as_ptr().add(offset) as *const Item) })
    }

    /// Version-checked raw pointer, for the table's own operations
    /// (`remove_row` by reference, the optimized column-update path) that
    /// need the underlying row identity rather than a single column.
    pub(crate) fn checked_raw(&self) -> Result<NonNull<u8>> {
        self.check()?;
        Ok(self.raw)
    }
}

/// A `RowReference` that additionally permits writes to columns the
/// table's column list has marked mutable (spec §4.6's mutability
/// bitmap). Writing through a mutable column intentionally does **not**
/// re-check the version: spec §7 carves this out as the one path allowed
/// to bypass the stale-reference check, since the table's own
/// update-in-place optimization goes through exactly this route.
pub struct RowReferenceMut {
    raw: NonNull<u8>,
    column_list: *const ColumnList,
    captured_remove_version: u64,
    live_remove_version: *const u64,
    check_enabled: bool,
}

impl RowReferenceMut {
    pub(crate) fn new(
        raw: NonNull<u8>,
        column_list: *const ColumnList,
        captured_remove_version: u64,
        live_remove_version: *const u64,
        check_enabled: bool,
    ) -> Self {
        Self { raw, column_list, captured_remove_version, live_remove_version, check_enabled }
    }

    fn check(&self) -> Result<()> {
        if self.check_enabled && unsafe { *self.live_remove_version } != self.captured_remove_version {
            return Err(Error::VersionCheckFailed);
        }
        Ok(())
    }

    pub fn get<Tag, Item>(&self, col: Column<Tag, Item>) -> Result<&Item> {
        self.check()?;
        let offset = unsafe { (*self.column_list).get_offset(col) };
        Ok(unsafe { &*(self.raw.as_ptr().add(offset) as *const Item) })
    }

    /// Writes a column the column list has marked mutable, bypassing the
    /// version check (spec §7).
    pub fn set_mutable<Tag, Item>(&mut self, col: Column<Tag, Item>, value: Item) {
        let offset = unsafe { (*self.column_list).get_offset(col) };
        debug_assert!(unsafe { (*self.column_list).is_mutable(offset) }, "column not registered as mutable");
        unsafe {
            *(self.raw.as_ptr().add(offset) as *mut Item) = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::column_list::ColumnSpec;
    use crate::settings::Settings;

    struct IdTag;

    fn make_column_list() -> Arc<ColumnList> {
        let id: Column<IdTag, u64> = Column::from_name("id");
        Arc::new(ColumnList::new(vec![ColumnSpec::new(id)], &Settings::default(), true).unwrap())
    }

    fn alloc_raw(list: &ColumnList) -> NonNull<u8> {
        let layout = std::alloc::Layout::from_size_align(list.total_size(), list.alignment()).unwrap();
        unsafe {
            let ptr = std::alloc::alloc(layout);
            list.create_raw(ptr);
            NonNull::new(ptr).unwrap()
        }
    }

    #[test]
    fn row_get_set_round_trip() {
        let list = make_column_list();
        let id: Column<IdTag, u64> = Column::from_name("id");
        let raw = alloc_raw(&list);
        let chunk_layout = std::alloc::Layout::new::<ChunkHeader>();
        let chunk = NonNull::new(chunk_layout.size() as *mut ChunkHeader).unwrap(); // never dereferenced in this test
        let free_raws: FreeRawsList = Arc::new(Mutex::new(Vec::new()));
        let mut row = Row::new(raw, chunk, Arc::clone(&list), free_raws);
        row.set(id, 42);
        assert_eq!(*row.get(id), 42);
        let (raw, _chunk) = row.into_raw_parts();
        unsafe {
            list.destroy_raw(raw.as_ptr());
            std::alloc::dealloc(raw.as_ptr(), std::alloc::Layout::from_size_align(list.total_size(), list.alignment()).unwrap());
        }
    }

    #[test]
    fn dropping_an_unconsumed_row_pushes_onto_free_raws() {
        let list = make_column_list();
        let raw = alloc_raw(&list);
        let chunk = NonNull::new(8 as *mut ChunkHeader).unwrap();
        let free_raws: FreeRawsList = Arc::new(Mutex::new(Vec::new()));
        {
            let _row = Row::new(raw, chunk, Arc::clone(&list), Arc::clone(&free_raws));
        }
        assert_eq!(free_raws.lock().len(), 1);
        let (raw, _) = free_raws.lock().pop().unwrap();
        unsafe {
            std::alloc::dealloc(raw.as_ptr(), std::alloc::Layout::from_size_align(list.total_size(), list.alignment()).unwrap());
        }
    }

    #[test]
    fn stale_version_fails_the_check() {
        let list = make_column_list();
        let id: Column<IdTag, u64> = Column::from_name("id");
        let raw = alloc_raw(&list);
        let live_version = 5u64;
        let reference = RowReference::new(raw, &*list as *const ColumnList, 4, &live_version as *const u64, true);
        assert_eq!(reference.get(id).unwrap_err(), Error::VersionCheckFailed);
        unsafe {
            list.destroy_raw(raw.as_ptr());
            std::alloc::dealloc(raw.as_ptr(), std::alloc::Layout::from_size_align(list.total_size(), list.alignment()).unwrap());
        }
    }
}
