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

//! The data table (spec §4.9): owns a column list, a size-matched row
//! pool, the row vector, and a [`DataIndexSet`]. Everything below this
//! point in the module graph (column list, row handles, index set) is
//! mechanism; this is the one place that wires all of it into the
//! add/remove/update/select/project operations a caller actually calls.

use crate::data::column::Column;
use crate::data::column_list::{clone_into, destroy_in_place, ColumnList, ColumnSpec};
use crate::data::index::{DataIndexSet, EqPredicate, IndexColumn, MultiHashIndex, UniqueHashIndex};
use crate::data::row::{FreeRawsList, Row, RowReference, RowReferenceMut};
use crate::error::{Error, IndexName, Result};
use crate::mem::pool::{ChunkHeader, MemPool, PoolParams};
use crate::settings::Settings;
use core::hash::{Hash, Hasher};
use core::ptr::NonNull;
use parking_lot::Mutex;
use std::sync::Arc;

/// One live row: its storage plus the chunk header its pool needs to
/// reclaim it.
type RowSlot = (NonNull<u8>, NonNull<ChunkHeader>);

/// The outcome of `try_add_row`/`try_insert_row`/`try_update_row` (spec
/// §4.9, §6): `violated_index` is `None` on success, in which case
/// `row_ref` points at the row that was just added. When a unique index
/// rejects the mutation, `violated_index` names it and `row_ref` instead
/// points at the row that already holds the conflicting key, so a caller
/// can inspect it without a second lookup.
pub struct TryResult {
    pub row_ref: RowReference,
    pub violated_index: Option<IndexName>,
}

/// A materialized set of row references, returned by [`DataTable::select`].
/// Collected eagerly rather than streamed: spec §4.9 describes select as
/// producing "the matching rows", and every reference it hands out shares
/// the version token live at the moment of the call.
pub struct Selection {
    rows: Vec<RowReference>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowReference> {
        self.rows.iter()
    }
}

impl IntoIterator for Selection {
    type Item = RowReference;
    type IntoIter = std::vec::IntoIter<RowReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Describes one column a `project`/`project_distinct` call carries over
/// into the projected table: where to read it in the source row, how to
/// build it into the projected column list, and how to clone/destroy it
/// without the static `Item` type the projected table no longer has at
/// hand by the time rows are being copied.
pub struct ColumnProjector {
    spec: ColumnSpec,
    old_offset: usize,
    code: u64,
    copy: unsafe fn(*const u8, *mut u8),
    destroy: unsafe fn(*mut u8),
    hash: unsafe fn(*const u8, &mut dyn Hasher),
    eq: unsafe fn(*const u8, *const u8) -> bool,
}

impl ColumnProjector {
    pub fn new<Tag, Item: Default + Clone + Hash + Eq>(column_list: &ColumnList, col: Column<Tag, Item>) -> Self {
        Self {
            old_offset: column_list.get_offset(col),
            code: col.code(),
            copy: clone_into::<Item>,
            destroy: destroy_in_place::<Item>,
            hash: crate::data::index::hash_at::<Item>,
            eq: crate::data::index::eq_at::<Item>,
            spec: ColumnSpec::new(col),
        }
    }
}

/// The data table (spec §4.9). Rows are allocated from a [`MemPool`] sized
/// to exactly one row (`column_list.total_size()`/`alignment()`); the row
/// vector holds `(raw, chunk)` pairs in row-number order, and a
/// [`DataIndexSet`] mirrors every insert/remove/update through whichever
/// secondary indexes have been registered.
pub struct DataTable {
    column_list: Arc<ColumnList>,
    pool: MemPool,
    rows: Vec<RowSlot>,
    indexes: DataIndexSet,
    free_raws: FreeRawsList,
    change_version: u64,
    remove_version: u64,
    settings: Settings,
}

impl DataTable {
    /// Builds the column list from `columns` (with row numbering enabled —
    /// the table always needs it to keep `remove_row`'s O(1) swap-remove
    /// variant correct) and a row pool sized to match.
    pub fn new(columns: Vec<ColumnSpec>, settings: Settings) -> Result<Self> {
        let column_list = ColumnList::new(columns, &settings, true)?;
        Ok(Self::from_column_list(column_list, settings))
    }

    pub fn from_column_list(column_list: ColumnList, settings: Settings) -> Self {
        let pool_params = PoolParams::with_settings(column_list.total_size(), column_list.alignment(), &settings);
        Self {
            column_list: Arc::new(column_list),
            pool: MemPool::new(pool_params),
            rows: Vec::new(),
            indexes: DataIndexSet::default(),
            free_raws: Arc::new(Mutex::new(Vec::new())),
            change_version: 0,
            remove_version: 0,
            settings,
        }
    }

    pub fn column_list(&self) -> &ColumnList {
        &self.column_list
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn change_version(&self) -> u64 {
        self.change_version
    }

    pub fn remove_version(&self) -> u64 {
        self.remove_version
    }

    pub fn row(&self, n: usize) -> Result<RowReference> {
        self.rows.get(n).map(|&(raw, _)| self.reference_for_raw(raw)).ok_or(Error::InvalidArgument("row index out of bounds"))
    }

    pub fn row_mut(&self, n: usize) -> Result<RowReferenceMut> {
        let &(raw, _) = self.rows.get(n).ok_or(Error::InvalidArgument("row index out of bounds"))?;
        Ok(RowReferenceMut::new(
            raw,
            Arc::as_ptr(&self.column_list),
            self.remove_version,
            &self.remove_version as *const u64,
            self.settings.check_iterator_version,
        ))
    }

    pub fn iter(&self) -> impl Iterator<Item = RowReference> + '_ {
        self.rows.iter().map(move |&(raw, _)| self.reference_for_raw(raw))
    }

    fn reference_for_raw(&self, raw: NonNull<u8>) -> RowReference {
        RowReference::new(
            raw,
            Arc::as_ptr(&self.column_list),
            self.remove_version,
            &self.remove_version as *const u64,
            self.settings.check_iterator_version,
        )
    }

    fn position_of(&self, raw: NonNull<u8>) -> Result<usize> {
        if self.column_list.has_row_number() {
            let n = unsafe { self.column_list.get_row_number(raw.as_ptr()) };
            if n < self.rows.len() && self.rows[n].0 == raw {
                return Ok(n);
            }
        }
        self.rows.iter().position(|&(r, _)| r == raw).ok_or(Error::InvalidArgument("row not found in this table"))
    }

    fn set_row_number(&self, raw: NonNull<u8>, n: usize) {
        if self.column_list.has_row_number() {
            unsafe {
                self.column_list.set_row_number(raw.as_ptr(), n);
            }
        }
    }

    fn renumber_from(&self, start: usize) {
        if !self.column_list.has_row_number() {
            return;
        }
        for (i, &(raw, _)) in self.rows.iter().enumerate().skip(start) {
            unsafe {
                self.column_list.set_row_number(raw.as_ptr(), i);
            }
        }
    }

    /// Drains the free-raws list (spec §5): buffers dropped rows pushed
    /// there (already destructed, uninitialized) get handed straight back
    /// to the pool's free list before `new_row` tries the pool itself.
    fn drain_free_raws(&mut self) {
        let drained: Vec<_> = std::mem::take(&mut *self.free_raws.lock());
        for (raw, chunk) in drained {
            unsafe {
                self.pool.deallocate(raw, chunk);
            }
        }
    }

    /// Allocates and default-constructs a new row, not yet part of the
    /// table. Use [`Row::set`] to fill in columns, then [`Self::add_row`]
    /// (or [`Self::try_add_row`]) to insert it.
    pub fn new_row(&mut self) -> Result<Row> {
        self.drain_free_raws();
        let (raw, chunk) = self.pool.allocate()?;
        unsafe {
            self.column_list.create_raw(raw.as_ptr());
        }
        Ok(Row::new(raw, chunk, Arc::clone(&self.column_list), Arc::clone(&self.free_raws)))
    }

    /// Convenience form of [`Self::new_row`] that applies `f` to the row
    /// before returning it — the closure-based stand-in for the named
    /// per-field assigners spec §4.9 describes, since Rust has no named
    /// arguments to assign through.
    pub fn new_row_with(&mut self, f: impl FnOnce(&mut Row)) -> Result<Row> {
        let mut row = self.new_row()?;
        f(&mut row);
        Ok(row)
    }

    /// Non-throwing add (spec §4.9 "Add row"). Always consumes `row`; on a
    /// unique-index violation its buffer is torn down and returned to the
    /// pool rather than inserted.
    pub fn try_add_row(&mut self, row: Row) -> TryResult {
        let (raw, chunk) = row.into_raw_parts();
        match self.indexes.add_raw(raw) {
            Ok(()) => {
                let row_number = self.rows.len();
                self.set_row_number(raw, row_number);
                self.rows.push((raw, chunk));
                self.change_version += 1;
                TryResult { row_ref: self.reference_for_raw(raw), violated_index: None }
            }
            Err(Error::UniqueIndexViolation { index, existing_raw }) => {
                log::warn!("data::table: unique index `{index}` rejected add_row");
                unsafe {
                    self.column_list.destroy_raw(raw.as_ptr());
                    self.pool.deallocate(raw, chunk);
                }
                let existing = NonNull::new(existing_raw as *mut u8).expect("existing_raw is never null");
                TryResult { row_ref: self.reference_for_raw(existing), violated_index: Some(index) }
            }
            Err(e) => unreachable!("DataIndexSet::add_raw only ever returns UniqueIndexViolation: {e:?}"),
        }
    }

    /// `try_add_row` plus throw-on-violation (spec §4.9).
    pub fn add_row(&mut self, row: Row) -> Result<RowReference> {
        let result = self.try_add_row(row);
        match result.violated_index {
            None => Ok(result.row_ref),
            Some(index) => {
                let existing_raw = result.row_ref.checked_raw().expect("just-constructed reference").as_ptr() as usize;
                Err(Error::UniqueIndexViolation { index, existing_raw })
            }
        }
    }

    pub fn try_insert_row(&mut self, n: usize, row: Row) -> Result<TryResult> {
        if n > self.rows.len() {
            return Err(Error::InvalidArgument("insert position beyond row count"));
        }
        let (raw, chunk) = row.into_raw_parts();
        match self.indexes.add_raw(raw) {
            Ok(()) => {
                self.rows.insert(n, (raw, chunk));
                self.renumber_from(n);
                self.change_version += 1;
                Ok(TryResult { row_ref: self.reference_for_raw(raw), violated_index: None })
            }
            Err(Error::UniqueIndexViolation { index, existing_raw }) => {
                unsafe {
                    self.column_list.destroy_raw(raw.as_ptr());
                    self.pool.deallocate(raw, chunk);
                }
                let existing = NonNull::new(existing_raw as *mut u8).expect("existing_raw is never null");
                Ok(TryResult { row_ref: self.reference_for_raw(existing), violated_index: Some(index) })
            }
            Err(e) => Err(e),
        }
    }

    pub fn insert_row(&mut self, n: usize, row: Row) -> Result<RowReference> {
        let result = self.try_insert_row(n, row)?;
        match result.violated_index {
            None => Ok(result.row_ref),
            Some(index) => {
                let existing_raw = result.row_ref.checked_raw().expect("just-constructed reference").as_ptr() as usize;
                Err(Error::UniqueIndexViolation { index, existing_raw })
            }
        }
    }

    /// Removes the row at `n`. `keep_order = true` shifts every following
    /// row down by one and renumbers it (O(n)); `keep_order = false`
    /// swaps the last row into `n`'s place (O(1)).
    pub fn remove_row(&mut self, n: usize, keep_order: bool) -> Result<()> {
        if n >= self.rows.len() {
            return Err(Error::InvalidArgument("row index out of bounds"));
        }
        let (raw, chunk) = if keep_order {
            let removed = self.rows.remove(n);
            self.renumber_from(n);
            removed
        } else {
            let removed = self.rows.swap_remove(n);
            if n < self.rows.len() {
                self.set_row_number(self.rows[n].0, n);
            }
            removed
        };
        self.indexes.remove_raw(raw);
        self.change_version += 1;
        self.remove_version += 1;
        unsafe {
            self.column_list.destroy_raw(raw.as_ptr());
            self.pool.deallocate(raw, chunk);
        }
        Ok(())
    }

    /// Removes the row a reference points at (keeping relative order of
    /// the rest), re-checking the reference's version token first.
    pub fn remove_row_ref(&mut self, row_ref: &RowReference) -> Result<()> {
        let raw = row_ref.checked_raw()?;
        let n = self.position_of(raw)?;
        self.remove_row(n, true)
    }

    /// Removes the row at `n` from the table and hands it back as an
    /// owned [`Row`] instead of destroying it — the counterpart to
    /// [`Self::insert_row`] for callers that want to relocate a row
    /// without paying for a destroy-then-reconstruct round trip.
    pub fn extract_row(&mut self, n: usize) -> Result<Row> {
        if n >= self.rows.len() {
            return Err(Error::InvalidArgument("row index out of bounds"));
        }
        let (raw, chunk) = self.rows.remove(n);
        self.renumber_from(n);
        self.indexes.remove_raw(raw);
        self.change_version += 1;
        self.remove_version += 1;
        Ok(Row::new(raw, chunk, Arc::clone(&self.column_list), Arc::clone(&self.free_raws)))
    }

    /// Wholesale row replacement (spec §4.9 "Update row"): the new row is
    /// added first, then the old one removed, so a unique-index violation
    /// leaves the table exactly as it was.
    pub fn try_update_row(&mut self, n: usize, row: Row) -> Result<TryResult> {
        if n >= self.rows.len() {
            return Err(Error::InvalidArgument("row index out of bounds"));
        }
        let (old_raw, old_chunk) = self.rows[n];
        let (new_raw, new_chunk) = row.into_raw_parts();
        match self.indexes.add_raw(new_raw) {
            Ok(()) => {
                self.indexes.remove_raw(old_raw);
                unsafe {
                    self.column_list.destroy_raw(old_raw.as_ptr());
                    self.pool.deallocate(old_raw, old_chunk);
                }
                self.set_row_number(new_raw, n);
                self.rows[n] = (new_raw, new_chunk);
                self.change_version += 1;
                self.remove_version += 1;
                Ok(TryResult { row_ref: self.reference_for_raw(new_raw), violated_index: None })
            }
            Err(Error::UniqueIndexViolation { index, existing_raw }) => {
                unsafe {
                    self.column_list.destroy_raw(new_raw.as_ptr());
                    self.pool.deallocate(new_raw, new_chunk);
                }
                let existing = NonNull::new(existing_raw as *mut u8).expect("existing_raw is never null");
                Ok(TryResult { row_ref: self.reference_for_raw(existing), violated_index: Some(index) })
            }
            Err(e) => Err(e),
        }
    }

    pub fn update_row(&mut self, n: usize, row: Row) -> Result<RowReference> {
        let result = self.try_update_row(n, row)?;
        match result.violated_index {
            None => Ok(result.row_ref),
            Some(index) => {
                let existing_raw = result.row_ref.checked_raw().expect("just-constructed reference").as_ptr() as usize;
                Err(Error::UniqueIndexViolation { index, existing_raw })
            }
        }
    }

    /// In-place single-column update (spec §4.8/§4.9's optimized path):
    /// only the indexes that actually key on `col` are touched, through
    /// [`DataIndexSet::update_column`]'s prepare-before-assign protocol.
    pub fn update_column<Tag, Item: Hash + Eq>(&mut self, row_ref: &RowReference, col: Column<Tag, Item>, value: Item) -> Result<()> {
        let raw = row_ref.checked_raw()?;
        let offset = self.column_list.get_offset(col);
        let raw_ptr = raw.as_ptr();
        let mut value = core::mem::ManuallyDrop::new(value);
        let new_ptr = (&*value) as *const Item as *const u8;
        let result = self.indexes.update_column(raw, offset, new_ptr, || unsafe {
            core::ptr::drop_in_place(raw_ptr.add(offset) as *mut Item);
            (raw_ptr.add(offset) as *mut Item).write(core::mem::ManuallyDrop::take(&mut value));
        });
        if result.is_err() {
            // `assign` never ran: the value we still own would otherwise leak.
            unsafe {
                core::mem::ManuallyDrop::drop(&mut value);
            }
        }
        result?;
        self.change_version += 1;
        Ok(())
    }

    /// Re-orders the row vector according to `order` (`order[i]` is the
    /// current index of the row that should end up at position `i`) and
    /// renumbers every row to match.
    pub fn assign_rows(&mut self, order: &[usize]) -> Result<()> {
        if order.len() != self.rows.len() {
            return Err(Error::InvalidArgument("assign_rows: permutation length does not match row count"));
        }
        let mut seen = vec![false; self.rows.len()];
        for &idx in order {
            if idx >= self.rows.len() || seen[idx] {
                return Err(Error::InvalidArgument("assign_rows: argument is not a permutation"));
            }
            seen[idx] = true;
        }
        self.rows = order.iter().map(|&i| self.rows[i]).collect();
        self.renumber_from(0);
        self.change_version += 1;
        Ok(())
    }

    /// Removes every row for which `predicate` returns `true`, dropping
    /// each from every registered index before compacting the row vector
    /// in one pass. Returns the number of rows removed.
    pub fn remove_rows(&mut self, predicate: impl Fn(&RowReference) -> bool) -> usize {
        self.batch_remove(predicate)
    }

    /// Keeps every row for which `predicate` returns `true`, removing the
    /// rest — the complement of [`Self::remove_rows`].
    pub fn filter_rows(&mut self, predicate: impl Fn(&RowReference) -> bool) -> usize {
        self.batch_remove(|r| !predicate(r))
    }

    fn batch_remove(&mut self, should_remove: impl Fn(&RowReference) -> bool) -> usize {
        let to_remove: Vec<NonNull<u8>> =
            self.rows.iter().map(|&(raw, _)| raw).filter(|&raw| should_remove(&self.reference_for_raw(raw))).collect();
        if to_remove.is_empty() {
            return 0;
        }
        for &raw in &to_remove {
            self.indexes.remove_raw(raw);
        }
        let marked: std::collections::HashSet<usize> = to_remove.iter().map(|r| r.as_ptr() as usize).collect();
        let removed_count = to_remove.len();
        let mut kept = Vec::with_capacity(self.rows.len() - removed_count);
        for (raw, chunk) in self.rows.drain(..) {
            if marked.contains(&(raw.as_ptr() as usize)) {
                unsafe {
                    self.column_list.destroy_raw(raw.as_ptr());
                    self.pool.deallocate(raw, chunk);
                }
            } else {
                kept.push((raw, chunk));
            }
        }
        self.rows = kept;
        self.renumber_from(0);
        self.change_version += 1;
        self.remove_version += 1;
        removed_count
    }

    pub fn add_unique_hash_index(&mut self, name: impl Into<String>, columns: Vec<IndexColumn>) -> Result<UniqueHashIndex> {
        let slot = self.indexes.add_unique(IndexName(name.into()), columns);
        let raws: Vec<NonNull<u8>> = self.rows.iter().map(|&(r, _)| r).collect();
        self.indexes.bulk_load_unique(slot, raws.into_iter())?;
        Ok(UniqueHashIndex { slot })
    }

    pub fn add_multi_hash_index(&mut self, name: impl Into<String>, columns: Vec<IndexColumn>) -> MultiHashIndex {
        let slot = self.indexes.add_multi(IndexName(name.into()), columns);
        let raws: Vec<NonNull<u8>> = self.rows.iter().map(|&(r, _)| r).collect();
        self.indexes.bulk_load_multi(slot, raws.into_iter());
        MultiHashIndex { slot }
    }

    pub fn remove_unique_indexes(&mut self) {
        self.indexes.remove_unique_indexes();
    }

    pub fn remove_multi_indexes(&mut self) {
        self.indexes.remove_multi_indexes();
    }

    pub fn find_by_unique_hash(&self, handle: &UniqueHashIndex, predicates: &[EqPredicate<'_>]) -> Result<Option<RowReference>> {
        let uh = self.indexes.unique_indexes().get(handle.slot).ok_or(Error::InvalidArgument("stale unique index handle"))?;
        Ok(uh.find(predicates).map(|raw| self.reference_for_raw(raw)))
    }

    pub fn find_by_multi_hash(&self, handle: &MultiHashIndex, predicates: &[EqPredicate<'_>]) -> Result<Vec<RowReference>> {
        let mh = self.indexes.multi_indexes().get(handle.slot).ok_or(Error::InvalidArgument("stale multi index handle"))?;
        Ok(mh.find(predicates).into_iter().map(|raw| self.reference_for_raw(raw)).collect())
    }

    /// Spec §4.9 "Select": prefers an index whose offsets cover the
    /// predicate set over a full scan — a unique index first, then the
    /// multi index with the largest key count among those that qualify,
    /// falling back to scanning every row. Predicates past
    /// `settings.select_equaler_max_count` are folded into `row_filter`
    /// rather than taking part in index selection.
    pub fn select(&self, predicates: &[EqPredicate<'_>], row_filter: Option<&dyn Fn(&RowReference) -> bool>) -> Selection {
        Selection { rows: self.candidate_rows(predicates, row_filter) }
    }

    pub fn select_count(&self, predicates: &[EqPredicate<'_>], row_filter: Option<&dyn Fn(&RowReference) -> bool>) -> usize {
        self.candidate_rows(predicates, row_filter).len()
    }

    fn candidate_rows(
        &self,
        predicates: &[EqPredicate<'_>],
        row_filter: Option<&dyn Fn(&RowReference) -> bool>,
    ) -> Vec<RowReference> {
        if predicates.len() > self.settings.select_equaler_max_count {
            let (used, overflow) = predicates.split_at(self.settings.select_equaler_max_count);
            let combined = move |r: &RowReference| {
                let extra_ok = r
                    .checked_raw()
                    .map(|raw| overflow.iter().all(|p| p.matches_raw(raw.as_ptr())))
                    .unwrap_or(false);
                extra_ok && row_filter.map_or(true, |f| f(r))
            };
            return self.candidate_rows(used, Some(&combined));
        }

        if predicates.is_empty() {
            return self
                .rows
                .iter()
                .map(|&(raw, _)| self.reference_for_raw(raw))
                .filter(|r| row_filter.map_or(true, |f| f(r)))
                .collect();
        }

        let sorted_offsets = crate::data::index::sorted_predicate_offsets(predicates);

        if let Some(uh) = self.indexes.unique_indexes().iter().find(|uh| uh.covers(&sorted_offsets)) {
            let mut out = Vec::new();
            if let Some(raw) = uh.find(predicates) {
                let remaining_ok = predicates
                    .iter()
                    .filter(|p| uh.sorted_offsets().binary_search(&p.offset).is_err())
                    .all(|p| p.matches_raw(raw.as_ptr()));
                let reference = self.reference_for_raw(raw);
                if remaining_ok && row_filter.map_or(true, |f| f(&reference)) {
                    out.push(reference);
                }
            }
            return out;
        }

        if let Some(mh) = self.indexes.multi_indexes().iter().filter(|mh| mh.covers(&sorted_offsets)).max_by_key(|mh| mh.key_count()) {
            return mh
                .find(predicates)
                .into_iter()
                .filter(|raw| {
                    predicates.iter().filter(|p| mh.sorted_offsets().binary_search(&p.offset).is_err()).all(|p| p.matches_raw(raw.as_ptr()))
                })
                .map(|raw| self.reference_for_raw(raw))
                .filter(|r| row_filter.map_or(true, |f| f(r)))
                .collect();
        }

        log::debug!("data::table: select found no covering index, falling back to a full scan");
        self.rows
            .iter()
            .map(|&(raw, _)| self.reference_for_raw(raw))
            .filter(|r| {
                r.checked_raw()
                    .map(|raw| predicates.iter().all(|p| p.matches_raw(raw.as_ptr())))
                    .unwrap_or(false)
                    && row_filter.map_or(true, |f| f(r))
            })
            .collect()
    }

    fn build_projected(&self, projectors: &[ColumnProjector], settings: Settings, distinct: bool) -> Result<DataTable> {
        let specs: Vec<ColumnSpec> = projectors.iter().map(|p| p.spec).collect();
        let mut new_table = DataTable::new(specs, settings)?;

        if distinct {
            let index_columns: Vec<IndexColumn> = projectors
                .iter()
                .map(|p| {
                    let offset = new_table.column_list.get_offset(Column::<(), ()>::from_code(p.code));
                    IndexColumn::raw(offset, p.hash, p.eq)
                })
                .collect();
            new_table.indexes.add_unique(IndexName("project_distinct".to_string()), index_columns);
        }

        for &(raw, _) in &self.rows {
            let mut row = new_table.new_row()?;
            let new_raw = row.raw_ptr();
            for p in projectors {
                let new_offset = new_table.column_list.get_offset(Column::<(), ()>::from_code(p.code));
                unsafe {
                    (p.destroy)(new_raw.as_ptr().add(new_offset));
                    (p.copy)(raw.as_ptr().add(p.old_offset), new_raw.as_ptr().add(new_offset));
                }
            }
            if distinct {
                // a rejected duplicate was already torn down and returned
                // to the projected table's pool by `try_add_row`.
                new_table.try_add_row(row);
            } else {
                new_table.add_row(row)?;
            }
        }

        if distinct {
            new_table.indexes.remove_unique_indexes();
        }
        Ok(new_table)
    }

    /// Builds a sibling table containing only the projected columns,
    /// copying every row (spec §4.9 "Project").
    pub fn project(&self, projectors: &[ColumnProjector], settings: Settings) -> Result<DataTable> {
        self.build_projected(projectors, settings, false)
    }

    /// As [`Self::project`], but rows that collide on the projected
    /// columns are de-duplicated: a temporary unique index over the
    /// projection enforces this while rows are being copied, then is
    /// dropped before the table is returned.
    pub fn project_distinct(&self, projectors: &[ColumnProjector], settings: Settings) -> Result<DataTable> {
        self.build_projected(projectors, settings, true)
    }
}

impl Drop for DataTable {
    fn drop(&mut self) {
        for (raw, chunk) in self.rows.drain(..) {
            unsafe {
                self.column_list.destroy_raw(raw.as_ptr());
                self.pool.deallocate(raw, chunk);
            }
        }
        let drained: Vec<_> = std::mem::take(&mut *self.free_raws.lock());
        for (raw, chunk) in drained {
            unsafe {
                self.pool.deallocate(raw, chunk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::index;

    struct IdTag;
    struct NameTag;
    struct DeptTag;

    fn id_col() -> Column<IdTag, u64> {
        Column::from_name("id")
    }
    fn name_col() -> Column<NameTag, String> {
        Column::from_name("name")
    }
    fn dept_col() -> Column<DeptTag, String> {
        Column::from_name("dept")
    }

    fn make_table() -> DataTable {
        let specs = vec![ColumnSpec::new(id_col()), ColumnSpec::new(name_col()), ColumnSpec::new(dept_col())];
        DataTable::new(specs, Settings::default()).unwrap()
    }

    fn add(table: &mut DataTable, id: u64, name: &str, dept: &str) {
        let row = table
            .new_row_with(|r| {
                r.set(id_col(), id);
                r.set(name_col(), name.to_string());
                r.set(dept_col(), dept.to_string());
            })
            .unwrap();
        table.add_row(row).unwrap();
    }

    #[test]
    fn add_and_iterate_preserves_row_numbers() {
        let mut table = make_table();
        add(&mut table, 1, "alice", "eng");
        add(&mut table, 2, "bob", "eng");
        add(&mut table, 3, "cara", "ops");
        assert_eq!(table.count(), 3);
        for (i, r) in table.iter().enumerate() {
            assert_eq!(*r.get(id_col()).unwrap(), (i + 1) as u64);
        }
    }

    #[test]
    fn unique_index_rejects_duplicate_and_reports_existing_row() {
        let mut table = make_table();
        let columns = vec![IndexColumn::new(table.column_list(), id_col())];
        let handle = table.add_unique_hash_index("by_id", columns).unwrap();
        add(&mut table, 1, "alice", "eng");

        let dup = table
            .new_row_with(|r| {
                r.set(id_col(), 1u64);
                r.set(name_col(), "impostor".to_string());
                r.set(dept_col(), "eng".to_string());
            })
            .unwrap();
        let result = table.try_add_row(dup);
        assert!(result.violated_index.is_some());
        assert_eq!(*result.row_ref.get(name_col()).unwrap(), "alice");
        assert_eq!(table.count(), 1);

        let one = 1u64;
        let preds = [index::eq(table.column_list(), id_col(), &one)];
        let found = table.find_by_unique_hash(&handle, &preds).unwrap().unwrap();
        assert_eq!(*found.get(name_col()).unwrap(), "alice");
    }

    #[test]
    fn remove_row_keep_order_shifts_and_renumbers() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "eng");
        add(&mut table, 3, "c", "ops");
        table.remove_row(0, true).unwrap();
        assert_eq!(table.count(), 2);
        assert_eq!(*table.row(0).unwrap().get(id_col()).unwrap(), 2);
        assert_eq!(*table.row(1).unwrap().get(id_col()).unwrap(), 3);
    }

    #[test]
    fn remove_row_no_keep_order_swaps_last_into_place() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "eng");
        add(&mut table, 3, "c", "ops");
        table.remove_row(0, false).unwrap();
        assert_eq!(table.count(), 2);
        assert_eq!(*table.row(0).unwrap().get(id_col()).unwrap(), 3);
    }

    #[test]
    fn stale_row_reference_fails_after_a_remove() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "eng");
        let stale = table.row(1).unwrap();
        table.remove_row(0, true).unwrap();
        assert_eq!(stale.get(id_col()).unwrap_err(), Error::VersionCheckFailed);
    }

    #[test]
    fn extract_then_insert_round_trips() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "eng");
        let extracted = table.extract_row(0).unwrap();
        assert_eq!(table.count(), 1);
        table.insert_row(0, extracted).unwrap();
        assert_eq!(table.count(), 2);
        assert_eq!(*table.row(0).unwrap().get(id_col()).unwrap(), 1);
    }

    #[test]
    fn update_column_moves_a_row_between_multi_hash_buckets() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "eng");
        let columns = vec![IndexColumn::new(table.column_list(), dept_col())];
        let handle = table.add_multi_hash_index("by_dept", columns);

        let eng = "eng".to_string();
        let preds = [index::eq(table.column_list(), dept_col(), &eng)];
        assert_eq!(table.find_by_multi_hash(&handle, &preds).unwrap().len(), 2);

        let row_ref = table.row(0).unwrap();
        table.update_column(&row_ref, dept_col(), "ops".to_string()).unwrap();

        assert_eq!(table.find_by_multi_hash(&handle, &preds).unwrap().len(), 1);
        let ops = "ops".to_string();
        let preds_ops = [index::eq(table.column_list(), dept_col(), &ops)];
        assert_eq!(table.find_by_multi_hash(&handle, &preds_ops).unwrap().len(), 1);
    }

    #[test]
    fn select_uses_multi_hash_index_when_available() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "eng");
        add(&mut table, 3, "c", "ops");
        table.add_multi_hash_index("by_dept", vec![IndexColumn::new(table.column_list(), dept_col())]);

        let eng = "eng".to_string();
        let preds = [index::eq(table.column_list(), dept_col(), &eng)];
        let selection = table.select(&preds, None);
        assert_eq!(selection.len(), 2);
        for r in selection.iter() {
            assert_eq!(*r.get(dept_col()).unwrap(), "eng");
        }
    }

    #[test]
    fn select_falls_back_to_a_full_scan_without_an_index() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "ops");
        let eng = "eng".to_string();
        let preds = [index::eq(table.column_list(), dept_col(), &eng)];
        assert_eq!(table.select_count(&preds, None), 1);
    }

    #[test]
    fn remove_rows_compacts_and_renumbers() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "ops");
        add(&mut table, 3, "c", "eng");
        let removed = table.remove_rows(|r| *r.get(dept_col()).unwrap() == "eng");
        assert_eq!(removed, 2);
        assert_eq!(table.count(), 1);
        assert_eq!(*table.row(0).unwrap().get(id_col()).unwrap(), 2);
    }

    #[test]
    fn project_distinct_drops_duplicate_projected_rows() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "eng");
        add(&mut table, 3, "c", "ops");

        let projectors = vec![ColumnProjector::new(table.column_list(), dept_col())];
        let projected = table.project_distinct(&projectors, Settings::default()).unwrap();
        assert_eq!(projected.count(), 2);
    }

    #[test]
    fn project_keeps_every_row() {
        let mut table = make_table();
        add(&mut table, 1, "a", "eng");
        add(&mut table, 2, "b", "eng");

        let projectors = vec![ColumnProjector::new(table.column_list(), id_col()), ColumnProjector::new(table.column_list(), name_col())];
        let projected = table.project(&projectors, Settings::default()).unwrap();
        assert_eq!(projected.count(), 2);
        assert_eq!(*projected.row(0).unwrap().get(id_col()).unwrap(), 1);
        assert_eq!(*projected.row(0).unwrap().get(name_col()).unwrap(), "a");
    }
}
