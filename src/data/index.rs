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

//! Secondary indexes over raw rows (spec §4.8), grounded directly on
//! `original_source/momo/DataIndexes.h`'s `Add`/`RejectAdd`/`AcceptAdd`,
//! `PrepareRemove`/`RejectRemove`/`AcceptRemove` two-phase shape.
//!
//! A row's column list is only known to the table by offset and size, not
//! by static type (spec §4.6's dynamic variant), so an index describes its
//! key columns the same way: a [`IndexColumn`] per key column carries
//! type-erased hash/equality function pointers over the bytes at that
//! column's offset, derived once from the caller's statically-typed
//! [`crate::data::column::Column`] at `add_*_hash_index` time. Everything
//! downstream of that — hashing a row's key tuple, comparing two rows'
//! tuples, comparing a row's tuple against a caller-supplied
//! [`EqPredicate`] set — goes through these function pointers, never
//! through a generic `T: Hash` bound, because the index has to serve every
//! column-typed caller of one `DataTable` uniformly.

use crate::data::column::Column;
use crate::data::column_list::ColumnList;
use crate::error::{Error, IndexName, Result};
use crate::hash::FnvHasher;
use core::hash::{Hash, Hasher};
use core::ptr::NonNull;

use crate::bucket::OpenN1;
use crate::hashtable::RawTable;

/// Type-erased per-column hash/equality, read at a fixed byte offset out
/// of an opaque row buffer (spec §4.8 "Indexing hash traits").
#[derive(Clone, Copy)]
pub struct IndexColumn {
    offset: usize,
    hash: unsafe fn(*const u8, &mut dyn Hasher),
    eq: unsafe fn(*const u8, *const u8) -> bool,
}

pub(crate) unsafe fn hash_at<Item: Hash>(ptr: *const u8, hasher: &mut dyn Hasher) {
    struct Wrap<'a>(&'a mut dyn Hasher);
    impl<'a> Hasher for Wrap<'a> {
        fn finish(&self) -> u64 {
            self.0.finish()
        }
        fn write(&mut self, bytes: &[u8]) {
            self.0.write(bytes)
        }
    }
    (*(ptr as *const Item)).hash(&mut Wrap(hasher));
}

pub(crate) unsafe fn eq_at<Item: Eq>(a: *const u8, b: *const u8) -> bool {
    *(a as *const Item) == *(b as *const Item)
}

impl IndexColumn {
    pub fn new<Tag, Item: Hash + Eq>(column_list: &ColumnList, col: Column<Tag, Item>) -> Self {
        Self {
            offset: column_list.get_offset(col),
            hash: hash_at::<Item>,
            eq: eq_at::<Item>,
        }
    }

    /// Builds an `IndexColumn` from already-erased hash/equality function
    /// pointers, used by `data::table::ColumnProjector` to describe a
    /// `project_distinct` de-duplication index over columns whose static
    /// `Item` type is no longer available at that call site.
    pub(crate) fn raw(offset: usize, hash: unsafe fn(*const u8, &mut dyn Hasher), eq: unsafe fn(*const u8, *const u8) -> bool) -> Self {
        Self { offset, hash, eq }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// A single `column == value` predicate fed to `select`/`find_by_*_hash`.
/// `value` points at bytes of whatever `Item` the caller's `Column<_,
/// Item>` carries; the index matches it against a row's bytes at the same
/// column's offset using that column's own `eq` function pointer, so the
/// comparison is sound as long as the `Column` used to build the
/// predicate is the same one the index (or the table) was built from —
/// exactly the invariant the rest of this crate already leans on.
pub struct EqPredicate<'a> {
    pub(crate) offset: usize,
    pub(crate) value: *const u8,
    hash: unsafe fn(*const u8, &mut dyn Hasher),
    eq: unsafe fn(*const u8, *const u8) -> bool,
    _marker: core::marker::PhantomData<&'a ()>,
}

/// Builds an [`EqPredicate`] for `col == value` (spec §4.9 "Select").
pub fn eq<'a, Tag, Item: Hash + Eq>(
    column_list: &ColumnList,
    col: Column<Tag, Item>,
    value: &'a Item,
) -> EqPredicate<'a> {
    EqPredicate {
        offset: column_list.get_offset(col),
        value: value as *const Item as *const u8,
        hash: hash_at::<Item>,
        eq: eq_at::<Item>,
        _marker: core::marker::PhantomData,
    }
}

impl<'a> EqPredicate<'a> {
    /// Tests this predicate against a row's raw bytes directly — used by
    /// `data::table::select` both to fold overflow predicates into a
    /// row-filter and to re-check predicates a chosen index only partially
    /// covers.
    pub(crate) fn matches_raw(&self, raw: *const u8) -> bool {
        unsafe { (self.eq)(raw.add(self.offset), self.value) }
    }
}

/// Ascending, deduplicated column offsets a predicate set touches — what
/// an index's own `sorted_offsets` is checked against for "coverage"
/// (spec §4.9 "Select" step 3).
pub(crate) fn sorted_predicate_offsets(preds: &[EqPredicate<'_>]) -> Vec<usize> {
    let mut offsets: Vec<usize> = preds.iter().map(|p| p.offset).collect();
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

/// Resolves, for one column offset, the byte pointer an index should read
/// when hashing/comparing a key tuple: either straight out of a live row,
/// or (for the column currently being mutated) the would-be new value, or
/// (for a query) the matching predicate's value.
trait OffsetResolver {
    fn resolve(&self, offset: usize) -> *const u8;
}

struct RowResolver(*const u8);
impl OffsetResolver for RowResolver {
    fn resolve(&self, offset: usize) -> *const u8 {
        unsafe { self.0.add(offset) }
    }
}

struct OverrideResolver {
    raw: *const u8,
    override_offset: usize,
    override_value: *const u8,
}
impl OffsetResolver for OverrideResolver {
    fn resolve(&self, offset: usize) -> *const u8 {
        if offset == self.override_offset {
            self.override_value
        } else {
            unsafe { self.raw.add(offset) }
        }
    }
}

struct PredicateResolver<'a, 'p>(&'a [EqPredicate<'p>]);
impl<'a, 'p> OffsetResolver for PredicateResolver<'a, 'p> {
    fn resolve(&self, offset: usize) -> *const u8 {
        self.0
            .iter()
            .find(|p| p.offset == offset)
            .expect("predicate set must cover every column this index needs")
            .value
    }
}

/// A named key-column tuple shared by `UniqueHash` and `MultiHash` (spec
/// §4.8 "Index descriptor"): columns in declaration order (used to hash/
/// compare consistently) plus the ascending `sorted_offsets` the table's
/// selector (spec §4.9 "Select") binary-searches to test "does this
/// index's key cover this predicate set".
pub(crate) struct IndexDescriptor {
    pub(crate) name: IndexName,
    columns: Vec<IndexColumn>,
    pub(crate) sorted_offsets: Vec<usize>,
}

impl IndexDescriptor {
    fn new(name: IndexName, columns: Vec<IndexColumn>) -> Self {
        let mut sorted_offsets: Vec<usize> = columns.iter().map(|c| c.offset()).collect();
        sorted_offsets.sort_unstable();
        Self { name, columns, sorted_offsets }
    }

    /// Spec §4.9 "look for a[n] index whose offsets are a subset" of the
    /// (already-sorted) predicate offsets.
    pub(crate) fn covers(&self, sorted_predicate_offsets: &[usize]) -> bool {
        self.sorted_offsets
            .iter()
            .all(|o| sorted_predicate_offsets.binary_search(o).is_ok())
    }

    fn hash_via(&self, resolver: &dyn OffsetResolver) -> u64 {
        let mut hasher = FnvHasher::default();
        for col in &self.columns {
            unsafe { (col.hash)(resolver.resolve(col.offset), &mut hasher) };
        }
        hasher.finish()
    }

    fn eq_row_via(&self, row: *const u8, resolver: &dyn OffsetResolver) -> bool {
        self.columns
            .iter()
            .all(|col| unsafe { (col.eq)(row.add(col.offset), resolver.resolve(col.offset)) })
    }

    fn hash_of_row(&self, raw: *const u8) -> u64 {
        self.hash_via(&RowResolver(raw))
    }

    fn eq_row_to_row(&self, a: *const u8, b: *const u8) -> bool {
        self.eq_row_via(a, &RowResolver(b))
    }

    fn hash_with_override(&self, raw: *const u8, offset: usize, value: *const u8) -> u64 {
        self.hash_via(&OverrideResolver { raw, override_offset: offset, override_value: value })
    }

    fn eq_row_with_override(&self, row: *const u8, raw: *const u8, offset: usize, value: *const u8) -> bool {
        self.eq_row_via(row, &OverrideResolver { raw, override_offset: offset, override_value: value })
    }

    fn hash_of_predicates(&self, preds: &[EqPredicate<'_>]) -> u64 {
        self.hash_via(&PredicateResolver(preds))
    }

    fn eq_row_to_predicates(&self, row: *const u8, preds: &[EqPredicate<'_>]) -> bool {
        self.eq_row_via(row, &PredicateResolver(preds))
    }
}

/// Opaque handle to one of a table's secondary indexes, returned by
/// `add_unique_hash_index`/`add_multi_hash_index` (spec §6) and accepted
/// back by `find_by_unique_hash`/`find_by_multi_hash`.
pub struct UniqueHashIndex {
    pub(crate) slot: usize,
}

pub struct MultiHashIndex {
    pub(crate) slot: usize,
}

pub(crate) enum IndexHandle {
    Unique(usize),
    Multi(usize),
}

/// Unique-hash secondary index (spec §4.8 "Unique hash index"): a hash set
/// of raw-row pointers, keyed by the tuple read at `descriptor`'s offsets.
pub(crate) struct UniqueHash {
    descriptor: IndexDescriptor,
    table: RawTable<NonNull<u8>, OpenN1<NonNull<u8>>>,
    pending_add: Option<NonNull<u8>>,
    pending_remove: Option<(u64, NonNull<u8>)>,
}

impl UniqueHash {
    fn new(descriptor: IndexDescriptor) -> Self {
        Self { descriptor, table: RawTable::new(), pending_add: None, pending_remove: None }
    }

    pub(crate) fn name(&self) -> &IndexName {
        &self.descriptor.name
    }

    pub(crate) fn sorted_offsets(&self) -> &[usize] {
        &self.descriptor.sorted_offsets
    }

    pub(crate) fn covers(&self, sorted_predicate_offsets: &[usize]) -> bool {
        self.descriptor.covers(sorted_predicate_offsets)
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    /// Spec §4.8 "Add row": speculative insert, reversible by
    /// [`Self::reject_add`]. A `UniqueIndexViolation` means nothing was
    /// inserted.
    fn add(&mut self, raw: NonNull<u8>) -> Result<()> {
        let hash_code = self.descriptor.hash_of_row(raw.as_ptr());
        let desc = &self.descriptor;
        if let Some(&existing) = self
            .table
            .raw_find(hash_code, |&r| desc.eq_row_to_row(raw.as_ptr(), r.as_ptr()))
        {
            return Err(Error::UniqueIndexViolation {
                index: self.descriptor.name.clone(),
                existing_raw: existing.as_ptr() as usize,
            });
        }
        self.table.raw_insert_new(hash_code, raw);
        self.pending_add = Some(raw);
        Ok(())
    }

    /// `add` keyed by the tuple the row *would* have after writing
    /// `override_value` at `override_offset` (spec §4.8 "Update row
    /// (in-place column write)"). Returns `Ok(false)` (a no-op, nothing
    /// inserted) when the override doesn't actually change this index's
    /// key — the caller must then leave the row's existing entry alone
    /// rather than pairing this with a [`Self::accept_remove`].
    fn add_with_override(&mut self, raw: NonNull<u8>, override_offset: usize, override_value: *const u8) -> Result<bool> {
        let hash_code = self.descriptor.hash_with_override(raw.as_ptr(), override_offset, override_value);
        let desc = &self.descriptor;
        match self.table.raw_find(hash_code, |&r| {
            desc.eq_row_with_override(r.as_ptr(), raw.as_ptr(), override_offset, override_value)
        }) {
            Some(&existing) if existing != raw => Err(Error::UniqueIndexViolation {
                index: self.descriptor.name.clone(),
                existing_raw: existing.as_ptr() as usize,
            }),
            Some(_) => {
                self.pending_add = None;
                Ok(false)
            }
            None => {
                self.table.raw_insert_new(hash_code, raw);
                self.pending_add = Some(raw);
                Ok(true)
            }
        }
    }

    fn reject_add(&mut self) {
        if let Some(raw) = self.pending_add.take() {
            let hash_code = self.descriptor.hash_of_row(raw.as_ptr());
            self.table.raw_remove(hash_code, |&r| r == raw);
        }
    }

    fn accept_add(&mut self) {
        self.pending_add = None;
    }

    /// Stashes the row's current hash/position so [`Self::accept_remove`]
    /// can erase it later without re-reading `raw`'s bytes, which may have
    /// already been overwritten by an update's assigner by the time
    /// `accept_remove` runs (spec §4.8 "Update row (in-place...)").
    fn prepare_remove(&mut self, raw: NonNull<u8>) {
        let hash_code = self.descriptor.hash_of_row(raw.as_ptr());
        self.pending_remove = Some((hash_code, raw));
    }

    fn reject_remove(&mut self) {
        self.pending_remove = None;
    }

    fn accept_remove(&mut self) {
        if let Some((hash_code, raw)) = self.pending_remove.take() {
            self.table.raw_remove(hash_code, |&r| r == raw);
        }
    }

    /// Direct lookup by predicate tuple (spec §4.9 "Find by index").
    pub(crate) fn find(&self, preds: &[EqPredicate<'_>]) -> Option<NonNull<u8>> {
        let hash_code = self.descriptor.hash_of_predicates(preds);
        let desc = &self.descriptor;
        self.table
            .raw_find(hash_code, |&r| desc.eq_row_to_predicates(r.as_ptr(), preds))
            .copied()
    }
}

/// One key's slot in a [`MultiHash`] index (spec §4.8 "Multi hash index"):
/// `key_raw` is the designated row representing the key; `values` holds
/// every other row sharing the same key tuple.
struct MultiSlot {
    key_raw: NonNull<u8>,
    values: Vec<NonNull<u8>>,
}

enum RemoveStage {
    None,
    /// row was the slot's key and the slot has no other members: drop the
    /// whole slot.
    KeyAlone(u64, NonNull<u8>),
    /// row was the slot's key; promote `values[promote_index]` to be the
    /// new key row.
    KeyWithValues(u64, NonNull<u8>, usize),
    /// row was a plain value at `values[value_index]`.
    Value(u64, NonNull<u8>, usize),
}

pub(crate) struct MultiHash {
    descriptor: IndexDescriptor,
    table: RawTable<MultiSlot, OpenN1<MultiSlot>>,
    value_count: usize,
    pending_add: Option<AddStage>,
    remove_stage: RemoveStage,
}

/// Every stage records the slot's `key_raw` identity (a pointer, stable
/// regardless of what the row's bytes say) alongside the hash code, so the
/// matching accept/reject can relocate the exact same slot by pointer
/// equality instead of re-running the descriptor's byte-level equality —
/// which would be unsound once `accept_remove` runs after an update's
/// assigner has already overwritten the row.
enum AddStage {
    CreatedSlot(u64, NonNull<u8>),
    PushedValue(u64, NonNull<u8>),
}

impl Hash for MultiSlot {
    fn hash<H: Hasher>(&self, _state: &mut H) {
        unreachable!("MultiHash never uses RawTable's own Hash/Eq-based convenience methods")
    }
}
impl PartialEq for MultiSlot {
    fn eq(&self, _other: &Self) -> bool {
        unreachable!("MultiHash never uses RawTable's own Hash/Eq-based convenience methods")
    }
}
impl Eq for MultiSlot {}

impl MultiHash {
    fn new(descriptor: IndexDescriptor) -> Self {
        Self {
            descriptor,
            table: RawTable::new(),
            value_count: 0,
            pending_add: None,
            remove_stage: RemoveStage::None,
        }
    }

    pub(crate) fn name(&self) -> &IndexName {
        &self.descriptor.name
    }

    pub(crate) fn sorted_offsets(&self) -> &[usize] {
        &self.descriptor.sorted_offsets
    }

    pub(crate) fn covers(&self, sorted_predicate_offsets: &[usize]) -> bool {
        self.descriptor.covers(sorted_predicate_offsets)
    }

    pub(crate) fn key_count(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn value_count(&self) -> usize {
        self.value_count
    }

    fn add(&mut self, raw: NonNull<u8>) {
        let hash_code = self.descriptor.hash_of_row(raw.as_ptr());
        let desc = &self.descriptor;
        let stage = if let Some(slot) = self
            .table
            .raw_find_mut(hash_code, |s| desc.eq_row_to_row(raw.as_ptr(), s.key_raw.as_ptr()))
        {
            slot.values.push(raw);
            AddStage::PushedValue(hash_code, slot.key_raw)
        } else {
            self.table.raw_insert_new(hash_code, MultiSlot { key_raw: raw, values: Vec::new() });
            AddStage::CreatedSlot(hash_code, raw)
        };
        self.value_count += 1;
        self.pending_add = Some(stage);
    }

    /// See [`UniqueHash::add_with_override`] — returns `false` for the
    /// same "key unchanged, nothing to do" no-op case.
    fn add_with_override(&mut self, raw: NonNull<u8>, override_offset: usize, override_value: *const u8) -> bool {
        let hash_code = self.descriptor.hash_with_override(raw.as_ptr(), override_offset, override_value);
        let desc = &self.descriptor;
        let already_member = self.table.raw_find(hash_code, |s| {
            desc.eq_row_with_override(s.key_raw.as_ptr(), raw.as_ptr(), override_offset, override_value)
                && (s.key_raw == raw || s.values.contains(&raw))
        });
        if already_member.is_some() {
            self.pending_add = None;
            return false;
        }
        let stage = if let Some(slot) = self.table.raw_find_mut(hash_code, |s| {
            desc.eq_row_with_override(s.key_raw.as_ptr(), raw.as_ptr(), override_offset, override_value)
        }) {
            slot.values.push(raw);
            AddStage::PushedValue(hash_code, slot.key_raw)
        } else {
            self.table.raw_insert_new(hash_code, MultiSlot { key_raw: raw, values: Vec::new() });
            AddStage::CreatedSlot(hash_code, raw)
        };
        self.value_count += 1;
        self.pending_add = Some(stage);
        true
    }

    fn reject_add(&mut self) {
        match self.pending_add.take() {
            None => {}
            Some(AddStage::CreatedSlot(hash_code, key_raw)) => {
                self.table.raw_remove(hash_code, |s| s.key_raw == key_raw);
                self.value_count -= 1;
            }
            Some(AddStage::PushedValue(hash_code, key_raw)) => {
                if let Some(slot) = self.table.raw_find_mut(hash_code, |s| s.key_raw == key_raw) {
                    slot.values.pop();
                }
                self.value_count -= 1;
            }
        }
    }

    fn accept_add(&mut self) {
        self.pending_add = None;
    }

    fn prepare_remove(&mut self, raw: NonNull<u8>) {
        let hash_code = self.descriptor.hash_of_row(raw.as_ptr());
        let desc = &self.descriptor;
        let slot = self
            .table
            .raw_find(hash_code, |s| desc.eq_row_to_row(raw.as_ptr(), s.key_raw.as_ptr()))
            .expect("row must be present in every index it was previously added to");
        let key_raw = slot.key_raw;
        self.remove_stage = if slot.key_raw == raw {
            if slot.values.is_empty() {
                RemoveStage::KeyAlone(hash_code, key_raw)
            } else {
                RemoveStage::KeyWithValues(hash_code, key_raw, 0)
            }
        } else {
            let idx = slot
                .values
                .iter()
                .position(|&v| v == raw)
                .expect("row missing from its own key's value array");
            RemoveStage::Value(hash_code, key_raw, idx)
        };
    }

    fn reject_remove(&mut self) {
        self.remove_stage = RemoveStage::None;
    }

    fn accept_remove(&mut self) {
        match core::mem::replace(&mut self.remove_stage, RemoveStage::None) {
            RemoveStage::None => {}
            RemoveStage::KeyAlone(hash_code, key_raw) => {
                self.table.raw_remove(hash_code, |s| s.key_raw == key_raw);
                self.value_count -= 1;
            }
            RemoveStage::KeyWithValues(hash_code, key_raw, promote_index) => {
                let slot = self.table.raw_find_mut(hash_code, |s| s.key_raw == key_raw).unwrap();
                slot.key_raw = slot.values.swap_remove(promote_index);
                self.value_count -= 1;
            }
            RemoveStage::Value(hash_code, key_raw, value_index) => {
                let slot = self.table.raw_find_mut(hash_code, |s| s.key_raw == key_raw).unwrap();
                slot.values.swap_remove(value_index);
                self.value_count -= 1;
            }
        }
    }

    /// Spec §4.9 "walk its matching group": every row under `preds`'s key,
    /// key row first.
    pub(crate) fn find(&self, preds: &[EqPredicate<'_>]) -> Vec<NonNull<u8>> {
        let hash_code = self.descriptor.hash_of_predicates(preds);
        let desc = &self.descriptor;
        match self
            .table
            .raw_find(hash_code, |s| desc.eq_row_to_predicates(s.key_raw.as_ptr(), preds))
        {
            None => Vec::new(),
            Some(slot) => {
                let mut out = Vec::with_capacity(slot.values.len() + 1);
                out.push(slot.key_raw);
                out.extend_from_slice(&slot.values);
                out
            }
        }
    }
}

/// Owns every secondary index a table carries, and mediates the two-phase
/// add/remove/update protocol (spec §4.8) so that a failure partway
/// through leaves every index exactly as it was (strong exception safety,
/// spec §5).
#[derive(Default)]
pub(crate) struct DataIndexSet {
    unique: Vec<UniqueHash>,
    multi: Vec<MultiHash>,
}

impl DataIndexSet {
    pub(crate) fn add_unique(&mut self, name: IndexName, columns: Vec<IndexColumn>) -> usize {
        self.unique.push(UniqueHash::new(IndexDescriptor::new(name, columns)));
        self.unique.len() - 1
    }

    pub(crate) fn add_multi(&mut self, name: IndexName, columns: Vec<IndexColumn>) -> usize {
        self.multi.push(MultiHash::new(IndexDescriptor::new(name, columns)));
        self.multi.len() - 1
    }

    pub(crate) fn remove_unique_indexes(&mut self) {
        self.unique.clear();
    }

    pub(crate) fn remove_multi_indexes(&mut self) {
        self.multi.clear();
    }

    pub(crate) fn unique_at(&self, slot: usize) -> &UniqueHash {
        &self.unique[slot]
    }

    pub(crate) fn multi_at(&self, slot: usize) -> &MultiHash {
        &self.multi[slot]
    }

    pub(crate) fn unique_indexes(&self) -> &[UniqueHash] {
        &self.unique
    }

    pub(crate) fn multi_indexes(&self) -> &[MultiHash] {
        &self.multi
    }

    /// Backfills a just-registered unique index over every row already in
    /// the table (spec §4.9 "Add unique hash index"). On the first
    /// violation, undoes every row added so far and drops the index itself
    /// — `add_unique_hash_index` only commits the slot to the table's
    /// handle on success.
    pub(crate) fn bulk_load_unique(&mut self, slot: usize, raws: impl Iterator<Item = NonNull<u8>>) -> Result<()> {
        let mut loaded = Vec::new();
        for raw in raws {
            match self.unique[slot].add(raw) {
                Ok(()) => {
                    self.unique[slot].accept_add();
                    loaded.push(raw);
                }
                Err(e) => {
                    for &r in loaded.iter().rev() {
                        self.unique[slot].prepare_remove(r);
                        self.unique[slot].accept_remove();
                    }
                    self.unique.pop();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Backfills a just-registered multi index over every row already in
    /// the table (spec §4.9 "Add multi hash index"). Infallible: a multi
    /// index never rejects a row.
    pub(crate) fn bulk_load_multi(&mut self, slot: usize, raws: impl Iterator<Item = NonNull<u8>>) {
        for raw in raws {
            self.multi[slot].add(raw);
            self.multi[slot].accept_add();
        }
    }

    /// Spec §4.8 "Add row (the happy path)".
    pub(crate) fn add_raw(&mut self, raw: NonNull<u8>) -> Result<()> {
        let mut added_unique = 0;
        let mut added_multi = 0;
        let mut failure = None;
        for uh in self.unique.iter_mut() {
            match uh.add(raw) {
                Ok(()) => added_unique += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if failure.is_none() {
            for mh in self.multi.iter_mut() {
                mh.add(raw);
                added_multi += 1;
            }
        }
        if let Some(err) = failure {
            for uh in self.unique[..added_unique].iter_mut() {
                uh.reject_add();
            }
            for mh in self.multi[..added_multi].iter_mut() {
                mh.reject_add();
            }
            return Err(err);
        }
        for uh in self.unique.iter_mut() {
            uh.accept_add();
        }
        for mh in self.multi.iter_mut() {
            mh.accept_add();
        }
        Ok(())
    }

    /// Spec §4.8 "Remove row".
    pub(crate) fn remove_raw(&mut self, raw: NonNull<u8>) {
        for uh in self.unique.iter_mut() {
            uh.prepare_remove(raw);
        }
        for mh in self.multi.iter_mut() {
            mh.prepare_remove(raw);
        }
        for uh in self.unique.iter_mut() {
            uh.accept_remove();
        }
        for mh in self.multi.iter_mut() {
            mh.accept_remove();
        }
    }

    /// Spec §4.8 "Update row (in-place column write of a mutable column,
    /// optimised)". `assign` performs the actual write; it only runs once
    /// every affected index has accepted the row under its new key.
    pub(crate) fn update_column(
        &mut self,
        raw: NonNull<u8>,
        offset: usize,
        new_value: *const u8,
        assign: impl FnOnce(),
    ) -> Result<()> {
        let affected_unique: Vec<usize> = self
            .unique
            .iter()
            .enumerate()
            .filter(|(_, uh)| uh.sorted_offsets().binary_search(&offset).is_ok())
            .map(|(i, _)| i)
            .collect();
        let affected_multi: Vec<usize> = self
            .multi
            .iter()
            .enumerate()
            .filter(|(_, mh)| mh.sorted_offsets().binary_search(&offset).is_ok())
            .map(|(i, _)| i)
            .collect();

        // Stage removal of the old key first, while `raw`'s bytes still
        // reflect the pre-write value.
        for &i in &affected_unique {
            self.unique[i].prepare_remove(raw);
        }
        for &i in &affected_multi {
            self.multi[i].prepare_remove(raw);
        }

        // `changed_unique[k]` / `changed_multi[k]` record whether the k-th
        // affected index's key actually moved, vs. the override resolving
        // to a key the row already held — in the latter case the row's
        // existing entry must survive, so accepting must `reject_remove`
        // rather than `accept_remove` (see `UniqueHash::add_with_override`).
        let mut changed_unique = Vec::with_capacity(affected_unique.len());
        let mut failure = None;
        for &i in &affected_unique {
            match self.unique[i].add_with_override(raw, offset, new_value) {
                Ok(changed) => changed_unique.push(changed),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(err) = failure {
            for &i in &affected_unique[..changed_unique.len()] {
                self.unique[i].reject_add();
            }
            for &i in &affected_unique {
                self.unique[i].reject_remove();
            }
            for &i in &affected_multi {
                self.multi[i].reject_remove();
            }
            return Err(err);
        }
        let changed_multi: Vec<bool> = affected_multi
            .iter()
            .map(|&i| self.multi[i].add_with_override(raw, offset, new_value))
            .collect();

        assign();

        for (&i, &changed) in affected_unique.iter().zip(&changed_unique) {
            self.unique[i].accept_add();
            if changed {
                self.unique[i].accept_remove();
            } else {
                self.unique[i].reject_remove();
            }
        }
        for (&i, &changed) in affected_multi.iter().zip(&changed_multi) {
            self.multi[i].accept_add();
            if changed {
                self.multi[i].accept_remove();
            } else {
                self.multi[i].reject_remove();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::column_list::ColumnSpec;
    use crate::settings::Settings;

    struct NameTag;
    struct DeptTag;

    fn alloc_row(list: &ColumnList, name: &str) -> NonNull<u8> {
        let layout = std::alloc::Layout::from_size_align(list.total_size(), list.alignment()).unwrap();
        unsafe {
            let ptr = std::alloc::alloc(layout);
            list.create_raw(ptr);
            let name_col: Column<NameTag, String> = Column::from_name("name");
            let offset = list.get_offset(name_col);
            *(ptr.add(offset) as *mut String) = name.to_string();
            NonNull::new(ptr).unwrap()
        }
    }

    fn dealloc_row(list: &ColumnList, raw: NonNull<u8>) {
        unsafe {
            list.destroy_raw(raw.as_ptr());
            std::alloc::dealloc(raw.as_ptr(), std::alloc::Layout::from_size_align(list.total_size(), list.alignment()).unwrap());
        }
    }

    use core::ptr;

    #[test]
    fn unique_index_rejects_duplicate_key_and_rolls_back() {
        let name: Column<NameTag, String> = Column::from_name("name");
        let list = ColumnList::new(vec![ColumnSpec::new(name)], &Settings::default(), true).unwrap();
        let mut indexes = DataIndexSet::default();
        let col = IndexColumn::new(&list, name);
        indexes.add_unique(IndexName("name".into()), vec![col]);

        let alice = alloc_row(&list, "alice");
        let alice2 = alloc_row(&list, "alice");
        indexes.add_raw(alice).unwrap();
        let err = indexes.add_raw(alice2).unwrap_err();
        assert!(matches!(err, Error::UniqueIndexViolation { .. }));
        assert_eq!(indexes.unique_at(0).len(), 1);

        dealloc_row(&list, alice);
        dealloc_row(&list, alice2);
    }

    #[test]
    fn multi_index_groups_and_reassigns_key_on_removal() {
        let dept: Column<DeptTag, u32> = Column::from_name("dept");
        let list = ColumnList::new(vec![ColumnSpec::new(dept)], &Settings::default(), true).unwrap();
        let mut indexes = DataIndexSet::default();
        let col = IndexColumn::new(&list, dept);
        indexes.add_multi(IndexName("dept".into()), vec![col]);

        let layout = std::alloc::Layout::from_size_align(list.total_size(), list.alignment()).unwrap();
        let mk = |v: u32| unsafe {
            let ptr = std::alloc::alloc(layout);
            list.create_raw(ptr);
            ptr::write(ptr.add(list.get_offset(dept)) as *mut u32, v);
            NonNull::new(ptr).unwrap()
        };
        let a = mk(1);
        let b = mk(1);
        let c = mk(1);
        indexes.add_raw(a).unwrap();
        indexes.add_raw(b).unwrap();
        indexes.add_raw(c).unwrap();
        assert_eq!(indexes.multi_at(0).key_count(), 1);
        assert_eq!(indexes.multi_at(0).value_count(), 3);

        indexes.remove_raw(a);
        assert_eq!(indexes.multi_at(0).key_count(), 1);
        assert_eq!(indexes.multi_at(0).value_count(), 2);

        for raw in [a, b, c] {
            unsafe {
                list.destroy_raw(raw.as_ptr());
                std::alloc::dealloc(raw.as_ptr(), layout);
            }
        }
    }
}
