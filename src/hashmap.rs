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

//! Hash map and hash multi-map (spec §4.5): both are overlays on
//! [`RawTable`], not separate table implementations. `HashMap` stores a
//! `(key, value)` pair whose `Hash`/`Eq` only look at the key; the
//! multi-map stores a key alongside a small value-array built from the same
//! [`UnlimP`] policy the bucket layer uses for its own unbounded bucket —
//! "a hash map from key to a value-array (an array bucket similar to
//! UnlimP's small-vector)", per spec.

use crate::bucket::{BucketPolicy, UnlimP};
use crate::bucket::unlim_p::UnlimPParams;
use crate::hash;
use crate::hashtable::RawTable;
use core::borrow::Borrow;
use core::hash::{Hash, Hasher};

/// A key-value pair whose `Hash`/`Eq` project onto the key alone (spec
/// §4.5 "item_key(&item) projection", §3).
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

impl<K: Hash, V> Hash for Entry<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}

impl<K: PartialEq, V> PartialEq for Entry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Eq, V> Eq for Entry<K, V> {}

pub struct HashMap<K, V, B: BucketPolicy<Entry<K, V>>> {
    table: RawTable<Entry<K, V>, B>,
}

impl<K, V, B: BucketPolicy<Entry<K, V>>> Default for HashMap<K, V, B> {
    fn default() -> Self {
        Self { table: RawTable::default() }
    }
}

impl<K: Hash + Eq, V, B: BucketPolicy<Entry<K, V>>> HashMap<K, V, B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash_code = hash::hash_one(key);
        self.table
            .raw_find(hash_code, |e| e.key.borrow() == key)
            .map(|e| &e.value)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash_code = hash::hash_one(key);
        self.table
            .raw_find_mut(hash_code, |e| e.key.borrow() == key)
            .map(|e| &mut e.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Insert-or-replace; returns the previous value, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash_code = hash::hash_one(&key);
        if let Some(entry) = self.table.raw_find_mut(hash_code, |e| e.key == key) {
            return Some(core::mem::replace(&mut entry.value, value));
        }
        self.table.raw_insert_new(hash_code, Entry { key, value });
        None
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash_code = hash::hash_one(key);
        self.table
            .raw_remove(hash_code, |e| e.key.borrow() == key)
            .map(|e| e.value)
    }

    /// Spec §4.5 "find-or-insert convenience".
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V
    where
        K: Clone,
    {
        let hash_code = hash::hash_one(&key);
        let lookup_key = key.clone();
        let entry = self
            .table
            .raw_get_or_insert_with(hash_code, move |e| e.key == lookup_key, move || Entry {
                key,
                value: make(),
            });
        &mut entry.value
    }

    /// Spec §4.5 "version-checked value_ref type for subscript access that
    /// delays insertion until assignment": reading never inserts; only
    /// `ValueRef::set`/`or_insert_with` commit a fresh entry.
    pub fn value_ref(&mut self, key: K) -> ValueRef<'_, K, V, B> {
        ValueRef { map: self, key }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.table.iter().map(|e| (&e.key, &e.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.table.iter().map(|e| &e.key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.table.iter().map(|e| &e.value)
    }
}

pub struct ValueRef<'a, K, V, B: BucketPolicy<Entry<K, V>>> {
    map: &'a mut HashMap<K, V, B>,
    key: K,
}

impl<'a, K: Hash + Eq, V, B: BucketPolicy<Entry<K, V>>> ValueRef<'a, K, V, B> {
    pub fn get(&self) -> Option<&V> {
        self.map.get(&self.key)
    }

    pub fn get_mut(&mut self) -> Option<&mut V> {
        self.map.get_mut(&self.key)
    }

    /// Commits the value unconditionally, inserting a fresh entry or
    /// overwriting an existing one. Returns the value this replaced, if
    /// any — the point at which a no-op lookup turns into a real insert.
    pub fn set(self, value: V) -> Option<V> {
        self.map.insert(self.key, value)
    }

    pub fn or_insert_with(self, make: impl FnOnce() -> V) -> &'a mut V
    where
        K: Clone,
    {
        self.map.get_or_insert_with(self.key, make)
    }

    pub fn or_insert(self, default: V) -> &'a mut V
    where
        K: Clone,
    {
        self.or_insert_with(|| default)
    }
}

/// Hash map from key to a value-array (spec §4.5 "Hash multi-map"). A key
/// with zero values is allowed to exist transiently — `insert` never
/// removes an emptied entry on its own.
pub struct HashMultiMap<K, V, B: BucketPolicy<KeyEntry<K, V>>> {
    table: RawTable<KeyEntry<K, V>, B>,
    value_params: UnlimPParams<V>,
    value_count: usize,
    value_version: u64,
}

pub struct KeyEntry<K, V> {
    pub key: K,
    values: UnlimP<V>,
}

impl<K: Hash, V> Hash for KeyEntry<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}

impl<K: PartialEq, V> PartialEq for KeyEntry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Eq, V> Eq for KeyEntry<K, V> {}

impl<K, V, B: BucketPolicy<KeyEntry<K, V>>> Default for HashMultiMap<K, V, B> {
    fn default() -> Self {
        Self {
            table: RawTable::default(),
            value_params: UnlimPParams::default(),
            value_count: 0,
            value_version: 0,
        }
    }
}

impl<K: Hash + Eq, V, B: BucketPolicy<KeyEntry<K, V>>> HashMultiMap<K, V, B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_count(&self) -> usize {
        self.table.len()
    }

    pub fn value_count(&self) -> usize {
        self.value_count
    }

    /// Spec §4.5 "a value-version counter incremented on any value
    /// insertion or removal" (distinct from the inner table's own
    /// `change_version`, which only tracks key-level structural change).
    pub fn value_version(&self) -> u64 {
        self.value_version
    }

    pub fn insert(&mut self, key: K, value: V)
    where
        K: Clone,
    {
        let hash_code = hash::hash_one(&key);
        let lookup_key = key.clone();
        let entry = self.table.raw_get_or_insert_with(
            hash_code,
            move |e| e.key == lookup_key,
            move || KeyEntry { key, values: UnlimP::default() },
        );
        entry
            .values
            .add(&mut self.value_params, 0, value)
            .ok()
            .expect("UnlimP never rejects an add");
        self.value_count += 1;
        self.value_version += 1;
    }

    /// Lookup by key returns the key's values (spec §4.5 "Lookup by key
    /// returns the key-iterator; value iteration proceeds from there").
    pub fn get<Q>(&self, key: &Q) -> &[V]
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash_code = hash::hash_one(key);
        match self.table.raw_find(hash_code, |e| e.key.borrow() == key) {
            Some(entry) => entry.values.bounds(),
            None => &[],
        }
    }

    /// Removes a key and every value under it, returning them.
    pub fn remove_key<Q>(&mut self, key: &Q) -> Option<Vec<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash_code = hash::hash_one(key);
        let mut removed = self.table.raw_remove(hash_code, |e| e.key.borrow() == key)?;
        let values = removed.values.take_all(&mut self.value_params);
        self.value_count -= values.len();
        self.value_version += 1;
        Some(values)
    }

    /// Walks keys, and within each key walks values, skipping empty keys
    /// automatically (spec §4.5).
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.table
            .iter()
            .flat_map(|entry| entry.values.bounds().iter().map(move |v| (&entry.key, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::OpenN1;

    #[test]
    fn insert_replace_remove() {
        let mut m: HashMap<&'static str, u32, OpenN1<Entry<&'static str, u32>>> = HashMap::new();
        assert_eq!(m.insert("a", 1), None);
        assert_eq!(m.insert("a", 2), Some(1));
        assert_eq!(m.get("a"), Some(&2));
        assert_eq!(m.remove("a"), Some(2));
        assert_eq!(m.get("a"), None);
    }

    #[test]
    fn value_ref_delays_insertion_until_set() {
        let mut m: HashMap<&'static str, u32, OpenN1<Entry<&'static str, u32>>> = HashMap::new();
        assert!(m.value_ref("a").get().is_none());
        assert_eq!(m.len(), 0);
        m.value_ref("a").set(5);
        assert_eq!(m.get("a"), Some(&5));
    }

    #[test]
    fn value_ref_or_insert_constructs_once() {
        let mut m: HashMap<&'static str, u32, OpenN1<Entry<&'static str, u32>>> = HashMap::new();
        *m.value_ref("a").or_insert(0) += 1;
        *m.value_ref("a").or_insert(0) += 1;
        assert_eq!(m.get("a"), Some(&2));
    }

    #[test]
    fn multimap_groups_values_under_their_key() {
        let mut mm: HashMultiMap<&'static str, u32, OpenN1<KeyEntry<&'static str, u32>>> =
            HashMultiMap::new();
        mm.insert("a", 1);
        mm.insert("a", 2);
        mm.insert("b", 3);
        assert_eq!(mm.key_count(), 2);
        assert_eq!(mm.value_count(), 3);
        assert_eq!(mm.get("a"), &[1, 2]);
        assert_eq!(mm.get("b"), &[3]);
        assert_eq!(mm.get("missing"), &[] as &[u32]);
    }

    #[test]
    fn multimap_remove_key_drains_all_its_values() {
        let mut mm: HashMultiMap<&'static str, u32, OpenN1<KeyEntry<&'static str, u32>>> =
            HashMultiMap::new();
        mm.insert("a", 1);
        mm.insert("a", 2);
        let removed = mm.remove_key("a").unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(mm.value_count(), 0);
        assert_eq!(mm.key_count(), 0);
    }
}
