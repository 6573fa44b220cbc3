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

//! `max_count = 1` (spec §4.3 "OneI"). The original has `_1`/`_IA`
//! variants distinguished only by where the empty/full/removed state byte
//! lives relative to the item; in Rust that's an `Option<T>` plus one
//! `bool`, with no payload-colocation decision to make.

use crate::bucket::{AddRejected, BucketPolicy, MaxCount};

pub struct OneI<T> {
    slot: Option<T>,
    was_full: bool,
}

impl<T> Default for OneI<T> {
    fn default() -> Self {
        Self {
            slot: None,
            was_full: false,
        }
    }
}

impl<T> BucketPolicy<T> for OneI<T> {
    type Params = ();

    const MAX_COUNT: MaxCount = MaxCount::Bounded(1);

    fn bounds(&self) -> &[T] {
        match &self.slot {
            Some(item) => core::slice::from_ref(item),
            None => &[],
        }
    }

    fn bounds_mut(&mut self) -> &mut [T] {
        match &mut self.slot {
            Some(item) => core::slice::from_mut(item),
            None => &mut [],
        }
    }

    fn add(&mut self, _params: &mut (), _hash_code: u64, item: T) -> Result<(), AddRejected<T>> {
        if self.slot.is_some() {
            return Err(AddRejected(item));
        }
        self.slot = Some(item);
        self.was_full = true;
        Ok(())
    }

    fn remove(&mut self, _params: &mut (), index: usize) -> T {
        assert_eq!(index, 0, "OneI: only index 0 is valid");
        self.slot.take().expect("remove on empty bucket")
    }

    fn is_full(&self) -> bool {
        self.slot.is_some()
    }

    fn was_full(&self) -> bool {
        self.was_full
    }

    fn clear(&mut self, _params: &mut ()) {
        self.slot = None;
        self.was_full = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn was_full_is_monotone_until_clear() {
        let mut b: OneI<u32> = OneI::default();
        assert!(!b.was_full());
        b.add(&mut (), 0, 1).ok().unwrap();
        assert!(b.was_full());
        b.remove(&mut (), 0);
        assert!(b.was_full(), "was_full must survive a remove");
        b.clear(&mut ());
        assert!(!b.was_full());
    }

    #[test]
    fn second_add_is_rejected() {
        let mut b: OneI<u32> = OneI::default();
        b.add(&mut (), 0, 1).ok().unwrap();
        assert!(b.add(&mut (), 0, 2).is_err());
    }
}
