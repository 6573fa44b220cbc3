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

use super::imp::{BitmaskWord, BITMASK_MASK, BITMASK_STRIDE};

#[derive(Clone, Copy)]
pub struct Bitmask(pub BitmaskWord);

impl Bitmask {
    pub fn invert(self) -> Self {
        Self(self.0 ^ BITMASK_MASK)
    }

    pub fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.trailing_zeros())
        }
    }

    pub fn remove_lowest_bit(self) -> Self {
        Bitmask(self.0 & (self.0 - 1))
    }

    pub fn any_bit_set(self) -> bool {
        self.0 != 0
    }

    pub fn trailing_zeros(self) -> usize {
        self.0.trailing_zeros() as usize / BITMASK_STRIDE
    }
}

pub struct BitmaskIterator(Bitmask);

impl Iterator for BitmaskIterator {
    type Item = usize;
    fn next(&mut self) -> Option<usize> {
        let bit = self.0.lowest_set_bit()?;
        self.0 = self.0.remove_lowest_bit();
        Some(bit)
    }
}

impl IntoIterator for Bitmask {
    type IntoIter = BitmaskIterator;
    type Item = usize;
    fn into_iter(self) -> Self::IntoIter {
        BitmaskIterator(self)
    }
}
