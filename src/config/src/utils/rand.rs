// Copyright 2025 OpenObserve Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use rand::{
    Rng,
    distributions::{Alphanumeric, DistString},
};

pub fn get_rand_element<T>(arr: &[T]) -> &T {
    &arr[rand::thread_rng().gen_range(0..arr.len())]
}

pub fn get_rand_index(len: usize) -> usize {
    rand::thread_rng().gen_range(0..len)
}

pub fn generate_random_string(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

/// Random u32 rendered as 8 hex chars, used to salt staged blob names.
pub fn generate_random_hex8() -> String {
    format!("{:08x}", rand::thread_rng().r#gen::<u32>())
}
