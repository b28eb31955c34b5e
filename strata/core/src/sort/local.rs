// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Stable sort of a single partition.

use arrow::array::UInt32Array;

use crate::comparator::RowComparator;
use crate::error::Result;
use crate::partition::Partition;
use crate::shuffle::row_index;

/// Returns a copy of `partition` with its rows ordered by `comparator`.
///
/// The sort is stable: rows comparing equal keep their relative order. The
/// input partition is left untouched. Key columns that do not match the
/// comparator fail with [`crate::error::StrataError::ComparisonError`].
pub fn sort_partition(partition: &Partition, comparator: &RowComparator) -> Result<Partition> {
    let batch = partition.batch();
    let bound = comparator.bind(batch, batch)?;
    let num_rows = partition.num_rows();
    if (1..num_rows).all(|row| bound.compare(row - 1, row).is_le()) {
        return Ok(partition.clone());
    }

    let mut indices = (0..row_index(num_rows)?).collect::<Vec<u32>>();
    indices.sort_by(|l, r| bound.compare(*l as usize, *r as usize));
    partition.take(&UInt32Array::from(indices))
}
