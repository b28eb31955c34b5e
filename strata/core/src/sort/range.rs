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

//! Sampling based range partitioning.
//!
//! Every input partition contributes a bounded random sample. The combined
//! sample is sorted and split points are taken at evenly spaced quantiles.
//! Split point `i` is the inclusive upper bound of range `i`; the last range
//! is unbounded, so a row equal to a split point always lands in the lower
//! range.

use std::cmp::Ordering;
use std::sync::Arc;

use arrow::array::UInt32Array;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::comparator::RowComparator;
use crate::error::{Result, StrataError};
use crate::partition::Partition;
use crate::shuffle::{row_index, Partitioner};

/// Draws up to `sample_size` rows of `partition` without replacement.
///
/// The draw only depends on `seed`, `input_index` and the size of the
/// partition; sampled rows keep their relative order.
pub fn sample_partition(
    partition: &Partition,
    sample_size: usize,
    seed: u64,
    input_index: usize,
) -> Result<Partition> {
    let num_rows = partition.num_rows();
    if num_rows <= sample_size {
        return Ok(partition.clone());
    }
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(input_index as u64));
    let mut rows = rand::seq::index::sample(&mut rng, num_rows, sample_size).into_vec();
    rows.sort_unstable();
    let indices = rows
        .into_iter()
        .map(row_index)
        .collect::<Result<Vec<u32>>>()?;
    partition.take(&UInt32Array::from(indices))
}

/// Picks at most `num_ranges - 1` split points from `sorted_sample`, which
/// must already be ordered by `comparator`.
///
/// Split points sit at evenly spaced quantiles of the sample. Consecutive
/// split points comparing equal are collapsed, so heavily duplicated keys
/// yield fewer ranges.
pub fn select_split_points(
    sorted_sample: &Partition,
    comparator: &RowComparator,
    num_ranges: usize,
) -> Result<Partition> {
    let sample_rows = sorted_sample.num_rows();
    if num_ranges < 2 || sample_rows == 0 {
        return Ok(sorted_sample.slice(0, 0));
    }
    let batch = sorted_sample.batch();
    let bound = comparator.bind(batch, batch)?;

    let mut splits: Vec<usize> = Vec::with_capacity(num_ranges - 1);
    for i in 1..num_ranges {
        let position = (i * sample_rows / num_ranges).saturating_sub(1);
        match splits.last() {
            Some(last) if bound.compare(*last, position) != Ordering::Less => {}
            _ => splits.push(position),
        }
    }
    let indices = splits
        .into_iter()
        .map(row_index)
        .collect::<Result<Vec<u32>>>()?;
    sorted_sample.take(&UInt32Array::from(indices))
}

/// Sends every row to the range its sort key falls in.
#[derive(Debug)]
pub struct RangePartitioner {
    comparator: Arc<RowComparator>,
    split_points: Partition,
}

impl RangePartitioner {
    /// `split_points` must be strictly increasing under `comparator`.
    pub fn try_new(comparator: Arc<RowComparator>, split_points: Partition) -> Result<Self> {
        let batch = split_points.batch();
        let bound = comparator.bind(batch, batch)?;
        if (1..batch.num_rows()).any(|row| bound.compare(row - 1, row) != Ordering::Less) {
            return Err(StrataError::Internal(
                "range split points are not strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            comparator,
            split_points,
        })
    }

    pub fn split_points(&self) -> &Partition {
        &self.split_points
    }
}

impl Partitioner for RangePartitioner {
    fn num_output_partitions(&self) -> usize {
        self.split_points.num_rows() + 1
    }

    fn partition_rows(&self, _input_index: usize, partition: &Partition) -> Result<Vec<usize>> {
        let bound = self
            .comparator
            .bind(partition.batch(), self.split_points.batch())?;
        let num_splits = self.split_points.num_rows();
        Ok((0..partition.num_rows())
            .map(|row| {
                // first split point the row does not exceed
                let (mut low, mut high) = (0, num_splits);
                while low < high {
                    let mid = low + (high - low) / 2;
                    if bound.compare(row, mid) == Ordering::Greater {
                        low = mid + 1;
                    } else {
                        high = mid;
                    }
                }
                low
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::{SortField, SortSpec};
    use crate::types::{Field, LogicalType, Schema, SchemaRef};
    use arrow::array::{AsArray, Int64Array};
    use arrow::datatypes::Int64Type;

    fn schema() -> SchemaRef {
        Arc::new(Schema::try_new(vec![Field::new("k", LogicalType::Int64)]).unwrap())
    }

    fn partition(values: Vec<Option<i64>>) -> Partition {
        Partition::try_from_columns(schema(), vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    fn values(partition: &Partition) -> Vec<i64> {
        partition.column(0).unwrap().as_primitive::<Int64Type>().values().to_vec()
    }

    fn comparator(descending: bool) -> Arc<RowComparator> {
        let spec = SortSpec::try_new(vec![SortField::new("k", descending)]).unwrap();
        Arc::new(RowComparator::try_new(&schema(), &spec).unwrap())
    }

    #[test]
    fn sample_is_bounded_and_deterministic() -> Result<()> {
        let input = partition((0..1000).map(Some).collect());
        let a = sample_partition(&input, 16, 7, 3)?;
        let b = sample_partition(&input, 16, 7, 3)?;
        assert_eq!(a.num_rows(), 16);
        assert_eq!(values(&a), values(&b));
        assert!(values(&a).windows(2).all(|w| w[0] < w[1]));

        let small = partition(vec![Some(3), Some(1)]);
        assert_eq!(sample_partition(&small, 16, 7, 0)?, small);
        Ok(())
    }

    #[test]
    fn split_points_at_even_quantiles() -> Result<()> {
        let sample = partition((1..=8).map(Some).collect());
        let splits = select_split_points(&sample, &comparator(false), 4)?;
        assert_eq!(values(&splits), vec![2, 4, 6]);

        let splits = select_split_points(&sample, &comparator(false), 1)?;
        assert!(splits.is_empty());
        Ok(())
    }

    #[test]
    fn duplicated_split_points_collapse() -> Result<()> {
        let sample = partition(vec![Some(1), Some(1), Some(1), Some(1), Some(1), Some(9)]);
        let splits = select_split_points(&sample, &comparator(false), 3)?;
        assert_eq!(values(&splits), vec![1]);
        Ok(())
    }

    #[test]
    fn ties_go_to_the_lower_range() -> Result<()> {
        let splits = partition(vec![Some(2), Some(4)]);
        let partitioner = RangePartitioner::try_new(comparator(false), splits)?;
        assert_eq!(partitioner.num_output_partitions(), 3);
        let rows = partition(vec![Some(1), Some(2), Some(3), Some(4), Some(5), None]);
        assert_eq!(partitioner.partition_rows(0, &rows)?, vec![0, 0, 1, 1, 2, 0]);
        Ok(())
    }

    #[test]
    fn descending_ranges() -> Result<()> {
        let splits = partition(vec![Some(4), Some(2)]);
        let partitioner = RangePartitioner::try_new(comparator(true), splits)?;
        let rows = partition(vec![Some(5), Some(4), Some(3), Some(1), None]);
        assert_eq!(partitioner.partition_rows(0, &rows)?, vec![0, 0, 1, 2, 2]);

        let unordered = partition(vec![Some(2), Some(4)]);
        assert!(RangePartitioner::try_new(comparator(true), unordered).is_err());
        Ok(())
    }
}
