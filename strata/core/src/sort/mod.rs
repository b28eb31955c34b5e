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

//! Distributed multi-key sort.
//!
//! [`SortOperator`] turns a partitioned dataset into one whose concatenated
//! partitions are totally ordered by a [`SortSpec`]:
//!
//! 1. every input partition is sampled in parallel,
//! 2. the combined sample is sorted and split points are chosen,
//! 3. rows are shuffled to the range their key falls in,
//! 4. every output partition is sorted locally, again in parallel.
//!
//! Output partition `i` only holds rows ordering at or before every row of
//! partition `i + 1`. Equal rows keep the order they had in the concatenated
//! input.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::comparator::RowComparator;
use crate::config::StrataConfig;
use crate::dataset::Dataset;
use crate::error::{Result, StrataError};
use crate::ordering::{OrderingTag, SortSpec};
use crate::partition::Partition;
use crate::shuffle::ShuffleExchange;
use crate::types::SchemaRef;
use crate::utils::{run_blocking_tasks, TaskContext};

mod local;
mod range;

pub use local::sort_partition;
pub use range::{sample_partition, select_split_points, RangePartitioner};

/// Tunables of the range partitioning step. None of them affects the result,
/// only how evenly rows spread over the output partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    /// Rows sampled from every input partition.
    pub sample_size: usize,
    /// Number of output partitions; the input partition count when `None`.
    pub target_partitions: Option<usize>,
    pub seed: u64,
}

impl SortOptions {
    pub fn from_config(config: &StrataConfig) -> Self {
        Self {
            sample_size: config.sort_sample_size(),
            target_partitions: config.sort_target_partitions(),
            seed: config.sort_sample_seed(),
        }
    }

    pub fn with_target_partitions(mut self, target_partitions: Option<usize>) -> Self {
        self.target_partitions = target_partitions;
        self
    }
}

impl Default for SortOptions {
    fn default() -> Self {
        Self::from_config(&StrataConfig::default())
    }
}

/// Globally sorts a dataset.
#[derive(Debug, Clone)]
pub struct SortOperator {
    schema: SchemaRef,
    comparator: Arc<RowComparator>,
    options: SortOptions,
}

impl SortOperator {
    /// Validates `spec` against `schema`; fails with
    /// [`StrataError::InvalidSortKey`] before any data is touched.
    pub fn try_new(schema: SchemaRef, spec: &SortSpec, options: SortOptions) -> Result<Self> {
        let comparator = Arc::new(RowComparator::try_new(&schema, spec)?);
        Ok(Self {
            schema,
            comparator,
            options,
        })
    }

    pub fn spec(&self) -> &SortSpec {
        self.comparator.spec()
    }

    pub fn options(&self) -> &SortOptions {
        &self.options
    }

    /// Number of output partitions for an input of `num_partitions`
    /// partitions holding `num_rows` rows in total. Never more than one
    /// partition per row, and at least one.
    pub fn output_partitions(&self, num_partitions: usize, num_rows: usize) -> usize {
        self.options
            .target_partitions
            .unwrap_or(num_partitions)
            .min(num_rows)
            .max(1)
    }

    /// Sorts `input`. The input is never modified; on failure nothing is
    /// returned and every intermediate partition is discarded.
    pub async fn execute(&self, input: &Dataset, ctx: &TaskContext) -> Result<Dataset> {
        let start = Instant::now();
        let output = self
            .sort(input, ctx)
            .await
            .map_err(StrataError::into_sort_execution_error)?;
        info!(
            "Sorted {} rows in {} partitions into {} partitions on [{}] in {} ms",
            output.num_rows(),
            input.num_partitions(),
            output.num_partitions(),
            self.spec(),
            start.elapsed().as_millis()
        );
        Ok(output)
    }

    async fn sort(&self, input: &Dataset, ctx: &TaskContext) -> Result<Dataset> {
        if input.schema() != &self.schema {
            return Err(StrataError::Schema(format!(
                "sort was planned for {} but the input has {}",
                self.schema,
                input.schema()
            )));
        }
        ctx.cancellation().check()?;

        let num_rows = input.num_rows();
        let ordering = OrderingTag::OrderedOn(self.spec().clone());
        if num_rows == 0 {
            return Ok(Dataset::empty(self.schema.clone()).with_ordering(ordering));
        }

        let num_ranges = self.output_partitions(input.num_partitions(), num_rows);
        let partitions = if num_ranges == 1 {
            vec![self.sort_single_range(input, ctx).await?]
        } else {
            self.sort_ranges(input, num_ranges, ctx).await?
        };

        ctx.cancellation().check()?;
        Ok(Dataset::try_new(self.schema.clone(), partitions)?.with_ordering(ordering))
    }

    /// Everything ends up in one partition, so no shuffle is needed.
    async fn sort_single_range(&self, input: &Dataset, ctx: &TaskContext) -> Result<Partition> {
        let parts: Vec<Partition> = input
            .partitions()
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.as_ref().clone())
            .collect();
        let schema = self.schema.clone();
        let comparator = self.comparator.clone();
        let mut sorted = run_blocking_tasks(ctx, vec![parts], move |_, parts| {
            let combined = Partition::concat(schema.clone(), &parts)?;
            sort_partition(&combined, &comparator)
        })
        .await?;
        sorted
            .pop()
            .ok_or_else(|| StrataError::Internal("single range sort lost its output".to_string()))
    }

    async fn sort_ranges(
        &self,
        input: &Dataset,
        num_ranges: usize,
        ctx: &TaskContext,
    ) -> Result<Vec<Partition>> {
        let SortOptions {
            sample_size, seed, ..
        } = self.options;
        let samples = run_blocking_tasks(
            ctx,
            input.partitions().to_vec(),
            move |index, partition| sample_partition(&partition, sample_size.max(1), seed, index),
        )
        .await?;
        ctx.cancellation().check()?;

        let sample = Partition::concat(self.schema.clone(), &samples)?;
        let sorted_sample = sort_partition(&sample, &self.comparator)?;
        let split_points = select_split_points(&sorted_sample, &self.comparator, num_ranges)?;
        debug!(
            "Chose {} split points from a sample of {} rows",
            split_points.num_rows(),
            sorted_sample.num_rows()
        );

        let partitioner = RangePartitioner::try_new(self.comparator.clone(), split_points)?;
        let exchange = ShuffleExchange::new(Arc::new(partitioner));
        let ranges = exchange
            .execute(self.schema.clone(), input.partitions().to_vec(), ctx)
            .await?;

        let non_empty: Vec<Partition> = ranges.into_iter().filter(|p| !p.is_empty()).collect();
        let comparator = self.comparator.clone();
        run_blocking_tasks(ctx, non_empty, move |index, partition| {
            debug!("Sorting range {index} of {} rows", partition.num_rows());
            sort_partition(&partition, &comparator)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::SortField;
    use crate::types::{Field, LogicalType, Schema};
    use crate::utils::CancellationToken;
    use arrow::array::{AsArray, Int64Array};
    use arrow::datatypes::Int64Type;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn schema() -> SchemaRef {
        Arc::new(
            Schema::try_new(vec![
                Field::new("k", LogicalType::Int64),
                Field::new("row", LogicalType::Int64),
            ])
            .unwrap(),
        )
    }

    fn dataset(partitions: Vec<Vec<i64>>) -> Dataset {
        let mut row = 0;
        let parts = partitions
            .into_iter()
            .map(|keys| {
                let rows: Vec<i64> = keys
                    .iter()
                    .map(|_| {
                        row += 1;
                        row - 1
                    })
                    .collect();
                Partition::try_from_columns(
                    schema(),
                    vec![
                        Arc::new(Int64Array::from(keys)),
                        Arc::new(Int64Array::from(rows)),
                    ],
                )
                .unwrap()
            })
            .collect();
        Dataset::try_new(schema(), parts).unwrap()
    }

    fn column(dataset: &Dataset, index: usize) -> Vec<Vec<i64>> {
        dataset
            .partitions()
            .iter()
            .map(|p| p.column(index).unwrap().as_primitive::<Int64Type>().values().to_vec())
            .collect()
    }

    fn spec() -> SortSpec {
        SortSpec::try_new(vec![SortField::asc("k")]).unwrap()
    }

    fn operator(target_partitions: Option<usize>) -> SortOperator {
        let options = SortOptions::default().with_target_partitions(target_partitions);
        SortOperator::try_new(schema(), &spec(), options).unwrap()
    }

    #[tokio::test]
    async fn sorts_across_partitions() -> Result<()> {
        let input = dataset(vec![vec![5, 3, 8], vec![1, 3], vec![7, 2, 6, 4]]);
        let output = operator(None).execute(&input, &TaskContext::default()).await?;

        assert!(output.is_sorted(&spec())?);
        assert!(output.ordering().is_ordered_on(&spec()));
        assert!(output.num_partitions() <= 3);
        let keys: Vec<i64> = column(&output, 0).concat();
        assert_eq!(keys, vec![1, 2, 3, 3, 4, 5, 6, 7, 8]);
        // the two 3s keep their input order
        let rows: Vec<i64> = column(&output, 1).concat();
        assert_eq!(&rows[2..4], &[1, 4]);
        assert_eq!(column(&input, 0)[0], vec![5, 3, 8]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_input_yields_one_empty_partition() -> Result<()> {
        let input = dataset(vec![vec![], vec![]]);
        let output = operator(Some(4)).execute(&input, &TaskContext::default()).await?;
        assert_eq!(output.num_partitions(), 1);
        assert_eq!(output.num_rows(), 0);
        assert!(output.ordering().is_ordered_on(&spec()));
        Ok(())
    }

    #[tokio::test]
    async fn fewer_rows_than_partitions() -> Result<()> {
        let input = dataset(vec![vec![2], vec![], vec![1], vec![], vec![]]);
        let output = operator(None).execute(&input, &TaskContext::default()).await?;
        assert!(output.num_partitions() <= 2);
        assert_eq!(column(&output, 0).concat(), vec![1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn random_inputs_match_a_stable_reference() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(42);
        for case in 0..20 {
            let num_partitions = rng.random_range(1..6);
            let partitions: Vec<Vec<i64>> = (0..num_partitions)
                .map(|_| {
                    let len = rng.random_range(0..40);
                    (0..len).map(|_| rng.random_range(-5..5)).collect()
                })
                .collect();
            let input = dataset(partitions.clone());
            let target = rng.random_range(1..8);
            let output = operator(Some(target))
                .execute(&input, &TaskContext::default())
                .await?;

            let mut expected: Vec<(i64, i64)> = partitions
                .concat()
                .into_iter()
                .enumerate()
                .map(|(row, k)| (k, row as i64))
                .collect();
            expected.sort_by_key(|(k, _)| *k);
            let actual: Vec<(i64, i64)> = column(&output, 0)
                .concat()
                .into_iter()
                .zip(column(&output, 1).concat())
                .collect();
            assert_eq!(actual, expected, "case {case}");
            assert!(output.num_partitions() <= target.max(1));
        }
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_sort_returns_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = TaskContext::default().with_cancellation(token);
        let input = dataset(vec![vec![3, 1], vec![2]]);
        let result = operator(None).execute(&input, &ctx).await;
        assert!(matches!(result, Err(StrataError::Cancelled)));
    }

    #[test]
    fn rejects_unsortable_keys_up_front() {
        let schema = Arc::new(
            Schema::try_new(vec![Field::new("blob", LogicalType::Binary)]).unwrap(),
        );
        let spec = SortSpec::try_new(vec![SortField::asc("blob")]).unwrap();
        let result = SortOperator::try_new(schema, &spec, SortOptions::default());
        assert!(matches!(result, Err(StrataError::InvalidSortKey(_))));
    }
}
