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

//! All-to-all redistribution of partitions.
//!
//! A shuffle runs in two stages. The map side splits every input partition
//! into one bucket per output partition, as decided by a [`Partitioner`], and
//! writes the non-empty buckets to the [`PartitionStore`] of the task
//! context. The reduce side then takes the buckets of each output partition
//! in input order and concatenates them, so rows keep their relative order
//! from the concatenated input.
//!
//! The output is only returned once every output partition is complete. On
//! failure or cancellation every bucket written so far is deleted and the
//! inputs are left untouched. Either way the shuffle's namespace in the store
//! is released before `execute` returns.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use arrow::array::UInt32Array;
use futures::{StreamExt, TryStreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{Result, StrataError};
use crate::partition::Partition;
use crate::partition_store::PartitionStore;
use crate::types::SchemaRef;
use crate::utils::{run_blocking_tasks, TaskContext};

/// Decides which output partition every row of an input partition goes to.
pub trait Partitioner: Send + Sync + fmt::Debug {
    /// Number of output partitions produced.
    fn num_output_partitions(&self) -> usize;

    /// Returns the output partition of every row of `partition`, which is the
    /// `input_index`-th input of the shuffle.
    fn partition_rows(&self, input_index: usize, partition: &Partition) -> Result<Vec<usize>>;
}

/// Splits `partition` into `(output, bucket)` pairs following `assignment`.
/// Empty buckets are skipped and rows keep their relative order.
pub fn split_partition(
    partition: &Partition,
    assignment: &[usize],
    num_outputs: usize,
) -> Result<Vec<(usize, Partition)>> {
    if assignment.len() != partition.num_rows() {
        return Err(StrataError::Internal(format!(
            "partitioner assigned {} rows of a partition with {} rows",
            assignment.len(),
            partition.num_rows()
        )));
    }
    let mut indices: Vec<Vec<u32>> = vec![Vec::new(); num_outputs];
    for (row, output) in assignment.iter().enumerate() {
        let bucket = indices.get_mut(*output).ok_or_else(|| {
            StrataError::Internal(format!(
                "row assigned to output partition {output} of {num_outputs}"
            ))
        })?;
        bucket.push(row_index(row)?);
    }
    indices
        .into_iter()
        .enumerate()
        .filter(|(_, rows)| !rows.is_empty())
        .map(|(output, rows)| {
            if rows.len() == partition.num_rows() {
                Ok((output, partition.clone()))
            } else {
                Ok((output, partition.take(&UInt32Array::from(rows))?))
            }
        })
        .collect()
}

pub(crate) fn row_index(row: usize) -> Result<u32> {
    u32::try_from(row).map_err(|_| {
        StrataError::General(format!(
            "row {row} exceeds the maximum partition size of {} rows",
            u32::MAX
        ))
    })
}

/// Path of the bucket sent from `input` to `output` by shuffle `shuffle_id`.
fn bucket_path(shuffle_id: &str, output: usize, input: usize) -> String {
    format!("{shuffle_id}/{output}/{input}")
}

/// A single shuffle over the partitions of a dataset.
#[derive(Debug)]
pub struct ShuffleExchange {
    shuffle_id: String,
    partitioner: Arc<dyn Partitioner>,
}

impl ShuffleExchange {
    pub fn new(partitioner: Arc<dyn Partitioner>) -> Self {
        Self {
            shuffle_id: Uuid::new_v4().to_string(),
            partitioner,
        }
    }

    pub fn shuffle_id(&self) -> &str {
        &self.shuffle_id
    }

    pub fn num_output_partitions(&self) -> usize {
        self.partitioner.num_output_partitions()
    }

    /// Redistributes `inputs` into [`ShuffleExchange::num_output_partitions`]
    /// partitions. Output partitions may be empty.
    pub async fn execute(
        &self,
        schema: SchemaRef,
        inputs: Vec<Arc<Partition>>,
        ctx: &TaskContext,
    ) -> Result<Vec<Partition>> {
        let start = Instant::now();
        let written = Arc::new(Mutex::new(HashSet::new()));
        let result = self.exchange(schema, inputs, ctx, &written).await;
        match &result {
            Ok(outputs) => info!(
                "Shuffle {} produced {} partitions in {} ms",
                self.shuffle_id,
                outputs.len(),
                start.elapsed().as_millis()
            ),
            Err(e) => {
                warn!("Shuffle {} failed, discarding its buckets: {e}", self.shuffle_id);
                let leftovers: Vec<String> = written.lock().drain().collect();
                discard_buckets(ctx.store().as_ref(), leftovers).await;
            }
        }
        if let Err(e) = ctx.store().delete_prefix(&self.shuffle_id).await {
            warn!("Failed to release shuffle {}: {e}", self.shuffle_id);
        }
        result
    }

    async fn exchange(
        &self,
        schema: SchemaRef,
        inputs: Vec<Arc<Partition>>,
        ctx: &TaskContext,
        written: &Arc<Mutex<HashSet<String>>>,
    ) -> Result<Vec<Partition>> {
        let num_outputs = self.partitioner.num_output_partitions();
        let num_inputs = inputs.len();

        // map side: split every input partition into buckets
        let partitioner = self.partitioner.clone();
        let buckets = run_blocking_tasks(ctx, inputs, move |input_index, input| {
            let assignment = partitioner.partition_rows(input_index, &input)?;
            split_partition(&input, &assignment, num_outputs)
        })
        .await?;
        ctx.cancellation().check()?;

        let store = ctx.store().clone();
        let shuffle_id = self.shuffle_id.clone();
        let writes = buckets.into_iter().enumerate().flat_map(|(input, parts)| {
            parts
                .into_iter()
                .map(move |(output, part)| (input, output, part))
        });
        let locations: Vec<(usize, String)> = futures::stream::iter(writes.map(
            |(input, output, part)| {
                let store = store.clone();
                let path = bucket_path(&shuffle_id, output, input);
                let written = written.clone();
                let cancellation = ctx.cancellation().clone();
                async move {
                    cancellation.check()?;
                    written.lock().insert(path.clone());
                    let stats = store.store_partition(&path, part).await?;
                    debug!("Wrote shuffle bucket {path}: {stats}");
                    Ok::<_, StrataError>((output, path))
                }
            },
        ))
        .buffered(ctx.parallelism())
        .try_collect()
        .await?;
        ctx.cancellation().check()?;

        // buckets were written in input order, so every output sees its
        // pieces ordered by input partition
        let mut per_output: Vec<Vec<String>> = vec![Vec::new(); num_outputs];
        for (output, path) in locations {
            per_output[output].push(path);
        }
        debug!(
            "Shuffle {} map side done: {num_inputs} inputs, {num_outputs} outputs",
            self.shuffle_id
        );

        // reduce side: collect the buckets of every output partition
        let outputs: Vec<Partition> = futures::stream::iter(per_output.into_iter().map(|paths| {
            let store = store.clone();
            let schema = schema.clone();
            let written = written.clone();
            let cancellation = ctx.cancellation().clone();
            async move {
                cancellation.check()?;
                let mut parts = Vec::with_capacity(paths.len());
                for path in paths {
                    parts.push(store.take_partition(&path).await?);
                    written.lock().remove(&path);
                }
                Partition::concat(schema, &parts)
            }
        }))
        .buffered(ctx.parallelism())
        .try_collect()
        .await?;

        ctx.cancellation().check()?;
        Ok(outputs)
    }
}

async fn discard_buckets(store: &dyn PartitionStore, paths: Vec<String>) {
    for path in paths {
        if let Err(e) = store.delete_partition(&path).await {
            warn!("Failed to discard shuffle bucket {path}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrataConfig;
    use crate::partition_store::{DiskPartitionStore, InMemoryPartitionStore, PartitionStats};
    use crate::types::{Field, LogicalType, Schema};
    use crate::utils::CancellationToken;
    use arrow::array::{AsArray, Int64Array};
    use arrow::datatypes::Int64Type;
    use async_trait::async_trait;

    /// Sends every row to `value % n`.
    #[derive(Debug)]
    struct ModuloPartitioner(usize);

    impl Partitioner for ModuloPartitioner {
        fn num_output_partitions(&self) -> usize {
            self.0
        }

        fn partition_rows(&self, _: usize, partition: &Partition) -> Result<Vec<usize>> {
            Ok(partition
                .column(0)
                .unwrap()
                .as_primitive::<Int64Type>()
                .values()
                .iter()
                .map(|v| (*v as usize) % self.0)
                .collect())
        }
    }

    /// Store that fails every write after the first `allowed` ones.
    #[derive(Debug)]
    struct FlakyStore<S> {
        inner: S,
        allowed: Mutex<usize>,
    }

    #[async_trait]
    impl<S: PartitionStore> PartitionStore for FlakyStore<S> {
        async fn store_partition(&self, path: &str, partition: Partition) -> Result<PartitionStats> {
            {
                let mut allowed = self.allowed.lock();
                if *allowed == 0 {
                    return Err(StrataError::IoError(std::io::Error::other("no space left")));
                }
                *allowed -= 1;
            }
            self.inner.store_partition(path, partition).await
        }

        async fn fetch_partition(&self, path: &str) -> Result<Partition> {
            self.inner.fetch_partition(path).await
        }

        async fn delete_partition(&self, path: &str) -> Result<()> {
            self.inner.delete_partition(path).await
        }

        async fn delete_prefix(&self, prefix: &str) -> Result<()> {
            self.inner.delete_prefix(prefix).await
        }
    }

    fn schema() -> SchemaRef {
        Arc::new(Schema::try_new(vec![Field::new("v", LogicalType::Int64)]).unwrap())
    }

    fn input(values: Vec<i64>) -> Arc<Partition> {
        Arc::new(
            Partition::try_from_columns(schema(), vec![Arc::new(Int64Array::from(values))])
                .unwrap(),
        )
    }

    fn values(partition: &Partition) -> Vec<i64> {
        partition
            .column(0)
            .unwrap()
            .as_primitive::<Int64Type>()
            .values()
            .to_vec()
    }

    #[test]
    fn split_partition_skips_empty_buckets() -> Result<()> {
        let part = input(vec![1, 2, 3, 4]);
        let buckets = split_partition(&part, &[2, 0, 2, 0], 3)?;
        let outputs: Vec<usize> = buckets.iter().map(|(o, _)| *o).collect();
        assert_eq!(outputs, vec![0, 2]);
        assert_eq!(values(&buckets[0].1), vec![2, 4]);
        assert_eq!(values(&buckets[1].1), vec![1, 3]);

        assert!(split_partition(&part, &[0, 0, 5, 0], 3).is_err());
        assert!(split_partition(&part, &[0], 3).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn outputs_keep_input_order() -> Result<()> {
        let store = Arc::new(InMemoryPartitionStore::new());
        let ctx = TaskContext::new(StrataConfig::default(), store.clone(), CancellationToken::new());
        let exchange = ShuffleExchange::new(Arc::new(ModuloPartitioner(2)));

        let outputs = exchange
            .execute(schema(), vec![input(vec![1, 2, 3]), input(vec![4, 5, 6])], &ctx)
            .await?;
        assert_eq!(outputs.len(), 2);
        assert_eq!(values(&outputs[0]), vec![2, 4, 6]);
        assert_eq!(values(&outputs[1]), vec![1, 3, 5]);
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_discards_written_buckets() {
        let inner = InMemoryPartitionStore::new();
        let store = Arc::new(FlakyStore {
            inner: inner.clone(),
            allowed: Mutex::new(2),
        });
        let ctx = TaskContext::new(
            StrataConfig::default().with_execution_parallelism(1).unwrap(),
            store,
            CancellationToken::new(),
        );
        let exchange = ShuffleExchange::new(Arc::new(ModuloPartitioner(3)));

        let result = exchange
            .execute(schema(), vec![input(vec![0, 1, 2]), input(vec![3, 4, 5])], &ctx)
            .await;
        assert!(matches!(result, Err(StrataError::IoError(_))));
        assert!(inner.is_empty());
    }

    fn dir_entries(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn disk_exchange_leaves_an_empty_work_dir() -> Result<()> {
        let work_dir = tempfile::tempdir()?;
        let store = Arc::new(DiskPartitionStore::try_new(work_dir.path())?);
        let ctx = TaskContext::new(StrataConfig::default(), store, CancellationToken::new());

        for _ in 0..3 {
            let exchange = ShuffleExchange::new(Arc::new(ModuloPartitioner(4)));
            let outputs = exchange
                .execute(schema(), vec![input(vec![1, 2, 3]), input(vec![4, 5, 6, 7])], &ctx)
                .await?;
            assert_eq!(values(&outputs[3]), vec![3, 7]);
        }
        assert_eq!(dir_entries(work_dir.path()), Vec::<std::path::PathBuf>::new());
        Ok(())
    }

    #[tokio::test]
    async fn failed_disk_exchange_leaves_an_empty_work_dir() -> Result<()> {
        let work_dir = tempfile::tempdir()?;
        let store = Arc::new(FlakyStore {
            inner: DiskPartitionStore::try_new(work_dir.path())?,
            allowed: Mutex::new(3),
        });
        let ctx = TaskContext::new(
            StrataConfig::default().with_execution_parallelism(1)?,
            store,
            CancellationToken::new(),
        );
        let exchange = ShuffleExchange::new(Arc::new(ModuloPartitioner(3)));

        let result = exchange
            .execute(schema(), vec![input(vec![0, 1, 2]), input(vec![3, 4, 5])], &ctx)
            .await;
        assert!(matches!(result, Err(StrataError::IoError(_))));
        assert_eq!(dir_entries(work_dir.path()), Vec::<std::path::PathBuf>::new());
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_exchange_commits_nothing() {
        let store = Arc::new(InMemoryPartitionStore::new());
        let token = CancellationToken::new();
        token.cancel();
        let ctx = TaskContext::new(StrataConfig::default(), store.clone(), token);
        let exchange = ShuffleExchange::new(Arc::new(ModuloPartitioner(2)));

        let result = exchange.execute(schema(), vec![input(vec![1, 2])], &ctx).await;
        assert!(matches!(result, Err(StrataError::Cancelled)));
        assert!(store.is_empty());
    }
}
