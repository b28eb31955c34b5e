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

//! Random fanout repartitioning.

use std::sync::Arc;
use std::time::Instant;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dataset::Dataset;
use crate::error::{Result, StrataError};
use crate::partition::Partition;
use crate::shuffle::{Partitioner, ShuffleExchange};
use crate::utils::TaskContext;

/// Sends every row to a pseudo random output partition.
///
/// The assignment is a function of the seed, the index of the input partition
/// and the row position, so running the same plan twice yields the same
/// partitions.
#[derive(Debug, Clone)]
pub struct RandomPartitioner {
    num_partitions: usize,
    seed: u64,
}

impl RandomPartitioner {
    pub fn try_new(num_partitions: usize, seed: u64) -> Result<Self> {
        if num_partitions == 0 {
            return Err(StrataError::InvalidArgument(
                "cannot repartition into 0 partitions".to_string(),
            ));
        }
        Ok(Self {
            num_partitions,
            seed,
        })
    }
}

impl Partitioner for RandomPartitioner {
    fn num_output_partitions(&self) -> usize {
        self.num_partitions
    }

    fn partition_rows(&self, input_index: usize, partition: &Partition) -> Result<Vec<usize>> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(input_index as u64));
        Ok((0..partition.num_rows())
            .map(|_| rng.random_range(0..self.num_partitions))
            .collect())
    }
}

/// Redistributes a dataset into exactly `num_partitions` partitions, some of
/// which may be empty. Rows of one input partition keep their relative order
/// inside every output partition, but the result is never considered
/// ordered.
#[derive(Debug, Clone)]
pub struct RepartitionOperator {
    partitioner: RandomPartitioner,
}

impl RepartitionOperator {
    pub fn try_new(num_partitions: usize, seed: u64) -> Result<Self> {
        Ok(Self {
            partitioner: RandomPartitioner::try_new(num_partitions, seed)?,
        })
    }

    pub fn num_partitions(&self) -> usize {
        self.partitioner.num_partitions
    }

    pub async fn execute(&self, input: &Dataset, ctx: &TaskContext) -> Result<Dataset> {
        let start = Instant::now();
        let exchange = ShuffleExchange::new(Arc::new(self.partitioner.clone()));
        let outputs = exchange
            .execute(input.schema().clone(), input.partitions().to_vec(), ctx)
            .await?;
        let output = Dataset::try_new(input.schema().clone(), outputs)?
            .with_ordering(input.ordering().after_repartition());
        info!(
            "Repartitioned {} rows from {} into {} partitions in {} ms",
            output.num_rows(),
            input.num_partitions(),
            output.num_partitions(),
            start.elapsed().as_millis()
        );
        Ok(output)
    }
}
