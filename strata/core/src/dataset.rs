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

//! Materialized, partitioned datasets.

use std::fmt;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;

use crate::comparator::RowComparator;
use crate::error::{Result, StrataError};
use crate::ordering::{OrderingTag, SortSpec};
use crate::partition::Partition;
use crate::types::SchemaRef;

/// An ordered sequence of partitions sharing one schema, together with the
/// ordering the concatenation of the partitions is known to satisfy.
///
/// A dataset is immutable. Operators build a new dataset and never change the
/// partitions of their input.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: SchemaRef,
    partitions: Vec<Arc<Partition>>,
    ordering: OrderingTag,
}

impl Dataset {
    /// Creates an [`OrderingTag::Unordered`] dataset, checking that every
    /// partition has `schema`.
    pub fn try_new(schema: SchemaRef, partitions: Vec<Partition>) -> Result<Self> {
        Self::try_from_shared(schema, partitions.into_iter().map(Arc::new).collect())
    }

    pub fn try_from_shared(schema: SchemaRef, partitions: Vec<Arc<Partition>>) -> Result<Self> {
        if let Some((index, partition)) = partitions
            .iter()
            .enumerate()
            .find(|(_, p)| p.schema() != &schema)
        {
            return Err(StrataError::Schema(format!(
                "partition {index} has schema {} but the dataset has {schema}",
                partition.schema()
            )));
        }
        Ok(Self {
            schema,
            partitions,
            ordering: OrderingTag::Unordered,
        })
    }

    /// One partition per record batch.
    pub fn try_from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        let partitions = batches
            .into_iter()
            .map(|batch| Partition::try_new(schema.clone(), batch))
            .collect::<Result<Vec<_>>>()?;
        Self::try_new(schema, partitions)
    }

    /// A dataset holding a single empty partition.
    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            partitions: vec![Arc::new(Partition::new_empty(schema.clone()))],
            schema,
            ordering: OrderingTag::Unordered,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn partitions(&self) -> &[Arc<Partition>] {
        &self.partitions
    }

    pub fn partition(&self, index: usize) -> Option<&Arc<Partition>> {
        self.partitions.get(index)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn num_rows(&self) -> usize {
        self.partitions.iter().map(|p| p.num_rows()).sum()
    }

    pub fn ordering(&self) -> &OrderingTag {
        &self.ordering
    }

    /// Returns a copy with partition `index` replaced by `partition`.
    ///
    /// Replacing a partition wholesale can break any global order, so the
    /// result is [`OrderingTag::Unordered`].
    pub fn with_partition(&self, index: usize, partition: Partition) -> Result<Self> {
        if index >= self.partitions.len() {
            return Err(StrataError::InvalidArgument(format!(
                "partition {index} out of range for a dataset with {} partitions",
                self.partitions.len()
            )));
        }
        if partition.schema() != &self.schema {
            return Err(StrataError::Schema(format!(
                "replacement partition has schema {} but the dataset has {}",
                partition.schema(),
                self.schema
            )));
        }
        let mut partitions = self.partitions.clone();
        partitions[index] = Arc::new(partition);
        Ok(Self {
            schema: self.schema.clone(),
            partitions,
            ordering: OrderingTag::Unordered,
        })
    }

    pub(crate) fn with_ordering(mut self, ordering: OrderingTag) -> Self {
        self.ordering = ordering;
        self
    }

    /// Checks row by row whether the concatenation of all partitions is
    /// ordered according to `spec`, ignoring the ordering tag.
    pub fn is_sorted(&self, spec: &SortSpec) -> Result<bool> {
        let comparator = RowComparator::try_new(&self.schema, spec)?;
        let mut previous: Option<(&RecordBatch, usize)> = None;
        for partition in self.partitions.iter().filter(|p| !p.is_empty()) {
            let batch = partition.batch();
            if let Some((prev_batch, prev_row)) = previous {
                if comparator.compare(prev_batch, prev_row, batch, 0)?.is_gt() {
                    return Ok(false);
                }
            }
            let bound = comparator.bind(batch, batch)?;
            if (1..batch.num_rows()).any(|row| bound.compare(row - 1, row).is_gt()) {
                return Ok(false);
            }
            previous = Some((batch, batch.num_rows() - 1));
        }
        Ok(true)
    }

    /// Concatenates all partitions, in order, into one record batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let partitions: Vec<Partition> = self.partitions.iter().map(|p| p.as_ref().clone()).collect();
        Ok(Partition::concat(self.schema.clone(), &partitions)?
            .batch()
            .clone())
    }

    /// Exports the dataset as a `(name, column)` mapping in schema order.
    pub fn to_columns(&self) -> Result<Vec<(String, ArrayRef)>> {
        let batch = self.to_record_batch()?;
        Ok(self
            .schema
            .column_names()
            .into_iter()
            .map(String::from)
            .zip(batch.columns().iter().cloned())
            .collect())
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dataset(partitions={}, rows={}, ordering={})",
            self.num_partitions(),
            self.num_rows(),
            self.ordering
        )
    }
}
