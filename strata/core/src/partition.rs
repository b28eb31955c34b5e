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

//! Immutable columnar partitions.

use std::fmt;

use arrow::array::{ArrayRef, BooleanArray, UInt32Array};
use arrow::compute::{concat_batches, filter_record_batch, take_record_batch};
use arrow::record_batch::RecordBatch;

use crate::error::{Result, StrataError};
use crate::types::SchemaRef;

/// A finite, ordered batch of rows sharing one schema.
///
/// A partition is never modified after it is created. Operators produce new
/// partitions, which is what allows partition tasks to run concurrently
/// without locking.
#[derive(Debug, Clone)]
pub struct Partition {
    schema: SchemaRef,
    batch: RecordBatch,
}

impl Partition {
    /// Wraps `batch`, checking that its columns match `schema`.
    pub fn try_new(schema: SchemaRef, batch: RecordBatch) -> Result<Self> {
        Self::try_from_columns(schema, batch.columns().to_vec())
    }

    /// Builds a partition from one array per schema column.
    pub fn try_from_columns(schema: SchemaRef, columns: Vec<ArrayRef>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(StrataError::Schema(format!(
                "expected {} columns for schema {schema}, got {}",
                schema.len(),
                columns.len()
            )));
        }
        for (field, column) in schema.fields().iter().zip(columns.iter()) {
            let expected = field.logical_type().arrow_type();
            if column.data_type() != &expected {
                return Err(StrataError::Schema(format!(
                    "column '{}' is declared as {} ({expected}) but holds {}",
                    field.name(),
                    field.logical_type(),
                    column.data_type()
                )));
            }
        }
        let batch = if schema.is_empty() {
            RecordBatch::new_empty(schema.arrow_schema().clone())
        } else {
            RecordBatch::try_new(schema.arrow_schema().clone(), columns)?
        };
        Ok(Self { schema, batch })
    }

    pub fn new_empty(schema: SchemaRef) -> Self {
        let batch = RecordBatch::new_empty(schema.arrow_schema().clone());
        Self { schema, batch }
    }

    /// Concatenates `partitions` in order into a single partition.
    pub fn concat(schema: SchemaRef, partitions: &[Partition]) -> Result<Self> {
        match partitions {
            [] => Ok(Self::new_empty(schema)),
            [single] => Ok(single.clone()),
            _ => {
                let batch = concat_batches(
                    schema.arrow_schema(),
                    partitions.iter().map(|p| &p.batch),
                )?;
                Ok(Self { schema, batch })
            }
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn column(&self, index: usize) -> Option<&ArrayRef> {
        self.batch.columns().get(index)
    }

    pub fn column_by_name(&self, name: &str) -> Result<&ArrayRef> {
        self.schema
            .index_of(name)
            .and_then(|idx| self.column(idx))
            .ok_or_else(|| StrataError::Schema(format!("column '{name}' not found")))
    }

    /// Applies a permutation (or selection) of row positions.
    pub fn take(&self, indices: &UInt32Array) -> Result<Self> {
        let batch = take_record_batch(&self.batch, indices)?;
        Ok(Self {
            schema: self.schema.clone(),
            batch,
        })
    }

    /// Keeps the rows where `mask` is true, preserving their relative order.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Self> {
        let batch = filter_record_batch(&self.batch, mask)?;
        Ok(Self {
            schema: self.schema.clone(),
            batch,
        })
    }

    pub fn slice(&self, offset: usize, length: usize) -> Self {
        Self {
            schema: self.schema.clone(),
            batch: self.batch.slice(offset, length),
        }
    }

    pub fn memory_size(&self) -> usize {
        self.batch.get_array_memory_size()
    }
}

impl PartialEq for Partition {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.batch == other.batch
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Partition(rows={}, schema={})", self.num_rows(), self.schema)
    }
}
