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

//! Entry point for building dataframes.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::datatypes::Field as ArrowField;
use arrow::record_batch::RecordBatch;
use log::debug;
use strata_core::config::StrataConfig;
use strata_core::dataset::Dataset;
use strata_core::error::{Result, StrataError};
use strata_core::partition::Partition;
use strata_core::partition_store::{partition_store_from_config, PartitionStore};
use strata_core::plan::LogicalPlanBuilder;
use strata_core::types::{Field, LogicalType, Schema, SchemaRef};
use strata_core::utils::{CancellationToken, TaskContext};

use crate::dataframe::DataFrame;

/// Holds the configuration and the shuffle store shared by every dataframe
/// created from it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    config: StrataConfig,
    store: Arc<dyn PartitionStore>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Session with the default configuration and an in-memory shuffle store.
    pub fn new() -> Self {
        let task_ctx = TaskContext::default();
        Self {
            config: task_ctx.config().clone(),
            store: task_ctx.store().clone(),
        }
    }

    /// Session using `config`, including the shuffle store it selects.
    pub fn with_config(config: StrataConfig) -> Result<Self> {
        let store = partition_store_from_config(&config)?;
        debug!("Created session with shuffle store {store:?}");
        Ok(Self { config, store })
    }

    /// Replaces the shuffle store selected by the configuration.
    pub fn with_partition_store(mut self, store: Arc<dyn PartitionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    /// Context for one execution, cancelled through `cancellation`.
    pub fn task_context(&self, cancellation: CancellationToken) -> TaskContext {
        TaskContext::new(self.config.clone(), self.store.clone(), cancellation)
    }

    /// Builds a single partition dataframe from `(name, column)` pairs,
    /// inferring the schema from the Arrow types of the columns.
    pub fn read_columns<N: Into<String>>(&self, columns: Vec<(N, ArrayRef)>) -> Result<DataFrame> {
        let (names, arrays): (Vec<String>, Vec<ArrayRef>) =
            columns.into_iter().map(|(n, a)| (n.into(), a)).unzip();
        let fields = names
            .iter()
            .zip(&arrays)
            .map(|(name, array)| {
                let arrow_field = ArrowField::new(name, array.data_type().clone(), true);
                Ok(Field::new(name, LogicalType::try_from_arrow(&arrow_field)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let schema = Arc::new(Schema::try_new(fields)?);
        self.read_arrays(schema, arrays)
    }

    /// Builds a single partition dataframe from `(name, column)` pairs that
    /// must match `schema`. Columns may be given in any order; missing or
    /// extra columns are rejected.
    pub fn read_columns_with_schema<N: Into<String>>(
        &self,
        schema: SchemaRef,
        columns: Vec<(N, ArrayRef)>,
    ) -> Result<DataFrame> {
        let mut columns: Vec<(String, ArrayRef)> =
            columns.into_iter().map(|(n, a)| (n.into(), a)).collect();
        if columns.len() != schema.len() {
            return Err(StrataError::Schema(format!(
                "expected the {} columns of {schema}, got {}",
                schema.len(),
                columns.len()
            )));
        }
        let arrays = schema
            .fields()
            .iter()
            .map(|field| {
                let position = columns
                    .iter()
                    .position(|(name, _)| name == field.name())
                    .ok_or_else(|| {
                        StrataError::Schema(format!("missing column '{}'", field.name()))
                    })?;
                Ok(columns.swap_remove(position).1)
            })
            .collect::<Result<Vec<_>>>()?;
        self.read_arrays(schema, arrays)
    }

    fn read_arrays(&self, schema: SchemaRef, arrays: Vec<ArrayRef>) -> Result<DataFrame> {
        if let Some(first) = arrays.first() {
            if let Some((index, array)) = arrays
                .iter()
                .enumerate()
                .find(|(_, a)| a.len() != first.len())
            {
                return Err(StrataError::Schema(format!(
                    "column '{}' has {} rows but '{}' has {}",
                    schema.fields()[index].name(),
                    array.len(),
                    schema.fields()[0].name(),
                    first.len()
                )));
            }
        }
        let partition = Partition::try_from_columns(schema.clone(), arrays)?;
        self.read_dataset(Dataset::try_new(schema, vec![partition])?)
    }

    /// One partition per record batch.
    pub fn read_batches(&self, schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<DataFrame> {
        self.read_dataset(Dataset::try_from_batches(schema, batches)?)
    }

    /// Wraps an already materialized dataset, keeping its ordering.
    pub fn read_dataset(&self, dataset: Dataset) -> Result<DataFrame> {
        Ok(DataFrame::new(
            self.clone(),
            LogicalPlanBuilder::source(dataset).build(),
        ))
    }
}
