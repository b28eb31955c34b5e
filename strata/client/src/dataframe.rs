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

//! Lazily evaluated dataframes.

use std::time::Instant;

use arrow::array::ArrayRef;
use log::info;
use strata_core::dataset::Dataset;
use strata_core::error::Result;
use strata_core::executor::execute_plan;
use strata_core::expr::Expr;
use strata_core::ordering::{OrderingTag, SortField, SortSpec};
use strata_core::plan::{LogicalPlanBuilder, LogicalPlanRef};
use strata_core::types::{LogicalType, SchemaRef};
use strata_core::utils::CancellationToken;

use crate::context::SessionContext;

/// A logical plan bound to the session that will execute it.
///
/// Every transformation returns a new dataframe and only validates the plan
/// against the current schema. Data is touched by [`DataFrame::collect`].
#[derive(Debug, Clone)]
pub struct DataFrame {
    session: SessionContext,
    plan: LogicalPlanRef,
}

impl DataFrame {
    pub fn new(session: SessionContext, plan: LogicalPlanRef) -> Self {
        Self { session, plan }
    }

    pub fn logical_plan(&self) -> &LogicalPlanRef {
        &self.plan
    }

    pub fn schema(&self) -> SchemaRef {
        self.plan.schema()
    }

    pub fn column_type(&self, name: &str) -> Result<LogicalType> {
        self.plan.schema().column_type(name)
    }

    /// Number of partitions the plan produces. For sorted plans this is an
    /// upper bound.
    pub fn num_partitions(&self) -> usize {
        self.plan.num_partitions()
    }

    pub fn ordering(&self) -> OrderingTag {
        self.plan.ordering()
    }

    /// Indented description of the plan, outermost node first.
    pub fn explain(&self) -> String {
        self.plan.display_indent()
    }

    fn builder(&self) -> LogicalPlanBuilder {
        LogicalPlanBuilder::new(self.plan.clone())
    }

    fn with_plan(self, builder: LogicalPlanBuilder) -> Self {
        Self {
            session: self.session,
            plan: builder.build(),
        }
    }

    /// Sorts by `columns`, where `descending[i]` gives the direction of
    /// `columns[i]`. Both slices must have the same length.
    pub fn sort<S: AsRef<str>>(self, columns: &[S], descending: &[bool]) -> Result<Self> {
        let spec = SortSpec::try_from_columns(columns, descending)?;
        let num_partitions = self.session.config().sort_target_partitions();
        self.sort_spec(spec, num_partitions)
    }

    pub fn sort_by(self, column: &str, descending: bool) -> Result<Self> {
        let spec = SortSpec::try_new(vec![SortField::new(column, descending)])?;
        let num_partitions = self.session.config().sort_target_partitions();
        self.sort_spec(spec, num_partitions)
    }

    /// Like [`DataFrame::sort`], producing at most `num_partitions`
    /// partitions.
    pub fn sort_with_partitions<S: AsRef<str>>(
        self,
        columns: &[S],
        descending: &[bool],
        num_partitions: usize,
    ) -> Result<Self> {
        let spec = SortSpec::try_from_columns(columns, descending)?;
        self.sort_spec(spec, Some(num_partitions))
    }

    pub fn sort_spec(self, spec: SortSpec, num_partitions: Option<usize>) -> Result<Self> {
        let builder = self.builder().sort(spec, num_partitions)?;
        Ok(self.with_plan(builder))
    }

    /// Randomly redistributes the rows into `num_partitions` partitions.
    pub fn repartition(self, num_partitions: usize) -> Result<Self> {
        let builder = self.builder().repartition(num_partitions)?;
        Ok(self.with_plan(builder))
    }

    pub fn filter(self, predicate: Expr) -> Result<Self> {
        let builder = self.builder().filter(predicate)?;
        Ok(self.with_plan(builder))
    }

    /// Sets `column` to the value of `expr`, adding the column when it does
    /// not exist yet.
    pub fn project(self, column: &str, expr: Expr) -> Result<Self> {
        let builder = self.builder().project(column, expr)?;
        Ok(self.with_plan(builder))
    }

    /// Executes the plan.
    pub async fn collect(&self) -> Result<Dataset> {
        self.collect_with_cancellation(CancellationToken::new()).await
    }

    /// Executes the plan, giving up as soon as `cancellation` is cancelled.
    pub async fn collect_with_cancellation(
        &self,
        cancellation: CancellationToken,
    ) -> Result<Dataset> {
        let start = Instant::now();
        let ctx = self.session.task_context(cancellation);
        let dataset = execute_plan(&self.plan, &ctx).await?;
        info!(
            "Collected {} rows in {} partitions in {} ms",
            dataset.num_rows(),
            dataset.num_partitions(),
            start.elapsed().as_millis()
        );
        Ok(dataset)
    }

    /// Executes the plan and exports the result as `(name, column)` pairs.
    pub async fn to_columns(&self) -> Result<Vec<(String, ArrayRef)>> {
        self.collect().await?.to_columns()
    }
}
