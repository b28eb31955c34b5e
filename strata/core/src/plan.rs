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

//! Lazy logical plans.
//!
//! A plan is an immutable chain of nodes, each holding an [`Arc`] to its
//! input. Building a plan validates it against the schema of its input but
//! touches no data; [`crate::executor::execute_plan`] materializes it.

use std::fmt;
use std::sync::Arc;

use crate::dataset::Dataset;
use crate::error::{Result, StrataError};
use crate::expr::Expr;
use crate::ordering::{OrderingTag, SortSpec};
use crate::types::{Field, LogicalType, SchemaRef};

pub type LogicalPlanRef = Arc<LogicalPlan>;

#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// An already materialized dataset.
    Source { dataset: Dataset },
    /// Keeps the rows for which `predicate` is true.
    Filter {
        input: LogicalPlanRef,
        predicate: Expr,
    },
    /// Writes the value of `expr` into `column`, replacing an existing column
    /// of that name or appending a new one.
    Project {
        input: LogicalPlanRef,
        column: String,
        expr: Expr,
        schema: SchemaRef,
    },
    /// Random fanout into exactly `num_partitions` partitions.
    Repartition {
        input: LogicalPlanRef,
        num_partitions: usize,
    },
    /// Global sort into at most `num_partitions` partitions, or as many as
    /// the input has when `None`.
    Sort {
        input: LogicalPlanRef,
        spec: SortSpec,
        num_partitions: Option<usize>,
    },
}

impl LogicalPlan {
    pub fn schema(&self) -> SchemaRef {
        match self {
            LogicalPlan::Source { dataset } => dataset.schema().clone(),
            LogicalPlan::Project { schema, .. } => schema.clone(),
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Repartition { input, .. }
            | LogicalPlan::Sort { input, .. } => input.schema(),
        }
    }

    /// Ordering the output of this plan is guaranteed to have.
    pub fn ordering(&self) -> OrderingTag {
        match self {
            LogicalPlan::Source { dataset } => dataset.ordering().clone(),
            LogicalPlan::Filter { input, .. } => input.ordering().after_filter(),
            LogicalPlan::Project {
                input,
                column,
                expr,
                ..
            } => input.ordering().after_project(column, &expr.columns()),
            LogicalPlan::Repartition { input, .. } => input.ordering().after_repartition(),
            LogicalPlan::Sort { input, spec, .. } => input.ordering().after_sort(spec),
        }
    }

    /// Number of partitions of the output. For a sort this is an upper bound,
    /// since sorting never produces more partitions than rows.
    pub fn num_partitions(&self) -> usize {
        match self {
            LogicalPlan::Source { dataset } => dataset.num_partitions(),
            LogicalPlan::Filter { input, .. } | LogicalPlan::Project { input, .. } => {
                input.num_partitions()
            }
            LogicalPlan::Repartition { num_partitions, .. } => *num_partitions,
            LogicalPlan::Sort {
                input,
                num_partitions,
                ..
            } => num_partitions.unwrap_or_else(|| input.num_partitions()),
        }
    }

    pub fn input(&self) -> Option<&LogicalPlanRef> {
        match self {
            LogicalPlan::Source { .. } => None,
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Repartition { input, .. }
            | LogicalPlan::Sort { input, .. } => Some(input),
        }
    }

    /// One node per line, outermost first, each input indented one level
    /// deeper than its consumer.
    pub fn display_indent(&self) -> String {
        let mut lines = Vec::new();
        let mut node = Some(self);
        let mut depth = 0;
        while let Some(plan) = node {
            lines.push(format!("{}{plan}", "  ".repeat(depth)));
            node = plan.input().map(|input| input.as_ref());
            depth += 1;
        }
        lines.join("\n")
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalPlan::Source { dataset } => write!(
                f,
                "Source: partitions = {}, rows = {}, schema = {}",
                dataset.num_partitions(),
                dataset.num_rows(),
                dataset.schema()
            ),
            LogicalPlan::Filter { predicate, .. } => write!(f, "Filter: {predicate}"),
            LogicalPlan::Project { column, expr, .. } => write!(f, "Project: {column} = {expr}"),
            LogicalPlan::Repartition { num_partitions, .. } => {
                write!(f, "Repartition: random, partitions = {num_partitions}")
            }
            LogicalPlan::Sort {
                spec,
                num_partitions,
                ..
            } => {
                write!(f, "Sort: by = {spec}")?;
                if let Some(n) = num_partitions {
                    write!(f, ", partitions = {n}")?;
                }
                Ok(())
            }
        }
    }
}

/// Builds a [`LogicalPlan`] one validated node at a time.
#[derive(Debug, Clone)]
pub struct LogicalPlanBuilder {
    plan: LogicalPlanRef,
}

impl LogicalPlanBuilder {
    pub fn new(plan: LogicalPlanRef) -> Self {
        Self { plan }
    }

    pub fn source(dataset: Dataset) -> Self {
        Self::new(Arc::new(LogicalPlan::Source { dataset }))
    }

    pub fn schema(&self) -> SchemaRef {
        self.plan.schema()
    }

    /// Fails unless `predicate` evaluates to a Boolean over the input.
    pub fn filter(self, predicate: Expr) -> Result<Self> {
        match predicate.data_type(&self.schema())? {
            LogicalType::Boolean | LogicalType::Null => Ok(Self::new(Arc::new(
                LogicalPlan::Filter {
                    input: self.plan,
                    predicate,
                },
            ))),
            other => Err(StrataError::InvalidArgument(format!(
                "filter predicate {predicate} must be Boolean, got {other}"
            ))),
        }
    }

    pub fn project(self, column: impl Into<String>, expr: Expr) -> Result<Self> {
        let column = column.into();
        let input_schema = self.schema();
        let data_type = expr.data_type(&input_schema)?;
        let schema = Arc::new(input_schema.with_field(Field::new(column.clone(), data_type))?);
        Ok(Self::new(Arc::new(LogicalPlan::Project {
            input: self.plan,
            column,
            expr,
            schema,
        })))
    }

    pub fn repartition(self, num_partitions: usize) -> Result<Self> {
        if num_partitions == 0 {
            return Err(StrataError::InvalidArgument(
                "cannot repartition into 0 partitions".to_string(),
            ));
        }
        Ok(Self::new(Arc::new(LogicalPlan::Repartition {
            input: self.plan,
            num_partitions,
        })))
    }

    /// Fails with [`StrataError::InvalidSortKey`] when a key is missing from
    /// the input or cannot be ordered.
    pub fn sort(self, spec: SortSpec, num_partitions: Option<usize>) -> Result<Self> {
        spec.validate(&self.schema())?;
        if num_partitions == Some(0) {
            return Err(StrataError::InvalidArgument(
                "cannot sort into 0 partitions".to_string(),
            ));
        }
        Ok(Self::new(Arc::new(LogicalPlan::Sort {
            input: self.plan,
            spec,
            num_partitions,
        })))
    }

    pub fn build(self) -> LogicalPlanRef {
        self.plan
    }
}
