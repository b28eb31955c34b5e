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

//! Materialization of logical plans.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::expr::Expr;
use crate::ordering::SortSpec;
use crate::partition::Partition;
use crate::plan::LogicalPlan;
use crate::repartition::RepartitionOperator;
use crate::sort::{SortOperator, SortOptions};
use crate::types::SchemaRef;
use crate::utils::{run_blocking_tasks, TaskContext};

/// Executes `plan` bottom up and returns its output.
///
/// Every operator works on its own copy of the partition list; the datasets
/// referenced by the plan are never modified.
pub fn execute_plan<'a>(
    plan: &'a LogicalPlan,
    ctx: &'a TaskContext,
) -> BoxFuture<'a, Result<Dataset>> {
    async move {
        ctx.cancellation().check()?;
        match plan {
            LogicalPlan::Source { dataset } => Ok(dataset.clone()),
            LogicalPlan::Filter { input, predicate } => {
                let input = execute_plan(input, ctx).await?;
                filter(&input, predicate, ctx).await
            }
            LogicalPlan::Project {
                input,
                column,
                expr,
                schema,
            } => {
                let input = execute_plan(input, ctx).await?;
                project(&input, column, expr, schema, ctx).await
            }
            LogicalPlan::Repartition {
                input,
                num_partitions,
            } => {
                let input = execute_plan(input, ctx).await?;
                RepartitionOperator::try_new(*num_partitions, ctx.config().repartition_seed())?
                    .execute(&input, ctx)
                    .await
            }
            LogicalPlan::Sort {
                input,
                spec,
                num_partitions,
            } => {
                let input = execute_plan(input, ctx).await?;
                sort(input, spec, *num_partitions, ctx).await
            }
        }
    }
    .boxed()
}

async fn filter(input: &Dataset, predicate: &Expr, ctx: &TaskContext) -> Result<Dataset> {
    let start = Instant::now();
    let predicate = Arc::new(predicate.clone());
    let partitions = run_blocking_tasks(ctx, input.partitions().to_vec(), {
        let predicate = predicate.clone();
        move |_, partition: Arc<Partition>| {
            let mask = predicate.evaluate_predicate(&partition)?;
            partition.filter(&mask)
        }
    })
    .await?;
    ctx.cancellation().check()?;
    let output = Dataset::try_new(input.schema().clone(), partitions)?
        .with_ordering(input.ordering().after_filter());
    debug!(
        "Filter {predicate} kept {} of {} rows in {} ms",
        output.num_rows(),
        input.num_rows(),
        start.elapsed().as_millis()
    );
    Ok(output)
}

async fn project(
    input: &Dataset,
    column: &str,
    expr: &Expr,
    schema: &SchemaRef,
    ctx: &TaskContext,
) -> Result<Dataset> {
    let start = Instant::now();
    let target = input.schema().index_of(column);
    let task_expr = Arc::new(expr.clone());
    let task_schema = schema.clone();
    let partitions = run_blocking_tasks(ctx, input.partitions().to_vec(), move |_, partition| {
        let values = task_expr.evaluate(&partition)?;
        let mut columns = partition.batch().columns().to_vec();
        match target {
            Some(index) => columns[index] = values,
            None => columns.push(values),
        }
        Partition::try_from_columns(task_schema.clone(), columns)
    })
    .await?;
    ctx.cancellation().check()?;
    let output = Dataset::try_new(schema.clone(), partitions)?
        .with_ordering(input.ordering().after_project(column, &expr.columns()));
    debug!(
        "Project {column} = {expr} over {} rows in {} ms",
        output.num_rows(),
        start.elapsed().as_millis()
    );
    Ok(output)
}

async fn sort(
    input: Dataset,
    spec: &SortSpec,
    num_partitions: Option<usize>,
    ctx: &TaskContext,
) -> Result<Dataset> {
    let options = SortOptions::from_config(ctx.config());
    let target = num_partitions.or(options.target_partitions);
    if input.ordering().is_ordered_on(spec)
        && target.is_none_or(|n| n == input.num_partitions())
    {
        info!("Input is already ordered on [{spec}], skipping sort");
        return Ok(input);
    }
    SortOperator::try_new(input.schema().clone(), spec, options.with_target_partitions(target))?
        .execute(&input, ctx)
        .await
}
