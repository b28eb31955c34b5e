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

//! Task execution helpers shared by the partition operators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};

use crate::config::StrataConfig;
use crate::error::{Result, StrataError};
use crate::partition_store::{partition_store_from_config, InMemoryPartitionStore, PartitionStore};

/// Cooperative cancellation flag shared by every task of one execution.
///
/// Tasks check the flag before they start; operators check it again before
/// committing their output, so a cancelled execution never publishes a
/// partially produced dataset.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns [`StrataError::Cancelled`] once the token has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StrataError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a running operator needs besides its input.
#[derive(Debug, Clone)]
pub struct TaskContext {
    config: StrataConfig,
    store: Arc<dyn PartitionStore>,
    cancellation: CancellationToken,
}

impl TaskContext {
    pub fn new(
        config: StrataConfig,
        store: Arc<dyn PartitionStore>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            cancellation,
        }
    }

    /// Context with the partition store selected by `config`.
    pub fn try_from_config(config: StrataConfig) -> Result<Self> {
        let store = partition_store_from_config(&config)?;
        Ok(Self::new(config, store, CancellationToken::new()))
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PartitionStore> {
        &self.store
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn parallelism(&self) -> usize {
        self.config.execution_parallelism().max(1)
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new(
            StrataConfig::default(),
            Arc::new(InMemoryPartitionStore::new()),
            CancellationToken::new(),
        )
    }
}

/// Runs `task` on the blocking thread pool once per input, with at most
/// [`TaskContext::parallelism`] tasks in flight, and returns the results in
/// input order.
///
/// The first failing task fails the whole call; tasks still running are
/// abandoned and their results dropped.
pub async fn run_blocking_tasks<I, T, F>(ctx: &TaskContext, inputs: Vec<I>, task: F) -> Result<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(usize, I) -> Result<T> + Send + Sync + 'static,
{
    let task = Arc::new(task);
    let cancellation = ctx.cancellation().clone();
    futures::stream::iter(inputs.into_iter().enumerate().map(|(index, input)| {
        let task = task.clone();
        let cancellation = cancellation.clone();
        async move {
            cancellation.check()?;
            tokio::task::spawn_blocking(move || task(index, input)).await?
        }
    }))
    .buffered(ctx.parallelism())
    .try_collect()
    .await
}
