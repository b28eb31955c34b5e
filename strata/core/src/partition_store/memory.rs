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

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;

use crate::error::{Result, StrataError};
use crate::partition::Partition;

use super::{PartitionStats, PartitionStore};

/// Partition store keeping every partition in process memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPartitionStore {
    store: Arc<DashMap<String, Partition>>,
}

impl InMemoryPartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of partitions currently held.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl PartitionStore for InMemoryPartitionStore {
    async fn store_partition(&self, path: &str, partition: Partition) -> Result<PartitionStats> {
        let stats = PartitionStats::of(&partition);
        debug!("Storing in-memory partition {path}: {stats}");
        self.store.insert(path.to_string(), partition);
        Ok(stats)
    }

    async fn fetch_partition(&self, path: &str) -> Result<Partition> {
        self.store
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                StrataError::General(format!(
                    "Partition not found in in-memory store: {path}"
                ))
            })
    }

    async fn delete_partition(&self, path: &str) -> Result<()> {
        self.store.remove(path);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let prefix = format!("{prefix}/");
        self.store.retain(|path, _| !path.starts_with(&prefix));
        Ok(())
    }

    async fn take_partition(&self, path: &str) -> Result<Partition> {
        self.store
            .remove(path)
            .map(|(_, partition)| partition)
            .ok_or_else(|| {
                StrataError::General(format!(
                    "Partition not found in in-memory store: {path}"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, LogicalType, Schema};
    use arrow::array::Int64Array;

    fn partition(values: Vec<i64>) -> Partition {
        let schema = Arc::new(Schema::try_new(vec![Field::new("v", LogicalType::Int64)]).unwrap());
        Partition::try_from_columns(schema, vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[tokio::test]
    async fn store_fetch_take() -> Result<()> {
        let store = InMemoryPartitionStore::new();
        let stats = store.store_partition("s/0/0", partition(vec![1, 2, 3])).await?;
        assert_eq!(stats.num_rows, 3);

        assert_eq!(store.fetch_partition("s/0/0").await?.num_rows(), 3);
        assert_eq!(store.len(), 1);

        assert_eq!(store.take_partition("s/0/0").await?, partition(vec![1, 2, 3]));
        assert!(store.is_empty());
        assert!(store.fetch_partition("s/0/0").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn delete_missing_is_not_an_error() -> Result<()> {
        let store = InMemoryPartitionStore::new();
        store.delete_partition("nope").await
    }

    #[tokio::test]
    async fn delete_prefix_only_touches_that_prefix() -> Result<()> {
        let store = InMemoryPartitionStore::new();
        store.store_partition("s/0/0", partition(vec![1])).await?;
        store.store_partition("s/1/0", partition(vec![2])).await?;
        store.store_partition("s2/0/0", partition(vec![3])).await?;

        store.delete_prefix("s").await?;
        assert_eq!(store.len(), 1);
        assert!(store.fetch_partition("s2/0/0").await.is_ok());
        Ok(())
    }
}
