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

//! Storage for partitions exchanged between the map and reduce side of a
//! shuffle.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ShuffleStoreKind, StrataConfig};
use crate::error::Result;
use crate::partition::Partition;

mod disk;
mod memory;

pub use disk::DiskPartitionStore;
pub use memory::InMemoryPartitionStore;

/// Keyed store of immutable partitions.
///
/// Keys are relative, `/` separated paths. A stored partition is never
/// modified; storing twice under the same path replaces it wholesale.
#[async_trait]
pub trait PartitionStore: Send + Sync + fmt::Debug {
    async fn store_partition(&self, path: &str, partition: Partition)
        -> Result<PartitionStats>;

    async fn fetch_partition(&self, path: &str) -> Result<Partition>;

    async fn delete_partition(&self, path: &str) -> Result<()>;

    /// Removes every partition stored below `prefix`, along with anything
    /// the store keeps for the prefix itself. A prefix with nothing stored
    /// below it is not an error.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    async fn take_partition(&self, path: &str) -> Result<Partition> {
        let partition = self.fetch_partition(path).await?;
        self.delete_partition(path).await?;
        Ok(partition)
    }
}

/// Creates the partition store selected by the configuration.
pub fn partition_store_from_config(config: &StrataConfig) -> Result<Arc<dyn PartitionStore>> {
    Ok(match config.shuffle_store() {
        ShuffleStoreKind::Memory => Arc::new(InMemoryPartitionStore::new()),
        ShuffleStoreKind::Disk => {
            Arc::new(DiskPartitionStore::try_new(config.shuffle_work_dir())?)
        }
    })
}

/// Size statistics of a stored partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionStats {
    pub num_rows: u64,
    pub num_bytes: u64,
}

impl PartitionStats {
    pub fn new(num_rows: u64, num_bytes: u64) -> Self {
        Self {
            num_rows,
            num_bytes,
        }
    }

    pub fn of(partition: &Partition) -> Self {
        Self::new(partition.num_rows() as u64, partition.memory_size() as u64)
    }
}

impl fmt::Display for PartitionStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "numRows={}, numBytes={}", self.num_rows, self.num_bytes)
    }
}
