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

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::{IpcWriteOptions, StreamWriter};
use arrow::ipc::CompressionType;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use log::{debug, error};

use crate::error::{Result, StrataError};
use crate::partition::Partition;
use crate::types::Schema;

use super::{PartitionStats, PartitionStore};

/// Partition store writing every partition as an LZ4 compressed Arrow IPC
/// stream file below a work directory.
#[derive(Debug, Clone)]
pub struct DiskPartitionStore {
    work_dir: PathBuf,
}

impl DiskPartitionStore {
    pub fn try_new(work_dir: impl Into<PathBuf>) -> Result<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir).map_err(|e| {
            error!("Failed to create shuffle work dir {work_dir:?}: {e:?}");
            StrataError::IoError(e)
        })?;
        Ok(Self { work_dir })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StrataError::General(format!(
                "Invalid partition path '{path}'"
            )));
        }
        Ok(self.work_dir.join(relative))
    }

    fn file_path(&self, path: &str) -> Result<PathBuf> {
        self.resolve(path)?;
        Ok(self.work_dir.join(format!("{path}.arrow")))
    }
}

fn write_partition(file_path: &Path, partition: &Partition) -> Result<PartitionStats> {
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(file_path).map_err(|e| {
        error!("Failed to create partition file at {file_path:?}: {e:?}");
        StrataError::IoError(e)
    })?;

    let options =
        IpcWriteOptions::default().try_with_compression(Some(CompressionType::LZ4_FRAME))?;
    let mut writer = StreamWriter::try_new_with_options(
        BufWriter::new(file),
        partition.schema().arrow_schema(),
        options,
    )?;
    writer.write(partition.batch())?;
    writer.finish()?;

    Ok(PartitionStats::of(partition))
}

fn read_partition(file_path: &Path) -> Result<Partition> {
    let file = File::open(file_path).map_err(|e| {
        StrataError::General(format!(
            "Failed to open partition file at {file_path:?}: {e:?}"
        ))
    })?;
    let reader = StreamReader::try_new(BufReader::new(file), None).map_err(|e| {
        StrataError::General(format!(
            "Failed to read arrow stream at {file_path:?}: {e:?}"
        ))
    })?;
    let schema = Arc::new(Schema::try_from_arrow(&reader.schema())?);
    let batches = reader.collect::<std::result::Result<Vec<RecordBatch>, _>>()?;
    let partitions = batches
        .into_iter()
        .map(|batch| Partition::try_new(schema.clone(), batch))
        .collect::<Result<Vec<_>>>()?;
    Partition::concat(schema, &partitions)
}

#[async_trait]
impl PartitionStore for DiskPartitionStore {
    async fn store_partition(&self, path: &str, partition: Partition) -> Result<PartitionStats> {
        let file_path = self.file_path(path)?;
        debug!("Writing partition {path} to {file_path:?}");
        tokio::task::spawn_blocking(move || write_partition(&file_path, &partition)).await?
    }

    async fn fetch_partition(&self, path: &str) -> Result<Partition> {
        let file_path = self.file_path(path)?;
        tokio::task::spawn_blocking(move || read_partition(&file_path)).await?
    }

    async fn delete_partition(&self, path: &str) -> Result<()> {
        let file_path = self.file_path(path)?;
        tokio::task::spawn_blocking(move || {
            fs::remove_file(&file_path).map_err(|e| {
                error!("Failed to delete partition file at {file_path:?}: {e:?}");
                StrataError::IoError(e)
            })
        })
        .await?
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let dir = self.resolve(prefix)?;
        tokio::task::spawn_blocking(move || match fs::remove_dir_all(&dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                error!("Failed to delete partition directory {dir:?}: {e:?}");
                Err(StrataError::IoError(e))
            }
            _ => Ok(()),
        })
        .await?
    }
}
