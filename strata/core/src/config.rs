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

//! Strata configuration

use std::collections::HashMap;
use std::fmt;
use std::result;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{Result, StrataError};

use arrow::datatypes::DataType;

/// number of rows drawn from every input partition when choosing sort split points
pub const STRATA_SORT_SAMPLE_SIZE: &str = "strata.sort.sample_size";
/// number of output partitions produced by a sort, 0 keeps the input partition count
pub const STRATA_SORT_TARGET_PARTITIONS: &str = "strata.sort.target_partitions";
/// seed used for sort sampling
pub const STRATA_SORT_SAMPLE_SEED: &str = "strata.sort.sample_seed";
/// seed used by the random fanout of `repartition`
pub const STRATA_REPARTITION_SEED: &str = "strata.repartition.seed";
/// maximum number of partition tasks running at the same time
pub const STRATA_EXECUTION_PARALLELISM: &str = "strata.execution.parallelism";
/// where shuffle buckets are kept between the map and reduce side
pub const STRATA_SHUFFLE_STORE: &str = "strata.shuffle.store";
/// root directory of the disk shuffle store
pub const STRATA_SHUFFLE_WORK_DIR: &str = "strata.shuffle.work_dir";

pub type ParseResult<T> = result::Result<T, String>;

static CONFIG_ENTRIES: LazyLock<HashMap<String, ConfigEntry>> = LazyLock::new(|| {
    let entries = vec![
        ConfigEntry::new(STRATA_SORT_SAMPLE_SIZE.to_string(),
                         "Number of rows sampled from each input partition to pick range boundaries for a global sort".to_string(),
                         DataType::UInt64, Some(32.to_string())),
        ConfigEntry::new(STRATA_SORT_TARGET_PARTITIONS.to_string(),
                         "Number of output partitions of a global sort, 0 keeps the input partition count".to_string(),
                         DataType::UInt64, Some(0.to_string())),
        ConfigEntry::new(STRATA_SORT_SAMPLE_SEED.to_string(),
                         "Seed of the random generator used for sort sampling".to_string(),
                         DataType::UInt64, Some(0.to_string())),
        ConfigEntry::new(STRATA_REPARTITION_SEED.to_string(),
                         "Seed of the random generator used to fan rows out on repartition".to_string(),
                         DataType::UInt64, Some(0.to_string())),
        ConfigEntry::new(STRATA_EXECUTION_PARALLELISM.to_string(),
                        "Maximum number of partition tasks executed concurrently".to_string(),
                        DataType::UInt64, Some(std::thread::available_parallelism().map(|v| v.get()).unwrap_or(1).to_string())),
        ConfigEntry::new(STRATA_SHUFFLE_STORE.to_string(),
                         "Partition store holding shuffle buckets, either 'memory' or 'disk'".to_string(),
                         DataType::Utf8, Some(ShuffleStoreKind::Memory.to_string())),
        ConfigEntry::new(STRATA_SHUFFLE_WORK_DIR.to_string(),
                         "Root directory for the disk shuffle store".to_string(),
                         DataType::Utf8, Some(std::env::temp_dir().join("strata").display().to_string())),
    ];
    entries
        .into_iter()
        .map(|e| (e.name.clone(), e))
        .collect::<HashMap<_, _>>()
});

/// Configuration option meta-data
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    name: String,
    description: String,
    data_type: DataType,
    default_value: Option<String>,
}

impl ConfigEntry {
    fn new(
        name: String,
        description: String,
        data_type: DataType,
        default_value: Option<String>,
    ) -> Self {
        Self {
            name,
            description,
            data_type,
            default_value,
        }
    }

    /// Name of the setting
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Default value, if any
    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }
}

/// Partition store implementation used by shuffles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ShuffleStoreKind {
    #[default]
    Memory,
    Disk,
}

impl fmt::Display for ShuffleStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShuffleStoreKind::Memory => write!(f, "memory"),
            ShuffleStoreKind::Disk => write!(f, "disk"),
        }
    }
}

impl FromStr for ShuffleStoreKind {
    type Err = String;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(ShuffleStoreKind::Memory),
            "disk" => Ok(ShuffleStoreKind::Disk),
            other => Err(format!("unknown shuffle store '{other}'")),
        }
    }
}

/// Strata configuration
///
/// Settings are kept as strings so they can be passed around as plain
/// key-value pairs; every value is validated when it is set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StrataConfig {
    /// Validated settings keyed by configuration name
    settings: HashMap<String, String>,
}

impl StrataConfig {
    /// Create a new configuration based on key-value pairs
    pub fn with_settings(settings: HashMap<String, String>) -> Result<Self> {
        let supported_entries = StrataConfig::valid_entries();
        for name in settings.keys() {
            if !supported_entries.contains_key(name) {
                return Err(StrataError::Configuration(format!(
                    "configuration key `{name}` does not exist"
                )));
            }
        }
        for (name, entry) in supported_entries {
            if let Some(v) = settings.get(name) {
                // validate that we can parse the user-supplied value
                Self::parse_value(name, v.as_str(), entry.data_type.clone()).map_err(|e| StrataError::Configuration(format!("Failed to parse user-supplied value '{v}' for configuration setting '{name}': {e}")))?;
            } else if let Some(v) = entry.default_value.clone() {
                Self::parse_value(name, v.as_str(), entry.data_type.clone()).map_err(|e| StrataError::Configuration(format!("Failed to parse default value '{v}' for configuration setting '{name}': {e}")))?;
            } else {
                return Err(StrataError::Configuration(format!(
                    "No value specified for mandatory configuration setting '{name}'"
                )));
            }
        }

        Ok(Self { settings })
    }

    /// Sets a single value, validating it first
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let entry = Self::valid_entries().get(key).ok_or_else(|| {
            StrataError::Configuration(format!(
                "configuration key `{key}` does not exist"
            ))
        })?;
        Self::parse_value(key, value, entry.data_type.clone()).map_err(|e| {
            StrataError::Configuration(format!(
                "Failed to parse user-supplied value '{value}' for configuration setting '{key}': {e}"
            ))
        })?;
        self.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Builder style variant of [`StrataConfig::set`]
    pub fn with_setting(mut self, key: &str, value: &str) -> Result<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn with_sort_sample_size(self, sample_size: usize) -> Result<Self> {
        self.with_setting(STRATA_SORT_SAMPLE_SIZE, &sample_size.to_string())
    }

    pub fn with_sort_target_partitions(self, partitions: usize) -> Result<Self> {
        self.with_setting(STRATA_SORT_TARGET_PARTITIONS, &partitions.to_string())
    }

    pub fn with_execution_parallelism(self, parallelism: usize) -> Result<Self> {
        self.with_setting(STRATA_EXECUTION_PARALLELISM, &parallelism.to_string())
    }

    pub fn with_shuffle_store(self, kind: ShuffleStoreKind) -> Result<Self> {
        self.with_setting(STRATA_SHUFFLE_STORE, &kind.to_string())
    }

    pub fn with_shuffle_work_dir(self, work_dir: &str) -> Result<Self> {
        self.with_setting(STRATA_SHUFFLE_WORK_DIR, work_dir)
    }

    pub fn parse_value(name: &str, val: &str, data_type: DataType) -> ParseResult<()> {
        match data_type {
            DataType::UInt64 => {
                val.parse::<u64>().map_err(|e| format!("{e:?}"))?;
            }
            DataType::Boolean => {
                val.parse::<bool>().map_err(|e| format!("{e:?}"))?;
            }
            DataType::Utf8 => {}
            _ => {
                return Err(format!("not support data type: {data_type}"));
            }
        }

        match name {
            STRATA_EXECUTION_PARALLELISM if val == "0" => {
                Err("parallelism must be at least 1".to_string())
            }
            STRATA_SHUFFLE_STORE => ShuffleStoreKind::from_str(val).map(|_| ()),
            _ => Ok(()),
        }
    }

    // All available configuration options
    pub fn valid_entries() -> &'static HashMap<String, ConfigEntry> {
        &CONFIG_ENTRIES
    }

    pub fn settings(&self) -> &HashMap<String, String> {
        &self.settings
    }

    pub fn sort_sample_size(&self) -> usize {
        self.get_usize_setting(STRATA_SORT_SAMPLE_SIZE)
    }

    /// Requested sort output partition count, `None` when the input count is kept
    pub fn sort_target_partitions(&self) -> Option<usize> {
        match self.get_usize_setting(STRATA_SORT_TARGET_PARTITIONS) {
            0 => None,
            n => Some(n),
        }
    }

    pub fn sort_sample_seed(&self) -> u64 {
        self.get_usize_setting(STRATA_SORT_SAMPLE_SEED) as u64
    }

    pub fn repartition_seed(&self) -> u64 {
        self.get_usize_setting(STRATA_REPARTITION_SEED) as u64
    }

    pub fn execution_parallelism(&self) -> usize {
        self.get_usize_setting(STRATA_EXECUTION_PARALLELISM)
    }

    pub fn shuffle_store(&self) -> ShuffleStoreKind {
        // infallible because we validate all configs when they are set
        self.get_string_setting(STRATA_SHUFFLE_STORE)
            .parse()
            .unwrap_or_default()
    }

    pub fn shuffle_work_dir(&self) -> String {
        self.get_string_setting(STRATA_SHUFFLE_WORK_DIR)
    }

    fn get_usize_setting(&self, key: &str) -> usize {
        // infallible because we validate all configs when they are set
        self.get_string_setting(key).parse().unwrap_or_default()
    }

    fn get_string_setting(&self, key: &str) -> String {
        if let Some(v) = self.settings.get(key) {
            v.to_string()
        } else {
            Self::valid_entries()
                .get(key)
                .and_then(|entry| entry.default_value.clone())
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() -> Result<()> {
        let config = StrataConfig::default();
        assert_eq!(32, config.sort_sample_size());
        assert_eq!(None, config.sort_target_partitions());
        assert_eq!(0, config.sort_sample_seed());
        assert_eq!(ShuffleStoreKind::Memory, config.shuffle_store());
        assert!(config.execution_parallelism() >= 1);
        Ok(())
    }

    #[test]
    fn custom_config() -> Result<()> {
        let settings = HashMap::from([
            (STRATA_SORT_SAMPLE_SIZE.to_string(), "4".to_string()),
            (STRATA_SORT_TARGET_PARTITIONS.to_string(), "7".to_string()),
            (STRATA_SHUFFLE_STORE.to_string(), "disk".to_string()),
        ]);
        let config = StrataConfig::with_settings(settings)?;
        assert_eq!(4, config.sort_sample_size());
        assert_eq!(Some(7), config.sort_target_partitions());
        assert_eq!(ShuffleStoreKind::Disk, config.shuffle_store());
        Ok(())
    }

    #[test]
    fn builder_overrides() -> Result<()> {
        let config = StrataConfig::default()
            .with_execution_parallelism(3)?
            .with_sort_sample_size(1)?;
        assert_eq!(3, config.execution_parallelism());
        assert_eq!(1, config.sort_sample_size());
        Ok(())
    }

    #[test]
    fn rejects_invalid_values() {
        let bad_number = HashMap::from([(
            STRATA_SORT_SAMPLE_SIZE.to_string(),
            "lots".to_string(),
        )]);
        assert!(matches!(
            StrataConfig::with_settings(bad_number),
            Err(StrataError::Configuration(_))
        ));

        let mut config = StrataConfig::default();
        assert!(config.set(STRATA_SHUFFLE_STORE, "s3").is_err());
        assert!(config.set(STRATA_EXECUTION_PARALLELISM, "0").is_err());
        assert!(config.set("strata.unknown", "1").is_err());
        assert_eq!(config, StrataConfig::default());
    }
}
