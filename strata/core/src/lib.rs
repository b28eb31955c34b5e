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

#![doc = include_str!("../README.md")]

pub use arrow;

/// The current version of Strata, derived from the Cargo package version.
pub const STRATA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prints the current Strata version to stdout.
pub fn print_version() {
    println!("Strata version: {STRATA_VERSION}")
}

/// Composite row comparator built from a schema and a sort specification.
pub mod comparator;
/// Configuration options and settings for Strata sessions.
pub mod config;
/// Materialized partitioned datasets.
pub mod dataset;
/// Error types and result definitions for Strata operations.
pub mod error;
/// Plan execution.
pub mod executor;
/// Expressions for filters and projections.
pub mod expr;
/// Sort specifications and the ordering tag.
pub mod ordering;
/// Immutable columnar partitions.
pub mod partition;
/// Storage of intermediate shuffle partitions.
pub mod partition_store;
/// Lazy logical plans and their builder.
pub mod plan;
/// Random fanout repartitioning.
pub mod repartition;
/// All-to-all partition exchange.
pub mod shuffle;
/// Distributed multi-key sort.
pub mod sort;
/// Logical types and schemas.
pub mod types;
/// Cancellation and parallel task helpers.
pub mod utils;
