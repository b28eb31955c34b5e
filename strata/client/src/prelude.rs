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

//! Strata Prelude (common imports)

pub use strata_core::{
    config::{
        ShuffleStoreKind, StrataConfig, STRATA_EXECUTION_PARALLELISM,
        STRATA_REPARTITION_SEED, STRATA_SHUFFLE_STORE, STRATA_SHUFFLE_WORK_DIR,
        STRATA_SORT_SAMPLE_SEED, STRATA_SORT_SAMPLE_SIZE, STRATA_SORT_TARGET_PARTITIONS,
    },
    dataset::Dataset,
    error::{Result, StrataError},
    expr::{col, lit, Expr, ScalarValue},
    ordering::{OrderingTag, SortField, SortSpec},
    types::{Field, ImageEncoding, LogicalType, Schema, SchemaRef},
    utils::CancellationToken,
};

pub use crate::context::SessionContext;
pub use crate::dataframe::DataFrame;
