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

#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use strata::arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
};
use strata::arrow::datatypes::{DataType, Date32Type, Float64Type, Int64Type};
use strata::arrow::record_batch::RecordBatch;
use strata::prelude::*;
use strata_core::partition::Partition;

pub const ROW_NUM: &str = "row_num";

/// Installs a test logger once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Session with a small parallelism so tests exercise the task scheduling.
pub fn test_context() -> SessionContext {
    let config = StrataConfig::default()
        .with_execution_parallelism(2)
        .expect("valid parallelism");
    SessionContext::with_config(config).expect("session")
}

/// Name of the `i`-th generated sort key column.
pub fn sort_key(i: usize) -> String {
    format!("sort_key_{i}")
}

/// Key types that can be sorted on.
pub const TOTAL_ORDER_TYPES: [LogicalType; 5] = [
    LogicalType::Boolean,
    LogicalType::Int64,
    LogicalType::Float64,
    LogicalType::Utf8,
    LogicalType::Date,
];

/// Random column of `num_rows` values drawn from a small domain so that
/// duplicates and nulls are frequent.
pub fn random_column(rng: &mut StdRng, logical_type: LogicalType, num_rows: usize) -> ArrayRef {
    let mut valid = || rng.random_bool(0.85);
    let validity: Vec<bool> = (0..num_rows).map(|_| valid()).collect();
    match logical_type {
        LogicalType::Boolean => Arc::new(BooleanArray::from(
            validity
                .iter()
                .map(|v| v.then(|| rng.random_bool(0.5)))
                .collect::<Vec<_>>(),
        )),
        LogicalType::Int64 => Arc::new(Int64Array::from(
            validity
                .iter()
                .map(|v| v.then(|| rng.random_range(-3i64..4)))
                .collect::<Vec<_>>(),
        )),
        LogicalType::Float64 => Arc::new(Float64Array::from(
            validity
                .iter()
                .map(|v| {
                    v.then(|| match rng.random_range(0..8i32) {
                        0 if rng.random_bool(0.5) => -f64::NAN,
                        0 => f64::NAN,
                        1 => f64::NEG_INFINITY,
                        n => f64::from(n) / 2.0 - 2.0,
                    })
                })
                .collect::<Vec<_>>(),
        )),
        LogicalType::Utf8 => Arc::new(StringArray::from(
            validity
                .iter()
                .map(|v| v.then(|| ["", "a", "ab", "b", "ba"][rng.random_range(0..5)]))
                .collect::<Vec<_>>(),
        )),
        LogicalType::Date => Arc::new(Date32Array::from(
            validity
                .iter()
                .map(|v| v.then(|| rng.random_range(19_000i32..19_004)))
                .collect::<Vec<_>>(),
        )),
        other => panic!("no generator for {other}"),
    }
}

/// `num_keys` random sort key columns followed by a `row_num` column
/// enumerating the rows.
pub fn random_columns(
    rng: &mut StdRng,
    num_keys: usize,
    num_rows: usize,
) -> Vec<(String, ArrayRef)> {
    let mut columns: Vec<(String, ArrayRef)> = (0..num_keys)
        .map(|i| {
            let logical_type = TOTAL_ORDER_TYPES[rng.random_range(0..TOTAL_ORDER_TYPES.len())];
            (sort_key(i), random_column(rng, logical_type, num_rows))
        })
        .collect();
    columns.push((ROW_NUM.to_string(), row_nums(num_rows)));
    columns
}

pub fn row_nums(num_rows: usize) -> ArrayRef {
    Arc::new(Int64Array::from_iter_values(0..num_rows as i64))
}

/// Splits the rows of `batch` into `num_partitions` contiguous partitions.
pub fn split_dataset(schema: SchemaRef, batch: &RecordBatch, num_partitions: usize) -> Dataset {
    let num_rows = batch.num_rows();
    let partitions = (0..num_partitions)
        .map(|i| {
            let start = i * num_rows / num_partitions;
            let end = (i + 1) * num_rows / num_partitions;
            Partition::try_new(schema.clone(), batch.slice(start, end - start)).unwrap()
        })
        .collect();
    Dataset::try_new(schema, partitions).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(i32),
}

fn values(array: &ArrayRef) -> Vec<Option<Value>> {
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                return None;
            }
            Some(match array.data_type() {
                DataType::Boolean => Value::Bool(array.as_boolean().value(i)),
                DataType::Int64 => Value::Int(array.as_primitive::<Int64Type>().value(i)),
                DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(i)),
                DataType::Utf8 => Value::Str(array.as_string::<i32>().value(i).to_string()),
                DataType::Date32 => Value::Date(array.as_primitive::<Date32Type>().value(i)),
                other => panic!("unsupported key type {other}"),
            })
        })
        .collect()
}

fn compare_values(a: &Option<Value>, b: &Option<Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => a.total_cmp(b),
            },
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (a, b) => panic!("cannot compare {a:?} with {b:?}"),
        },
    }
}

/// Row positions of `batch` in the order a stable sort on `keys` puts them.
pub fn reference_order(batch: &RecordBatch, keys: &[(String, bool)]) -> Vec<usize> {
    let key_values: Vec<(Vec<Option<Value>>, bool)> = keys
        .iter()
        .map(|(name, descending)| {
            let index = batch.schema().index_of(name).unwrap();
            (values(batch.column(index)), *descending)
        })
        .collect();
    let mut order: Vec<usize> = (0..batch.num_rows()).collect();
    order.sort_by(|&l, &r| {
        key_values
            .iter()
            .map(|(values, descending)| {
                let ord = compare_values(&values[l], &values[r]);
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    order
}

pub fn int_column(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
    let index = batch.schema().index_of(name).unwrap();
    batch.column(index).as_primitive::<Int64Type>().iter().collect()
}

/// Asserts that `sorted` holds the rows of `input` in reference order,
/// identified by their `row_num`.
pub fn assert_sorted_like_reference(
    input: &RecordBatch,
    sorted: &RecordBatch,
    keys: &[(String, bool)],
) {
    let input_rows = int_column(input, ROW_NUM);
    let expected: Vec<Option<i64>> = reference_order(input, keys)
        .into_iter()
        .map(|i| input_rows[i])
        .collect();
    assert_eq!(int_column(sorted, ROW_NUM), expected, "sorted on {keys:?}");
}
