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

//! Composite row comparator.
//!
//! A [`RowComparator`] is built once per sort from a schema and a
//! [`SortSpec`]. It is then bound to a pair of record batches, which resolves
//! and downcasts the key columns a single time, and the resulting
//! [`BoundComparator`] compares rows by position.
//!
//! Keys are compared in spec order and the first non-equal key decides. A
//! null is lower than every non-null value; a descending key reverses the
//! whole order for that key, so nulls come first when ascending and last
//! when descending. Floats follow the IEEE 754 total order, except that every
//! NaN, whatever its sign or payload, is equal to every other NaN and above
//! positive infinity.

use std::cmp::Ordering;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int64Array,
    StringArray,
};
use arrow::datatypes::{Date32Type, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;

use crate::error::{Result, StrataError};
use crate::ordering::SortSpec;
use crate::types::{LogicalType, Schema};

#[derive(Debug, Clone)]
struct SortKey {
    column: String,
    index: usize,
    logical_type: LogicalType,
    descending: bool,
}

/// Lexicographic comparator over the sort keys of a schema.
#[derive(Debug, Clone)]
pub struct RowComparator {
    spec: SortSpec,
    keys: Vec<SortKey>,
}

impl RowComparator {
    /// Resolves every key of `spec` against `schema`.
    ///
    /// Fails with [`StrataError::InvalidSortKey`] when a key column is missing
    /// or its type has no total order.
    pub fn try_new(schema: &Schema, spec: &SortSpec) -> Result<Self> {
        spec.validate(schema)?;
        let keys = spec
            .fields()
            .iter()
            .map(|field| {
                let index = schema.index_of(&field.column).ok_or_else(|| {
                    StrataError::InvalidSortKey(format!(
                        "column '{}' not found",
                        field.column
                    ))
                })?;
                Ok(SortKey {
                    column: field.column.clone(),
                    index,
                    logical_type: schema.fields()[index].logical_type(),
                    descending: field.descending,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            spec: spec.clone(),
            keys,
        })
    }

    pub fn spec(&self) -> &SortSpec {
        &self.spec
    }

    /// Binds the comparator to two batches; row `l` of `left` can then be
    /// compared with row `r` of `right`.
    pub fn bind<'a>(
        &self,
        left: &'a RecordBatch,
        right: &'a RecordBatch,
    ) -> Result<BoundComparator<'a>> {
        let keys = self
            .keys
            .iter()
            .map(|key| {
                Ok(KeyComparator {
                    arrays: KeyArrays::try_new(key, left, right)?,
                    descending: key.descending,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundComparator { keys })
    }

    /// Compares a single pair of rows. Prefer [`RowComparator::bind`] when
    /// comparing many rows of the same batches.
    pub fn compare(
        &self,
        left: &RecordBatch,
        left_row: usize,
        right: &RecordBatch,
        right_row: usize,
    ) -> Result<Ordering> {
        if left_row >= left.num_rows() || right_row >= right.num_rows() {
            return Err(StrataError::ComparisonError(format!(
                "row {left_row} / {right_row} out of bounds for batches of {} / {} rows",
                left.num_rows(),
                right.num_rows()
            )));
        }
        Ok(self.bind(left, right)?.compare(left_row, right_row))
    }
}

/// A [`RowComparator`] bound to concrete key arrays.
pub struct BoundComparator<'a> {
    keys: Vec<KeyComparator<'a>>,
}

impl BoundComparator<'_> {
    /// Compares row `left` of the left batch with row `right` of the right
    /// batch. Both positions must be in bounds.
    pub fn compare(&self, left: usize, right: usize) -> Ordering {
        for key in &self.keys {
            match key.compare(left, right) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

struct KeyComparator<'a> {
    arrays: KeyArrays<'a>,
    descending: bool,
}

impl KeyComparator<'_> {
    fn compare(&self, l: usize, r: usize) -> Ordering {
        let ord = match &self.arrays {
            KeyArrays::Boolean(a, b) => {
                nulls_first(*a, l, *b, r, || a.value(l).cmp(&b.value(r)))
            }
            KeyArrays::Int64(a, b) => {
                nulls_first(*a, l, *b, r, || a.value(l).cmp(&b.value(r)))
            }
            KeyArrays::Float64(a, b) => {
                nulls_first(*a, l, *b, r, || compare_floats(a.value(l), b.value(r)))
            }
            KeyArrays::Utf8(a, b) => {
                nulls_first(*a, l, *b, r, || a.value(l).cmp(b.value(r)))
            }
            KeyArrays::Date(a, b) => {
                nulls_first(*a, l, *b, r, || a.value(l).cmp(&b.value(r)))
            }
        };
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

fn compare_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

fn nulls_first<A: Array>(
    left: &A,
    l: usize,
    right: &A,
    r: usize,
    values: impl FnOnce() -> Ordering,
) -> Ordering {
    match (left.is_null(l), right.is_null(r)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => values(),
    }
}

enum KeyArrays<'a> {
    Boolean(&'a BooleanArray, &'a BooleanArray),
    Int64(&'a Int64Array, &'a Int64Array),
    Float64(&'a Float64Array, &'a Float64Array),
    Utf8(&'a StringArray, &'a StringArray),
    Date(&'a Date32Array, &'a Date32Array),
}

impl<'a> KeyArrays<'a> {
    fn try_new(key: &SortKey, left: &'a RecordBatch, right: &'a RecordBatch) -> Result<Self> {
        let l = key_column(key, left)?;
        let r = key_column(key, right)?;
        let mismatch = || {
            StrataError::ComparisonError(format!(
                "sort key '{}' is declared as {} but the data holds {} and {}",
                key.column,
                key.logical_type,
                l.data_type(),
                r.data_type()
            ))
        };
        let arrays = match key.logical_type {
            LogicalType::Boolean => KeyArrays::Boolean(
                l.as_boolean_opt().ok_or_else(mismatch)?,
                r.as_boolean_opt().ok_or_else(mismatch)?,
            ),
            LogicalType::Int64 => KeyArrays::Int64(
                l.as_primitive_opt::<Int64Type>().ok_or_else(mismatch)?,
                r.as_primitive_opt::<Int64Type>().ok_or_else(mismatch)?,
            ),
            LogicalType::Float64 => KeyArrays::Float64(
                l.as_primitive_opt::<Float64Type>().ok_or_else(mismatch)?,
                r.as_primitive_opt::<Float64Type>().ok_or_else(mismatch)?,
            ),
            LogicalType::Utf8 => KeyArrays::Utf8(
                l.as_string_opt::<i32>().ok_or_else(mismatch)?,
                r.as_string_opt::<i32>().ok_or_else(mismatch)?,
            ),
            LogicalType::Date => KeyArrays::Date(
                l.as_primitive_opt::<Date32Type>().ok_or_else(mismatch)?,
                r.as_primitive_opt::<Date32Type>().ok_or_else(mismatch)?,
            ),
            LogicalType::Null | LogicalType::Binary | LogicalType::Image(_) => {
                return Err(StrataError::InvalidSortKey(format!(
                    "column '{}' of type {} does not support a total order",
                    key.column, key.logical_type
                )))
            }
        };
        Ok(arrays)
    }
}

fn key_column<'a>(key: &SortKey, batch: &'a RecordBatch) -> Result<&'a ArrayRef> {
    let schema = batch.schema_ref();
    match (batch.columns().get(key.index), schema.fields().get(key.index)) {
        (Some(column), Some(field)) if field.name() == &key.column => Ok(column),
        _ => Err(StrataError::ComparisonError(format!(
            "sort key '{}' is not column {} of the batch being compared",
            key.column, key.index
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::SortField;
    use crate::types::Field;
    use std::sync::Arc;

    fn schema() -> Schema {
        Schema::try_new(vec![
            Field::new("a", LogicalType::Int64),
            Field::new("b", LogicalType::Utf8),
            Field::new("f", LogicalType::Float64),
        ])
        .unwrap()
    }

    fn batch(a: Vec<Option<i64>>, b: Vec<Option<&str>>, f: Vec<Option<f64>>) -> RecordBatch {
        RecordBatch::try_new(
            schema().arrow_schema().clone(),
            vec![
                Arc::new(Int64Array::from(a)),
                Arc::new(StringArray::from(b)),
                Arc::new(Float64Array::from(f)),
            ],
        )
        .unwrap()
    }

    fn comparator(fields: Vec<SortField>) -> RowComparator {
        RowComparator::try_new(&schema(), &SortSpec::try_new(fields).unwrap()).unwrap()
    }

    #[test]
    fn nulls_first_ascending_last_descending() -> Result<()> {
        let data = batch(vec![None, Some(1)], vec![None, None], vec![None, None]);

        let asc = comparator(vec![SortField::asc("a")]);
        assert_eq!(asc.compare(&data, 0, &data, 1)?, Ordering::Less);

        let desc = comparator(vec![SortField::desc("a")]);
        assert_eq!(desc.compare(&data, 0, &data, 1)?, Ordering::Greater);
        assert_eq!(desc.compare(&data, 0, &data, 0)?, Ordering::Equal);
        Ok(())
    }

    #[test]
    fn later_keys_break_ties() -> Result<()> {
        let data = batch(
            vec![Some(1), Some(1), Some(0)],
            vec![Some("x"), Some("y"), Some("z")],
            vec![None, None, None],
        );
        let cmp = comparator(vec![SortField::asc("a"), SortField::desc("b")]);
        let bound = cmp.bind(&data, &data)?;
        assert_eq!(bound.compare(0, 1), Ordering::Greater);
        assert_eq!(bound.compare(1, 0), Ordering::Less);
        assert_eq!(bound.compare(2, 0), Ordering::Less);
        assert_eq!(bound.compare(1, 1), Ordering::Equal);
        Ok(())
    }

    #[test]
    fn floats_use_total_order() -> Result<()> {
        let data = batch(
            vec![None, None, None],
            vec![None, None, None],
            vec![Some(f64::NAN), Some(f64::INFINITY), Some(-0.0)],
        );
        let bound_cmp = comparator(vec![SortField::asc("f")]);
        let bound = bound_cmp.bind(&data, &data)?;
        assert_eq!(bound.compare(0, 1), Ordering::Greater);
        assert_eq!(bound.compare(2, 1), Ordering::Less);
        assert_eq!(bound.compare(0, 0), Ordering::Equal);
        Ok(())
    }

    #[test]
    fn negative_nan_sorts_with_nan_above_infinity() -> Result<()> {
        let negative_nan = -f64::NAN;
        assert!(negative_nan.is_sign_negative());
        let data = batch(
            vec![None, None, None, None],
            vec![None, None, None, None],
            vec![
                Some(negative_nan),
                Some(f64::NEG_INFINITY),
                Some(f64::NAN),
                Some(f64::INFINITY),
            ],
        );
        let asc = comparator(vec![SortField::asc("f")]);
        let bound = asc.bind(&data, &data)?;
        assert_eq!(bound.compare(0, 1), Ordering::Greater);
        assert_eq!(bound.compare(0, 3), Ordering::Greater);
        assert_eq!(bound.compare(0, 2), Ordering::Equal);

        let desc = comparator(vec![SortField::desc("f")]);
        let bound = desc.bind(&data, &data)?;
        assert_eq!(bound.compare(0, 3), Ordering::Less);
        assert_eq!(bound.compare(2, 0), Ordering::Equal);
        Ok(())
    }

    #[test]
    fn compares_across_batches() -> Result<()> {
        let left = batch(vec![Some(5)], vec![Some("a")], vec![None]);
        let right = batch(vec![Some(2), Some(9)], vec![Some("a"), Some("a")], vec![None, None]);
        let cmp = comparator(vec![SortField::asc("a")]);
        let bound = cmp.bind(&left, &right)?;
        assert_eq!(bound.compare(0, 0), Ordering::Greater);
        assert_eq!(bound.compare(0, 1), Ordering::Less);
        Ok(())
    }

    #[test]
    fn invalid_keys_fail_at_build_time() {
        let schema = Schema::try_new(vec![
            Field::new("a", LogicalType::Int64),
            Field::new("raw", LogicalType::Binary),
        ])
        .unwrap();
        for column in ["raw", "missing"] {
            let spec = SortSpec::try_new(vec![SortField::asc(column)]).unwrap();
            assert!(matches!(
                RowComparator::try_new(&schema, &spec),
                Err(StrataError::InvalidSortKey(_))
            ));
        }
    }

    #[test]
    fn malformed_data_is_a_comparison_error() {
        let cmp = comparator(vec![SortField::asc("a")]);
        let other = Schema::try_new(vec![Field::new("a", LogicalType::Utf8)]).unwrap();
        let malformed = RecordBatch::try_new(
            other.arrow_schema().clone(),
            vec![Arc::new(StringArray::from(vec!["1"]))],
        )
        .unwrap();
        assert!(matches!(
            cmp.bind(&malformed, &malformed),
            Err(StrataError::ComparisonError(_))
        ));

        let data = batch(vec![Some(1)], vec![Some("a")], vec![None]);
        assert!(matches!(
            cmp.compare(&data, 0, &data, 3),
            Err(StrataError::ComparisonError(_))
        ));
    }
}
