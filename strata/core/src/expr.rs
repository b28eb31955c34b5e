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

//! Row level expressions used by filters and projections.
//!
//! Expressions are evaluated one partition at a time with Arrow compute
//! kernels and always produce an array with one value per row.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Mul, Not, Sub};
use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array,
    Int64Array, StringArray,
};
use arrow::compute::kernels::{boolean, cmp, numeric};
use arrow::compute::{cast, is_not_null, is_null};
use arrow::datatypes::DataType;

use crate::error::{Result, StrataError};
use crate::partition::Partition;
use crate::types::{LogicalType, Schema};

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    /// Days since the UNIX epoch.
    Date(i32),
}

impl ScalarValue {
    pub fn logical_type(&self) -> LogicalType {
        match self {
            ScalarValue::Null => LogicalType::Null,
            ScalarValue::Boolean(_) => LogicalType::Boolean,
            ScalarValue::Int64(_) => LogicalType::Int64,
            ScalarValue::Float64(_) => LogicalType::Float64,
            ScalarValue::Utf8(_) => LogicalType::Utf8,
            ScalarValue::Date(_) => LogicalType::Date,
        }
    }

    /// Repeats the value `num_rows` times.
    pub fn to_array(&self, num_rows: usize) -> ArrayRef {
        match self {
            ScalarValue::Null => new_null_array(&DataType::Null, num_rows),
            ScalarValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v; num_rows])),
            ScalarValue::Int64(v) => Arc::new(Int64Array::from_value(*v, num_rows)),
            ScalarValue::Float64(v) => Arc::new(Float64Array::from_value(*v, num_rows)),
            ScalarValue::Utf8(v) => Arc::new(StringArray::from_iter_values(
                std::iter::repeat(v.as_str()).take(num_rows),
            )),
            ScalarValue::Date(v) => Arc::new(Date32Array::from_value(*v, num_rows)),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v:?}"),
            ScalarValue::Utf8(v) => write!(f, "'{v}'"),
            ScalarValue::Date(v) => write!(f, "Date({v})"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int64(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int64(v.into())
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float64(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Utf8(v)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ScalarValue::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    And,
    Or,
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::NotEq
                | Operator::Lt
                | Operator::LtEq
                | Operator::Gt
                | Operator::GtEq
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Operator::Plus | Operator::Minus | Operator::Multiply)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display = match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::And => "AND",
            Operator::Or => "OR",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(ScalarValue),
    BinaryExpr {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
}

/// Reference to the column `name`.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

pub fn lit(value: impl Into<ScalarValue>) -> Expr {
    Expr::Literal(value.into())
}

fn binary_expr(left: Expr, op: Operator, right: Expr) -> Expr {
    Expr::BinaryExpr {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

impl Expr {
    pub fn eq(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        binary_expr(self, Operator::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        binary_expr(self, Operator::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        binary_expr(self, Operator::GtEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        binary_expr(self, Operator::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Or, other)
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    /// Names of every column the expression reads.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut columns = BTreeSet::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns(&self, columns: &mut BTreeSet<String>) {
        match self {
            Expr::Column(name) => {
                columns.insert(name.clone());
            }
            Expr::Literal(_) => {}
            Expr::BinaryExpr { left, right, .. } => {
                left.collect_columns(columns);
                right.collect_columns(columns);
            }
            Expr::Not(expr) | Expr::IsNull(expr) | Expr::IsNotNull(expr) => {
                expr.collect_columns(columns)
            }
        }
    }

    /// Type of the values the expression produces over `schema`.
    pub fn data_type(&self, schema: &Schema) -> Result<LogicalType> {
        match self {
            Expr::Column(name) => schema.column_type(name),
            Expr::Literal(value) => Ok(value.logical_type()),
            Expr::BinaryExpr { left, op, right } => {
                let l = left.data_type(schema)?;
                let r = right.data_type(schema)?;
                binary_type(l, *op, r).ok_or_else(|| {
                    StrataError::InvalidArgument(format!(
                        "cannot apply '{op}' to {l} and {r} in {self}"
                    ))
                })
            }
            Expr::Not(expr) => match expr.data_type(schema)? {
                LogicalType::Boolean | LogicalType::Null => Ok(LogicalType::Boolean),
                other => Err(StrataError::InvalidArgument(format!(
                    "NOT expects a Boolean operand, got {other} in {self}"
                ))),
            },
            Expr::IsNull(expr) | Expr::IsNotNull(expr) => {
                expr.data_type(schema)?;
                Ok(LogicalType::Boolean)
            }
        }
    }

    /// Evaluates the expression over every row of `partition`.
    pub fn evaluate(&self, partition: &Partition) -> Result<ArrayRef> {
        let num_rows = partition.num_rows();
        match self {
            Expr::Column(name) => Ok(partition.column_by_name(name)?.clone()),
            Expr::Literal(value) => Ok(value.to_array(num_rows)),
            Expr::BinaryExpr { left, op, right } => {
                let l = left.evaluate(partition)?;
                let r = right.evaluate(partition)?;
                evaluate_binary(&l, *op, &r, num_rows)
            }
            Expr::Not(expr) => {
                let array = as_boolean(expr.evaluate(partition)?)?;
                Ok(Arc::new(boolean::not(&array)?))
            }
            Expr::IsNull(expr) => Ok(Arc::new(is_null(&expr.evaluate(partition)?)?)),
            Expr::IsNotNull(expr) => Ok(Arc::new(is_not_null(&expr.evaluate(partition)?)?)),
        }
    }

    /// Evaluates a Boolean expression; a null result counts as false when
    /// used as a filter.
    pub fn evaluate_predicate(&self, partition: &Partition) -> Result<BooleanArray> {
        as_boolean(self.evaluate(partition)?)
    }
}

fn is_numeric(t: LogicalType) -> bool {
    matches!(t, LogicalType::Int64 | LogicalType::Float64)
}

/// Common type both operands of a comparison or arithmetic are cast to.
fn coerce(l: LogicalType, r: LogicalType) -> Option<LogicalType> {
    match (l, r) {
        (l, r) if l == r => Some(l),
        (LogicalType::Null, other) | (other, LogicalType::Null) => Some(other),
        (l, r) if is_numeric(l) && is_numeric(r) => Some(LogicalType::Float64),
        _ => None,
    }
}

fn binary_type(l: LogicalType, op: Operator, r: LogicalType) -> Option<LogicalType> {
    match op {
        _ if op.is_comparison() => coerce(l, r).map(|_| LogicalType::Boolean),
        _ if op.is_arithmetic() => match coerce(l, r)? {
            t if is_numeric(t) || t == LogicalType::Null => Some(t),
            _ => None,
        },
        _ => match coerce(l, r)? {
            LogicalType::Boolean | LogicalType::Null => Some(LogicalType::Boolean),
            _ => None,
        },
    }
}

fn as_boolean(array: ArrayRef) -> Result<BooleanArray> {
    let array = match array.data_type() {
        DataType::Null => cast(&array, &DataType::Boolean)?,
        _ => array,
    };
    array.as_boolean_opt().cloned().ok_or_else(|| {
        StrataError::InvalidArgument(format!(
            "expected a Boolean array, got {}",
            array.data_type()
        ))
    })
}

fn coerce_arrays(l: &ArrayRef, r: &ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    let target = match (l.data_type(), r.data_type()) {
        (a, b) if a == b => return Ok((l.clone(), r.clone())),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        (a, b) => {
            return Err(StrataError::InvalidArgument(format!(
                "incompatible operand types {a} and {b}"
            )))
        }
    };
    Ok((cast(l, &target)?, cast(r, &target)?))
}

fn evaluate_binary(l: &ArrayRef, op: Operator, r: &ArrayRef, num_rows: usize) -> Result<ArrayRef> {
    if op == Operator::And || op == Operator::Or {
        let l = as_boolean(l.clone())?;
        let r = as_boolean(r.clone())?;
        let result = match op {
            Operator::And => boolean::and_kleene(&l, &r)?,
            _ => boolean::or_kleene(&l, &r)?,
        };
        return Ok(Arc::new(result));
    }

    let (l, r) = coerce_arrays(l, r)?;
    if l.data_type() == &DataType::Null {
        let result_type = if op.is_comparison() {
            DataType::Boolean
        } else {
            DataType::Null
        };
        return Ok(new_null_array(&result_type, num_rows));
    }
    let l = l.as_ref();
    let r = r.as_ref();
    let result: ArrayRef = match op {
        Operator::Eq => Arc::new(cmp::eq(&l, &r)?),
        Operator::NotEq => Arc::new(cmp::neq(&l, &r)?),
        Operator::Lt => Arc::new(cmp::lt(&l, &r)?),
        Operator::LtEq => Arc::new(cmp::lt_eq(&l, &r)?),
        Operator::Gt => Arc::new(cmp::gt(&l, &r)?),
        Operator::GtEq => Arc::new(cmp::gt_eq(&l, &r)?),
        Operator::Plus => numeric::add(&l, &r)?,
        Operator::Minus => numeric::sub(&l, &r)?,
        Operator::Multiply => numeric::mul(&l, &r)?,
        Operator::And | Operator::Or => {
            return Err(StrataError::Internal(format!(
                "boolean operator '{op}' reached the arithmetic path"
            )))
        }
    };
    Ok(result)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{name}"),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::BinaryExpr { left, op, right } => write!(f, "({left} {op} {right})"),
            Expr::Not(expr) => write!(f, "NOT {expr}"),
            Expr::IsNull(expr) => write!(f, "{expr} IS NULL"),
            Expr::IsNotNull(expr) => write!(f, "{expr} IS NOT NULL"),
        }
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::Plus, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::Minus, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        binary_expr(self, Operator::Multiply, rhs)
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}
