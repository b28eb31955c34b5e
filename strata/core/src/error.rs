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

//! Strata error types

use std::{
    error::Error,
    fmt::{Display, Formatter},
    io, result,
};

use arrow::error::ArrowError;

/// Result type alias for Strata operations.
pub type Result<T> = result::Result<T, StrataError>;

/// Strata error types for plan construction and partitioned execution.
#[derive(Debug)]
pub enum StrataError {
    /// A sort key is missing from the schema or its type has no total order.
    InvalidSortKey(String),
    /// The same column appears more than once in a sort specification.
    DuplicateSortKey(String),
    /// Two values could not be compared, usually because a column does not
    /// hold the type its schema declares.
    ComparisonError(String),
    /// Sampling or redistribution failed; the input dataset is left untouched.
    SortExecutionError(String),
    /// Schema mismatch or unknown column.
    Schema(String),
    /// Argument rejected at plan construction time.
    InvalidArgument(String),
    /// Configuration error with invalid settings.
    Configuration(String),
    /// General error with a descriptive message.
    General(String),
    /// Internal error indicating a bug or unexpected state.
    Internal(String),
    /// Error from Arrow operations.
    ArrowError(Box<ArrowError>),
    /// I/O operation error.
    IoError(io::Error),
    /// Tokio task join error.
    TokioError(tokio::task::JoinError),
    /// Operation was cancelled.
    Cancelled,
}

impl StrataError {
    /// Re-labels infrastructure failures raised while shuffling as
    /// [`StrataError::SortExecutionError`]. Errors that already carry sort
    /// semantics, and cancellation, are passed through.
    pub fn into_sort_execution_error(self) -> StrataError {
        match self {
            e @ (StrataError::InvalidSortKey(_)
            | StrataError::DuplicateSortKey(_)
            | StrataError::ComparisonError(_)
            | StrataError::SortExecutionError(_)
            | StrataError::Cancelled) => e,
            other => StrataError::SortExecutionError(other.to_string()),
        }
    }
}

impl From<String> for StrataError {
    fn from(e: String) -> Self {
        StrataError::General(e)
    }
}

impl From<ArrowError> for StrataError {
    fn from(e: ArrowError) -> Self {
        match e {
            ArrowError::ExternalError(e) if e.downcast_ref::<StrataError>().is_some() => {
                match e.downcast::<StrataError>() {
                    Ok(e) => *e,
                    Err(e) => StrataError::ArrowError(Box::new(ArrowError::ExternalError(e))),
                }
            }
            ArrowError::IoError(msg, e) => {
                StrataError::IoError(io::Error::new(e.kind(), format!("{msg}: {e}")))
            }
            other => StrataError::ArrowError(Box::new(other)),
        }
    }
}

impl From<io::Error> for StrataError {
    fn from(e: io::Error) -> Self {
        StrataError::IoError(e)
    }
}

impl From<tokio::task::JoinError> for StrataError {
    fn from(e: tokio::task::JoinError) -> Self {
        StrataError::TokioError(e)
    }
}

impl Display for StrataError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            StrataError::InvalidSortKey(desc) => write!(f, "Invalid sort key: {desc}"),
            StrataError::DuplicateSortKey(column) => {
                write!(f, "Duplicate sort key: column '{column}' appears more than once")
            }
            StrataError::ComparisonError(desc) => write!(f, "Comparison error: {desc}"),
            StrataError::SortExecutionError(desc) => {
                write!(f, "Sort execution error: {desc}")
            }
            StrataError::Schema(desc) => write!(f, "Schema error: {desc}"),
            StrataError::InvalidArgument(desc) => write!(f, "Invalid argument: {desc}"),
            StrataError::Configuration(desc) => write!(f, "Configuration error: {desc}"),
            StrataError::General(desc) => write!(f, "General error: {desc}"),
            StrataError::Internal(desc) => {
                write!(f, "Internal Strata error: {desc}")
            }
            StrataError::ArrowError(e) => write!(f, "Arrow error: {e}"),
            StrataError::IoError(e) => write!(f, "IO error: {e}"),
            StrataError::TokioError(e) => write!(f, "Tokio join error: {e}"),
            StrataError::Cancelled => write!(f, "Task cancelled"),
        }
    }
}

impl Error for StrataError {}
