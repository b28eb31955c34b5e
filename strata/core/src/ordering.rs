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

//! Sort specifications and the ordering tag carried by datasets and plans.

use std::collections::{BTreeSet, HashSet};
use std::fmt;


use crate::error::{Result, StrataError};
use crate::types::Schema;

/// One key of a [`SortSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortField {
    pub column: String,
    pub descending: bool,
}

impl SortField {
    pub fn new(column: impl Into<String>, descending: bool) -> Self {
        Self {
            column: column.into(),
            descending,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, false)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, true)
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.descending {
            "descending"
        } else {
            "ascending"
        };
        write!(f, "({}, {direction})", self.column)
    }
}

/// Ordered list of sort keys, highest priority first.
///
/// A spec always has at least one key and never names a column twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortSpec {
    fields: Vec<SortField>,
}

impl SortSpec {
    pub fn try_new(fields: Vec<SortField>) -> Result<Self> {
        if fields.is_empty() {
            return Err(StrataError::InvalidSortKey(
                "a sort needs at least one key".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.column.as_str()) {
                return Err(StrataError::DuplicateSortKey(field.column.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// Pairs `columns` with `descending` flags, which must have the same length.
    pub fn try_from_columns<S: AsRef<str>>(columns: &[S], descending: &[bool]) -> Result<Self> {
        if columns.len() != descending.len() {
            return Err(StrataError::InvalidArgument(format!(
                "got {} sort columns but {} descending flags",
                columns.len(),
                descending.len()
            )));
        }
        Self::try_new(
            columns
                .iter()
                .zip(descending)
                .map(|(column, desc)| SortField::new(column.as_ref(), *desc))
                .collect(),
        )
    }

    /// Checks that every key exists in `schema` and has a totally ordered type.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for field in &self.fields {
            let logical_type = schema.field(&field.column).map(|f| f.logical_type()).ok_or_else(|| {
                StrataError::InvalidSortKey(format!(
                    "column '{}' not found in schema {schema}",
                    field.column
                ))
            })?;
            if !logical_type.supports_total_order() {
                return Err(StrataError::InvalidSortKey(format!(
                    "column '{}' of type {logical_type} does not support a total order",
                    field.column
                )));
            }
        }
        Ok(())
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|f| f.column == column)
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self
            .fields
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        write!(f, "{}", keys.join(", "))
    }
}

/// What a dataset is currently known to be sorted on.
///
/// The tag starts out [`OrderingTag::Unordered`], is set by a sort and is
/// only kept by operations that provably leave the global order intact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrderingTag {
    #[default]
    Unordered,
    OrderedOn(SortSpec),
}

impl OrderingTag {
    /// Re-sorting is always legal and replaces any previous tag.
    pub fn after_sort(&self, spec: &SortSpec) -> Self {
        OrderingTag::OrderedOn(spec.clone())
    }

    /// Row to partition assignment of a repartition is not order preserving,
    /// even when the partition count does not change.
    pub fn after_repartition(&self) -> Self {
        OrderingTag::Unordered
    }

    /// Filters drop rows but keep the relative order of the survivors.
    pub fn after_filter(&self) -> Self {
        self.clone()
    }

    /// A projection keeps the tag unless it writes `column` over a sort key
    /// or reads one of the sort keys in its expression.
    pub fn after_project(&self, column: &str, referenced: &BTreeSet<String>) -> Self {
        match self {
            OrderingTag::OrderedOn(spec)
                if !spec.contains(column) && !referenced.iter().any(|c| spec.contains(c)) =>
            {
                self.clone()
            }
            _ => OrderingTag::Unordered,
        }
    }

    pub fn is_ordered_on(&self, spec: &SortSpec) -> bool {
        matches!(self, OrderingTag::OrderedOn(s) if s == spec)
    }
}

impl fmt::Display for OrderingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingTag::Unordered => write!(f, "Unordered"),
            OrderingTag::OrderedOn(spec) => write!(f, "OrderedOn[{spec}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, LogicalType};

    fn spec() -> SortSpec {
        SortSpec::try_new(vec![SortField::asc("a"), SortField::desc("b")]).unwrap()
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let result = SortSpec::try_new(vec![SortField::asc("a"), SortField::desc("a")]);
        assert!(matches!(result, Err(StrataError::DuplicateSortKey(c)) if c == "a"));
    }

    #[test]
    fn empty_spec_is_rejected() {
        assert!(matches!(
            SortSpec::try_new(vec![]),
            Err(StrataError::InvalidSortKey(_))
        ));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(matches!(
            SortSpec::try_from_columns(&["a", "b"], &[true]),
            Err(StrataError::InvalidArgument(_))
        ));
    }

    #[test]
    fn validate_against_schema() {
        let schema = Schema::try_new(vec![
            Field::new("a", LogicalType::Int64),
            Field::new("b", LogicalType::Utf8),
            Field::new("blob", LogicalType::Binary),
            Field::new("nothing", LogicalType::Null),
        ])
        .unwrap();
        assert!(spec().validate(&schema).is_ok());

        for column in ["blob", "nothing", "missing"] {
            let spec = SortSpec::try_new(vec![SortField::asc(column)]).unwrap();
            assert!(
                matches!(spec.validate(&schema), Err(StrataError::InvalidSortKey(_))),
                "{column} must not be a valid sort key"
            );
        }
    }

    #[test]
    fn ordering_tag_transitions() {
        let tag = OrderingTag::Unordered.after_sort(&spec());
        assert!(tag.is_ordered_on(&spec()));

        let resorted = tag.after_sort(&SortSpec::try_new(vec![SortField::asc("c")]).unwrap());
        assert!(!resorted.is_ordered_on(&spec()));

        assert_eq!(tag.after_repartition(), OrderingTag::Unordered);
        assert_eq!(tag.after_filter(), tag);

        let untouched = BTreeSet::from(["c".to_string()]);
        assert_eq!(tag.after_project("d", &untouched), tag);

        let reads_key = BTreeSet::from(["a".to_string()]);
        assert_eq!(tag.after_project("d", &reads_key), OrderingTag::Unordered);
        assert_eq!(
            tag.after_project("b", &BTreeSet::new()),
            OrderingTag::Unordered
        );
        assert_eq!(
            OrderingTag::Unordered.after_project("d", &BTreeSet::new()),
            OrderingTag::Unordered
        );
    }

    #[test]
    fn display() {
        assert_eq!(spec().to_string(), "(a, ascending), (b, descending)");
        assert_eq!(
            OrderingTag::OrderedOn(spec()).to_string(),
            "OrderedOn[(a, ascending), (b, descending)]"
        );
    }
}
