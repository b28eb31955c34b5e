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

//! Logical types and schemas.
//!
//! Every column carries a [`LogicalType`], a closed set of tags that maps
//! onto an Arrow physical type. Whether a column may be used as a sort key
//! is decided from the tag alone, see [`LogicalType::supports_total_order`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{
    DataType, Field as ArrowField, Schema as ArrowSchema, SchemaRef as ArrowSchemaRef,
};

use crate::error::{Result, StrataError};

/// Arrow field metadata key holding the encoding of an image column.
pub const IMAGE_ENCODING_METADATA_KEY: &str = "strata.image.encoding";

/// Encoding of the bytes stored in an image column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageEncoding {
    Jpeg,
    Png,
}

impl ImageEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "jpeg",
            ImageEncoding::Png => "png",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "jpeg" => Some(ImageEncoding::Jpeg),
            "png" => Some(ImageEncoding::Png),
            _ => None,
        }
    }
}

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// Column that only holds nulls
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// Days since the UNIX epoch
    Date,
    /// Raw byte blobs
    Binary,
    /// Encoded image bytes, opaque to the engine
    Image(ImageEncoding),
}

impl LogicalType {
    /// Returns true if values of this type can be totally ordered and the
    /// type is therefore accepted as a sort key.
    pub fn supports_total_order(&self) -> bool {
        match self {
            LogicalType::Boolean
            | LogicalType::Int64
            | LogicalType::Float64
            | LogicalType::Utf8
            | LogicalType::Date => true,
            LogicalType::Null | LogicalType::Binary | LogicalType::Image(_) => false,
        }
    }

    /// Arrow type used to store values of this logical type.
    pub fn arrow_type(&self) -> DataType {
        match self {
            LogicalType::Null => DataType::Null,
            LogicalType::Boolean => DataType::Boolean,
            LogicalType::Int64 => DataType::Int64,
            LogicalType::Float64 => DataType::Float64,
            LogicalType::Utf8 => DataType::Utf8,
            LogicalType::Date => DataType::Date32,
            LogicalType::Binary | LogicalType::Image(_) => DataType::Binary,
        }
    }

    /// Infers the logical type of an Arrow field. Image columns are recognised
    /// through the [`IMAGE_ENCODING_METADATA_KEY`] metadata entry.
    pub fn try_from_arrow(field: &ArrowField) -> Result<Self> {
        let logical_type = match field.data_type() {
            DataType::Null => LogicalType::Null,
            DataType::Boolean => LogicalType::Boolean,
            DataType::Int64 => LogicalType::Int64,
            DataType::Float64 => LogicalType::Float64,
            DataType::Utf8 => LogicalType::Utf8,
            DataType::Date32 => LogicalType::Date,
            DataType::Binary => match field.metadata().get(IMAGE_ENCODING_METADATA_KEY) {
                Some(encoding) => {
                    LogicalType::Image(ImageEncoding::parse(encoding).ok_or_else(|| {
                        StrataError::Schema(format!(
                            "unknown image encoding '{encoding}' on column '{}'",
                            field.name()
                        ))
                    })?)
                }
                None => LogicalType::Binary,
            },
            other => {
                return Err(StrataError::Schema(format!(
                    "unsupported arrow type {other} for column '{}'",
                    field.name()
                )))
            }
        };
        Ok(logical_type)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Null => write!(f, "Null"),
            LogicalType::Boolean => write!(f, "Boolean"),
            LogicalType::Int64 => write!(f, "Int64"),
            LogicalType::Float64 => write!(f, "Float64"),
            LogicalType::Utf8 => write!(f, "Utf8"),
            LogicalType::Date => write!(f, "Date"),
            LogicalType::Binary => write!(f, "Binary"),
            LogicalType::Image(encoding) => write!(f, "Image[{}]", encoding.as_str()),
        }
    }
}

/// A named, typed column of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: String,
    logical_type: LogicalType,
}

impl Field {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logical_type(&self) -> LogicalType {
        self.logical_type
    }

    fn to_arrow(&self) -> ArrowField {
        let field = ArrowField::new(&self.name, self.logical_type.arrow_type(), true);
        match self.logical_type {
            LogicalType::Image(encoding) => field.with_metadata(HashMap::from([(
                IMAGE_ENCODING_METADATA_KEY.to_string(),
                encoding.as_str().to_string(),
            )])),
            _ => field,
        }
    }
}

pub type SchemaRef = Arc<Schema>;

/// Ordered sequence of uniquely named columns.
///
/// The matching Arrow schema is built once and shared by every partition
/// created against this schema.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<Field>,
    arrow_schema: ArrowSchemaRef,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Schema {}

impl Schema {
    pub fn try_new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name()) {
                return Err(StrataError::Schema(format!(
                    "duplicate column name '{}'",
                    field.name()
                )));
            }
        }
        let arrow_schema = Arc::new(ArrowSchema::new(
            fields.iter().map(Field::to_arrow).collect::<Vec<_>>(),
        ));
        Ok(Self {
            fields,
            arrow_schema,
        })
    }

    /// Builds a schema from an Arrow schema, inferring the logical types.
    pub fn try_from_arrow(schema: &ArrowSchema) -> Result<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(|f| Ok(Field::new(f.name(), LogicalType::try_from_arrow(f)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::try_new(fields)
    }

    pub fn empty() -> Self {
        Self {
            fields: vec![],
            arrow_schema: Arc::new(ArrowSchema::empty()),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Type of the named column, failing if the column does not exist.
    pub fn column_type(&self, name: &str) -> Result<LogicalType> {
        self.field(name).map(Field::logical_type).ok_or_else(|| {
            StrataError::Schema(format!(
                "column '{name}' not found, available columns: [{}]",
                self.column_names().join(", ")
            ))
        })
    }

    /// Returns a copy of this schema where `field` replaces the column with
    /// the same name, or is appended when no such column exists.
    pub fn with_field(&self, field: Field) -> Result<Self> {
        let mut fields = self.fields.clone();
        match self.index_of(field.name()) {
            Some(idx) => fields[idx] = field,
            None => fields.push(field),
        }
        Self::try_new(fields)
    }

    pub fn arrow_schema(&self) -> &ArrowSchemaRef {
        &self.arrow_schema
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self
            .fields
            .iter()
            .map(|field| format!("{}: {}", field.name(), field.logical_type()))
            .collect::<Vec<_>>();
        write!(f, "[{}]", columns.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order_is_decided_by_tag() {
        for t in [
            LogicalType::Boolean,
            LogicalType::Int64,
            LogicalType::Float64,
            LogicalType::Utf8,
            LogicalType::Date,
        ] {
            assert!(t.supports_total_order(), "{t} should be orderable");
        }
        for t in [
            LogicalType::Null,
            LogicalType::Binary,
            LogicalType::Image(ImageEncoding::Jpeg),
        ] {
            assert!(!t.supports_total_order(), "{t} should not be orderable");
        }
    }

    #[test]
    fn image_type_survives_arrow_conversion() -> Result<()> {
        let schema = Schema::try_new(vec![
            Field::new("id", LogicalType::Int64),
            Field::new("thumbnail", LogicalType::Image(ImageEncoding::Jpeg)),
            Field::new("payload", LogicalType::Binary),
        ])?;
        let round_tripped = Schema::try_from_arrow(schema.arrow_schema())?;
        assert_eq!(schema, round_tripped);
        assert_eq!(
            round_tripped.column_type("thumbnail")?,
            LogicalType::Image(ImageEncoding::Jpeg)
        );
        Ok(())
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        let result = Schema::try_new(vec![
            Field::new("a", LogicalType::Int64),
            Field::new("a", LogicalType::Utf8),
        ]);
        assert!(matches!(result, Err(StrataError::Schema(_))));
    }

    #[test]
    fn unsupported_arrow_type_is_rejected() {
        let field = ArrowField::new("x", DataType::UInt8, true);
        assert!(LogicalType::try_from_arrow(&field).is_err());
    }

    #[test]
    fn with_field_replaces_or_appends() -> Result<()> {
        let schema = Schema::try_new(vec![
            Field::new("a", LogicalType::Int64),
            Field::new("b", LogicalType::Utf8),
        ])?;
        let replaced = schema.with_field(Field::new("a", LogicalType::Float64))?;
        assert_eq!(replaced.column_names(), vec!["a", "b"]);
        assert_eq!(replaced.column_type("a")?, LogicalType::Float64);

        let appended = schema.with_field(Field::new("c", LogicalType::Boolean))?;
        assert_eq!(appended.column_names(), vec!["a", "b", "c"]);
        assert_eq!(schema.to_string(), "[a: Int64, b: Utf8]");
        Ok(())
    }
}
