//! Tabular data model consumed by the mapping engine.
//!
//! A [`VoTable`] holds [`Resource`]s; a resource holds [`Table`]s made of
//! [`Field`] definitions and rows of [`Value`]s, plus the raw text of the
//! MIVOT annotation block attached to it, if any.

use std::fmt;

use crate::vocabulary::{ANONYMOUS_TABLE, NOT_SET};

/// A single table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text written into an annotation `value` attribute for this cell.
    ///
    /// Null cells become [`NOT_SET`].
    pub fn annotation_text(&self) -> String {
        match self {
            Value::Null => NOT_SET.to_string(),
            other => other.to_string(),
        }
    }

    /// Key equality between two cells. Integers compare exactly, a float
    /// against an integer or a float compares as `f64`, everything else
    /// compares by text. Null never matches.
    pub fn same_key(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Int(left), Value::Int(right)) => left == right,
            (Value::Int(int), Value::Float(float)) | (Value::Float(float), Value::Int(int)) => {
                *int as f64 == *float
            }
            (Value::Float(left), Value::Float(right)) => left == right,
            _ => self.to_string() == other.to_string(),
        }
    }

    /// Key equality between a cell and a literal taken from the annotation.
    ///
    /// Integer cells match integer literals exactly and fall back to `f64`
    /// for literals such as `42.0`.
    pub fn matches_literal(&self, literal: &str) -> bool {
        let literal = literal.trim();
        match self {
            Value::Null => false,
            Value::Int(value) => match literal.parse::<i64>() {
                Ok(parsed) => parsed == *value,
                Err(_) => literal
                    .parse::<f64>()
                    .is_ok_and(|parsed| parsed == *value as f64),
            },
            Value::Float(value) => literal.parse::<f64>().is_ok_and(|parsed| parsed == *value),
            Value::Text(text) => text.trim() == literal,
            Value::Bool(_) => self.to_string() == literal,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    id: Option<String>,
    name: Option<String>,
    reference: Option<String>,
    unit: Option<String>,
    datatype: Option<String>,
    arraysize: Option<String>,
    ucd: Option<String>,
}

impl Field {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_ref(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatype = Some(datatype.into());
        self
    }

    pub fn with_arraysize(mut self, arraysize: impl Into<String>) -> Self {
        self.arraysize = Some(arraysize.into());
        self
    }

    pub fn with_ucd(mut self, ucd: impl Into<String>) -> Self {
        self.ucd = Some(ucd.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn datatype(&self) -> Option<&str> {
        self.datatype.as_deref()
    }

    pub fn arraysize(&self) -> Option<&str> {
        self.arraysize.as_deref()
    }

    pub fn ucd(&self) -> Option<&str> {
        self.ucd.as_deref()
    }

    /// The identifier annotation `ref`s use to designate this column:
    /// `ID`, else `name`, else the field's own `ref`.
    pub fn identifier(&self) -> Option<&str> {
        self.id()
            .or_else(|| self.name())
            .or_else(|| self.reference())
    }
}

/// A physical table: field definitions and row data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    id: Option<String>,
    name: Option<String>,
    fields: Vec<Field>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// `ID`, else `name`, else [`ANONYMOUS_TABLE`].
    pub fn identifier(&self) -> &str {
        self.id()
            .or_else(|| self.name())
            .unwrap_or(ANONYMOUS_TABLE)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A VOTable RESOURCE.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    id: Option<String>,
    name: Option<String>,
    kind: Option<String>,
    tables: Vec<Table>,
    resources: Vec<Resource>,
    annotation: Option<String>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the RESOURCE `type` (`results`, `meta`, ...).
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Attach the raw XML text of a MIVOT annotation block.
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// The annotation block of this resource: its own, else the first one
    /// found in its nested resources (the `type="meta"` convention).
    pub fn annotation_block(&self) -> Option<&str> {
        self.annotation.as_deref().or_else(|| {
            self.resources
                .iter()
                .find_map(|resource| resource.annotation_block())
        })
    }
}

/// A parsed VOTable document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoTable {
    resources: Vec<Resource>,
}

impl VoTable {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, index: usize) -> Option<&Resource> {
        self.resources.get(index)
    }
}
