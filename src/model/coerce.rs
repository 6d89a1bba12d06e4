//! Lenient coercion of a JSON observation into a typed single-row value.
//!
//! Absent, `null`, and uncastable fields all become [`Cell::Missing`]; fields
//! outside the configured column set are dropped. Nothing here returns an
//! error, so a malformed observation degrades the score instead of failing.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::{PsError, Result};

/// Scalar type a column is cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Float,
    Int,
    Str,
    Bool,
}

impl ColumnType {
    /// Accepts both short tags and the dtype names training tools emit.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "float" | "float64" | "float32" | "double" => Some(Self::Float),
            "int" | "int64" | "int32" | "integer" => Some(Self::Int),
            "str" | "string" | "object" | "category" => Some(Self::Str),
            "bool" | "boolean" => Some(Self::Bool),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Str => "str",
            Self::Bool => "bool",
        }
    }

    /// Cast one JSON value, returning [`Cell::Missing`] when the cast fails.
    #[must_use]
    pub fn cast(self, value: &Value) -> Cell {
        let cell = match (self, value) {
            (_, Value::Null | Value::Array(_) | Value::Object(_)) => None,

            (Self::Float, Value::Number(n)) => n.as_f64().map(Cell::Float),
            (Self::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Cell::Float),
            (Self::Float, Value::Bool(b)) => Some(Cell::Float(if *b { 1.0 } else { 0.0 })),

            (Self::Int, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(truncate))
                .map(Cell::Int),
            (Self::Int, Value::String(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(truncate))
                    .map(Cell::Int)
            }
            (Self::Int, Value::Bool(b)) => Some(Cell::Int(i64::from(*b))),

            (Self::Str, Value::String(s)) => Some(Cell::Str(s.clone())),
            (Self::Str, Value::Number(n)) => Some(Cell::Str(n.to_string())),
            (Self::Str, Value::Bool(b)) => Some(Cell::Str(b.to_string())),

            (Self::Bool, Value::Bool(b)) => Some(Cell::Bool(*b)),
            (Self::Bool, Value::Number(n)) => match n.as_f64() {
                Some(v) if v == 0.0 => Some(Cell::Bool(false)),
                Some(v) if (v - 1.0).abs() < f64::EPSILON => Some(Cell::Bool(true)),
                _ => None,
            },
            (Self::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(Cell::Bool(true)),
                "false" | "0" | "no" => Some(Cell::Bool(false)),
                _ => None,
            },
        };
        match cell {
            Some(Cell::Float(v)) if !v.is_finite() => Cell::Missing,
            Some(cell) => cell,
            None => Cell::Missing,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn truncate(v: f64) -> Option<i64> {
    let t = v.trunc();
    (t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64).then_some(t as i64)
}

impl TryFrom<String> for ColumnType {
    type Error = String;

    fn try_from(tag: String) -> std::result::Result<Self, Self::Error> {
        Self::from_tag(&tag).ok_or_else(|| format!("unknown column type {tag:?}"))
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One coerced value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Missing,
    Float(f64),
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Cell {
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Numeric view used by numeric pipeline steps.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Str(_) | Self::Missing => None,
        }
    }

    /// Category label used by one-hot pipeline steps.
    #[must_use]
    pub fn as_category(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Bool(v) => Some(v.to_string()),
            Self::Missing => None,
        }
    }
}

/// Ordered, typed column set the model was trained on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<(String, ColumnType)>,
}

impl Schema {
    /// Pair the ordered column list with the dtype map.
    ///
    /// Every column needs a dtype; dtypes for unlisted columns are ignored.
    pub fn new(columns: Vec<String>, dtypes: &HashMap<String, ColumnType>) -> Result<Self> {
        if columns.is_empty() {
            return Err(PsError::SchemaMismatch {
                details: "column list is empty".to_string(),
            });
        }
        let mut typed: Vec<(String, ColumnType)> = Vec::with_capacity(columns.len());
        for column in columns {
            if typed.iter().any(|(name, _)| name == &column) {
                return Err(PsError::SchemaMismatch {
                    details: format!("column {column:?} is listed twice"),
                });
            }
            let Some(dtype) = dtypes.get(&column) else {
                return Err(PsError::SchemaMismatch {
                    details: format!("column {column:?} has no dtype"),
                });
            };
            typed.push((column, *dtype));
        }
        Ok(Self { columns: typed })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|(name, _)| name == column)
    }

    #[must_use]
    pub fn column_type(&self, index: usize) -> Option<ColumnType> {
        self.columns.get(index).map(|(_, dtype)| *dtype)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Build the single-row value for one observation.
    #[must_use]
    pub fn coerce(&self, observation: &Value) -> ObservationRow {
        let empty = Map::new();
        let fields = observation.as_object().unwrap_or(&empty);
        let cells = self
            .columns
            .iter()
            .map(|(name, dtype)| fields.get(name).map_or(Cell::Missing, |v| dtype.cast(v)))
            .collect();
        ObservationRow {
            columns: self.columns.iter().map(|(name, _)| name.clone()).collect(),
            cells,
        }
    }
}

/// A coerced observation: exactly one cell per schema column, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    columns: Vec<String>,
    cells: Vec<Cell>,
}

impl ObservationRow {
    #[must_use]
    pub fn cell(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&Cell::Missing)
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|index| &self.cells[index])
    }

    #[must_use]
    pub fn missing_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .zip(&self.cells)
            .filter(|(_, cell)| cell.is_missing())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl Serialize for ObservationRow {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, cell) in self.columns.iter().zip(&self.cells) {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}
