//! Column definitions and basic value converters.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use relmap_proto::{SqlType, Value};

/// A mapped table column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// JDBC type the column is read and bound as.
    pub sql_type: SqlType,
}

impl ColumnDef {
    /// Create a column definition.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// Converts between the relational value stored in a column and the domain
/// value exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueConverter {
    /// `'Y'` / `'N'` stored as a character column.
    YesNoBoolean,
    /// `'T'` / `'F'` stored as a character column.
    TrueFalseBoolean,
    /// `1` / `0` stored as an integer column.
    NumericBoolean,
    /// Enum stored by its ordinal.
    EnumOrdinal { variants: Vec<String> },
    /// Enum stored by its name.
    EnumString { variants: Vec<String> },
}

impl ValueConverter {
    /// Enum converter storing ordinals.
    pub fn enum_ordinal<S: Into<String>>(variants: impl IntoIterator<Item = S>) -> Self {
        ValueConverter::EnumOrdinal {
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Enum converter storing names.
    pub fn enum_string<S: Into<String>>(variants: impl IntoIterator<Item = S>) -> Self {
        ValueConverter::EnumString {
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// The JDBC type of the relational side.
    pub fn relational_type(&self) -> SqlType {
        match self {
            ValueConverter::YesNoBoolean
            | ValueConverter::TrueFalseBoolean
            | ValueConverter::EnumString { .. } => SqlType::Varchar,
            ValueConverter::NumericBoolean | ValueConverter::EnumOrdinal { .. } => SqlType::Integer,
        }
    }

    /// Whether the domain value is a boolean.
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            ValueConverter::YesNoBoolean
                | ValueConverter::TrueFalseBoolean
                | ValueConverter::NumericBoolean
        )
    }

    /// Convert a value read from the database into its domain form.
    pub fn to_domain_value(&self, value: Value) -> Result<Value, Error> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let converted = match self {
            ValueConverter::YesNoBoolean => char_flag(&value, "Y", "N").map(Value::Bool),
            ValueConverter::TrueFalseBoolean => char_flag(&value, "T", "F").map(Value::Bool),
            ValueConverter::NumericBoolean => match value.as_i64() {
                Some(1) => Some(Value::Bool(true)),
                Some(0) => Some(Value::Bool(false)),
                _ => None,
            },
            ValueConverter::EnumOrdinal { variants } => value
                .as_i64()
                .and_then(|ordinal| usize::try_from(ordinal).ok())
                .and_then(|ordinal| variants.get(ordinal))
                .map(|name| Value::String(name.clone())),
            ValueConverter::EnumString { variants } => value
                .as_str()
                .filter(|name| variants.iter().any(|v| v == name))
                .map(|name| Value::String(name.to_string())),
        };
        converted.ok_or_else(|| {
            Error::Decode(format!("{value:?} is not a valid relational value for {self:?}"))
        })
    }

    /// Convert a domain value into the form stored in the database.
    pub fn to_relational_value(&self, value: &Value) -> Result<Value, Error> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let converted = match self {
            ValueConverter::YesNoBoolean => value
                .as_bool()
                .map(|b| Value::String(if b { "Y" } else { "N" }.to_string())),
            ValueConverter::TrueFalseBoolean => value
                .as_bool()
                .map(|b| Value::String(if b { "T" } else { "F" }.to_string())),
            ValueConverter::NumericBoolean => value.as_bool().map(|b| Value::Int32(b as i32)),
            ValueConverter::EnumOrdinal { variants } => value
                .as_str()
                .and_then(|name| variants.iter().position(|v| v == name))
                .map(|ordinal| Value::Int32(ordinal as i32)),
            ValueConverter::EnumString { variants } => value
                .as_str()
                .filter(|name| variants.iter().any(|v| v == name))
                .map(|name| Value::String(name.to_string())),
        };
        converted.ok_or_else(|| {
            Error::Binding(format!("{value:?} is not a valid domain value for {self:?}"))
        })
    }
}

fn char_flag(value: &Value, yes: &str, no: &str) -> Option<bool> {
    let s = value.as_str()?.trim();
    if s.eq_ignore_ascii_case(yes) {
        Some(true)
    } else if s.eq_ignore_ascii_case(no) {
        Some(false)
    } else {
        None
    }
}
