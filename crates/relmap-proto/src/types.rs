//! JDBC-level column types.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

/// The type a column value is read as or bound with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub enum SqlType {
    /// Boolean value.
    Boolean,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    BigInt,
    /// 32-bit floating point.
    Real,
    /// 64-bit floating point.
    Double,
    /// Variable-length character data.
    Varchar,
    /// Variable-length binary data.
    VarBinary,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// UUID (128-bit identifier).
    Uuid,
}

impl SqlType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlType::Integer | SqlType::BigInt | SqlType::Real | SqlType::Double
        )
    }

    /// Check if this type is a floating point type.
    pub fn is_floating(&self) -> bool {
        matches!(self, SqlType::Real | SqlType::Double)
    }

    /// Result type of `sum` over a column of this type.
    pub fn sum_type(&self) -> SqlType {
        if self.is_floating() {
            SqlType::Double
        } else {
            SqlType::BigInt
        }
    }

    /// Result type of arithmetic between two operands.
    pub fn widen(self, other: SqlType) -> SqlType {
        match (self, other) {
            (SqlType::Double, _) | (_, SqlType::Double) => SqlType::Double,
            (SqlType::Real, _) | (_, SqlType::Real) => SqlType::Double,
            (SqlType::BigInt, _) | (_, SqlType::BigInt) => SqlType::BigInt,
            (a, _) => a,
        }
    }

    /// Type name used when logging and in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            SqlType::Boolean => "boolean",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Real => "real",
            SqlType::Double => "double",
            SqlType::Varchar => "varchar",
            SqlType::VarBinary => "varbinary",
            SqlType::Timestamp => "timestamp",
            SqlType::Uuid => "uuid",
        }
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_classification() {
        assert!(SqlType::Integer.is_numeric());
        assert!(SqlType::Double.is_floating());
        assert!(!SqlType::Varchar.is_numeric());
    }

    #[test]
    fn test_widening() {
        assert_eq!(SqlType::Integer.widen(SqlType::BigInt), SqlType::BigInt);
        assert_eq!(SqlType::Integer.widen(SqlType::Real), SqlType::Double);
        assert_eq!(SqlType::Integer.widen(SqlType::Integer), SqlType::Integer);
        assert_eq!(SqlType::Integer.sum_type(), SqlType::BigInt);
        assert_eq!(SqlType::Real.sum_type(), SqlType::Double);
    }
}
