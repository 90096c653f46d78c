//! Raw row sets stored in query result cache regions.

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::Error;
use crate::value::Value;

/// Rows exactly as read from the result set, before decoding or transformation.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CachedRows {
    /// Timestamp the rows were cached at, compared against table update timestamps.
    pub timestamp: u64,
    /// One entry per row, one value per selected column.
    pub rows: Vec<Vec<Value>>,
}

impl CachedRows {
    /// Wrap `rows` cached at `timestamp`.
    pub fn new(timestamp: u64, rows: Vec<Vec<Value>>) -> Self {
        Self { timestamp, rows }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes; the input need not be aligned.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_rows_bytes() {
        let rows = CachedRows::new(
            7,
            vec![
                vec![Value::Int64(1), Value::String("Alice".into()), Value::Null],
                vec![Value::Int64(2), Value::String("Bob".into()), Value::Bool(true)],
            ],
        );
        let bytes = rows.to_bytes().unwrap();
        assert_eq!(CachedRows::from_bytes(&bytes).unwrap(), rows);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            CachedRows::from_bytes(&[1, 2, 3]),
            Err(Error::Deserialization(_))
        ));
    }
}
