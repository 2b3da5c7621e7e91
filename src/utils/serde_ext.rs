//! Serialization helpers shared by the pattern records.

use once_cell::unsync::OnceCell;
use serde::{Serialize, Serializer};

/// Emitted in place of a value that JSON cannot represent.
pub const NOT_SERIALIZABLE: &str = "<not serializable>";

/// Serialize `value`, or the [`NOT_SERIALIZABLE`] placeholder when the value
/// has no JSON representation (non-string map keys, failing `Serialize`
/// impls). Use with `#[serde(serialize_with = "or_placeholder")]`.
pub fn or_placeholder<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match serde_json::to_value(value) {
        Ok(v) => v.serialize(serializer),
        Err(_) => serializer.serialize_str(NOT_SERIALIZABLE),
    }
}

/// Serialize a memo cell as its value, or `null` while unset.
pub fn memo<T, S>(cell: &OnceCell<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    or_placeholder(&cell.get(), serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Record {
        #[serde(serialize_with = "or_placeholder")]
        table: BTreeMap<(u8, u8), u8>,
        #[serde(serialize_with = "memo")]
        cached: OnceCell<i64>,
    }

    #[test]
    fn test_unrepresentable_value_becomes_placeholder() {
        let mut table = BTreeMap::new();
        table.insert((1, 2), 3);
        let record = Record { table, cached: OnceCell::new() };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["table"], NOT_SERIALIZABLE);
        assert!(json["cached"].is_null());
    }

    #[test]
    fn test_memo_serializes_value_once_set() {
        let record = Record { table: BTreeMap::new(), cached: OnceCell::new() };
        record.cached.set(12).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["cached"], 12);
    }
}
