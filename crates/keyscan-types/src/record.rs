//! Source rows and the operation tag carried on emitted batches.

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// Change operation tag. A backfill only ever produces reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
}

/// One source row: its ordering key plus the full field mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: Key,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    #[must_use]
    pub fn new(key: Key, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { key, fields }
    }

    /// A record whose only field is the key itself under `key_field`.
    #[must_use]
    pub fn from_key(key_field: &str, key: Key) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert(key_field.to_string(), key.to_json());
        Self { key, fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_key_populates_key_field() {
        let record = Record::from_key("_id", Key::Int64(409_587_622_938_192_896));
        assert_eq!(
            record.fields.get("_id"),
            Some(&serde_json::json!(409_587_622_938_192_896_i64))
        );
    }

    #[test]
    fn operation_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Operation::Read).unwrap(), "\"read\"");
    }
}
