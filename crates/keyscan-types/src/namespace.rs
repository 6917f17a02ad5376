//! Namespace identity: the unit of scope filtering and position tracking.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A `(database, collection)` pair.
///
/// For relational sources the database is the schema name and the
/// collection is the table name. Serialized as `{"database", "table"}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    #[serde(rename = "table")]
    pub collection: String,
}

impl Namespace {
    /// Create a new namespace.
    #[must_use]
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}
