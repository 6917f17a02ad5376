//! Ordered key values and key ranges.
//!
//! Every scanned collection is walked in ascending [`Key`] order. Ranges
//! use [`std::ops::Bound`] so that resumption points (exclusive) and
//! partition starts (inclusive) share one representation.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

/// Data type of a namespace's key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// 64-bit signed integer key.
    Int64,
    /// UTF-8 string key, compared bytewise.
    Utf8,
}

/// A typed key value.
///
/// Serialized as `{"type": "int64", "value": 42}`. Keys of one namespace
/// always share a single [`KeyType`]; the derived ordering across types
/// only exists to make `Key` totally ordered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Key {
    Int64(i64),
    Utf8(String),
}

impl Key {
    /// The type of this key.
    #[must_use]
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Int64(_) => KeyType::Int64,
            Self::Utf8(_) => KeyType::Utf8,
        }
    }

    /// The integer value, if this is an integer key.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            Self::Utf8(_) => None,
        }
    }

    /// The key as a plain JSON value (`42` or `"abc"`).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int64(v) => serde_json::Value::from(*v),
            Self::Utf8(v) => serde_json::Value::from(v.as_str()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

/// A key range with independent lower and upper bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<Key>,
    pub upper: Bound<Key>,
}

impl KeyRange {
    /// The whole key domain.
    #[must_use]
    pub fn full() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Every key strictly greater than `key`.
    #[must_use]
    pub fn after(key: Key) -> Self {
        Self {
            lower: Bound::Excluded(key),
            upper: Bound::Unbounded,
        }
    }

    /// Exactly one key value.
    #[must_use]
    pub fn point(key: Key) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Whether `key` falls inside this range.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        let above_lower = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below_upper = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above_lower && below_upper
    }

    /// Whether no key can satisfy both bounds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l) | Bound::Excluded(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u)) => l.cmp(u) != Ordering::Less,
            _ => false,
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Included(k) => write!(f, "[{k}")?,
            Bound::Excluded(k) => write!(f, "({k}")?,
            Bound::Unbounded => f.write_str("(-inf")?,
        }
        f.write_str(", ")?;
        match &self.upper {
            Bound::Included(k) => write!(f, "{k}]"),
            Bound::Excluded(k) => write!(f, "{k})"),
            Bound::Unbounded => f.write_str("+inf)"),
        }
    }
}
