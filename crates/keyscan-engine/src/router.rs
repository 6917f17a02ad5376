//! Namespace scope filtering.

use keyscan_types::Namespace;

use crate::config::types::FilterConfig;
use crate::errors::{Result, ScanError};

/// Decides which namespaces a run scans.
///
/// Consulted once per namespace at start; rejected namespaces are never
/// queried and never get a position.
pub trait Router: Send + Sync {
    fn exists(&self, namespace: &Namespace) -> bool;
}

impl<F> Router for F
where
    F: Fn(&Namespace) -> bool + Send + Sync,
{
    fn exists(&self, namespace: &Namespace) -> bool {
        self(namespace)
    }
}

/// One `database.collection` pattern. `*` matches any segment and a bare
/// `*` matches every namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePattern {
    database: Option<String>,
    collection: Option<String>,
}

fn segment(part: &str) -> Option<String> {
    (part != "*").then(|| part.to_string())
}

impl NamespacePattern {
    /// Parse `db.collection`, `db.*`, `*.collection` or `*`.
    ///
    /// # Errors
    ///
    /// Returns a message describing why the pattern is malformed.
    pub fn parse(pattern: &str) -> std::result::Result<Self, String> {
        let trimmed = pattern.trim();
        if trimmed == "*" {
            return Ok(Self {
                database: None,
                collection: None,
            });
        }
        let Some((database, collection)) = trimmed.split_once('.') else {
            return Err(format!(
                "invalid namespace pattern '{pattern}': expected 'database.collection'"
            ));
        };
        if database.is_empty() || collection.is_empty() {
            return Err(format!(
                "invalid namespace pattern '{pattern}': empty segment"
            ));
        }
        for part in [database, collection] {
            if part != "*" && part.contains('*') {
                return Err(format!(
                    "invalid namespace pattern '{pattern}': '*' must be a whole segment"
                ));
            }
        }
        Ok(Self {
            database: segment(database),
            collection: segment(collection),
        })
    }

    #[must_use]
    pub fn matches(&self, namespace: &Namespace) -> bool {
        self.database
            .as_deref()
            .map_or(true, |db| db == namespace.database)
            && self
                .collection
                .as_deref()
                .map_or(true, |c| c == namespace.collection)
    }
}

/// Include/exclude router. Exclusion wins; an empty include list accepts
/// everything not excluded.
#[derive(Debug, Clone, Default)]
pub struct NamespaceFilter {
    include: Vec<NamespacePattern>,
    exclude: Vec<NamespacePattern>,
}

impl NamespaceFilter {
    /// Build a filter from configured patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] for the first malformed pattern.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let parse = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| NamespacePattern::parse(p))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(ScanError::Config)
        };
        Ok(Self {
            include: parse(&config.include)?,
            exclude: parse(&config.exclude)?,
        })
    }
}

impl Router for NamespaceFilter {
    fn exists(&self, namespace: &Namespace) -> bool {
        if self.exclude.iter().any(|p| p.matches(namespace)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(namespace))
    }
}
