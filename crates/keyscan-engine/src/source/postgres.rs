//! `PostgreSQL` source over `tokio-postgres`.
//!
//! Each session owns its own connection. Rows are fetched as
//! `to_jsonb(t)` documents ordered by the key column; text keys are
//! compared under the `"C"` collation so the store's order matches
//! [`Key`]'s bytewise order.

use std::fmt::Write as _;
use std::ops::Bound;

use keyscan_types::{Key, KeyRange, KeyType, Namespace, Record};
use pg_escape::quote_identifier;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls};

use super::{Source, SourceSession};
use crate::config::types::SourceConfig;
use crate::errors::{Result, ScanError};

const LIST_TABLES_SQL: &str = "\
    SELECT table_schema, table_name \
    FROM information_schema.tables \
    WHERE table_type = 'BASE TABLE' \
      AND table_schema NOT IN ('pg_catalog', 'information_schema') \
      AND (cardinality($1::text[]) = 0 OR table_schema = ANY($1::text[])) \
    ORDER BY table_schema, table_name";

const KEY_TYPE_SQL: &str = "\
    SELECT data_type \
    FROM information_schema.columns \
    WHERE table_schema = $1 AND table_name = $2 AND column_name = $3";

/// Source reading tables of one `PostgreSQL` database.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    pg: PgConfig,
    schemas: Vec<String>,
    key_field: String,
}

impl PostgresSource {
    #[must_use]
    pub fn new(config: &SourceConfig) -> Self {
        let mut pg = PgConfig::new();
        pg.host(&config.host);
        pg.port(config.port);
        pg.user(&config.user);
        if !config.password.is_empty() {
            pg.password(&config.password);
        }
        pg.dbname(&config.database);
        Self {
            pg,
            schemas: config.schemas.clone(),
            key_field: config.key_field.clone(),
        }
    }

    /// Build from a libpq connection string or `postgres://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if the connection string is malformed.
    pub fn from_connection_string(connstr: &str, key_field: impl Into<String>) -> Result<Self> {
        let pg = connstr
            .parse::<PgConfig>()
            .map_err(|e| ScanError::Config(format!("invalid connection string: {e}")))?;
        Ok(Self {
            pg,
            schemas: Vec::new(),
            key_field: key_field.into(),
        })
    }

    /// Restrict discovery to `schemas`.
    #[must_use]
    pub fn with_schemas(mut self, schemas: Vec<String>) -> Self {
        self.schemas = schemas;
        self
    }

    /// Verify connectivity with a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Connection`] when the database is unreachable.
    pub async fn check(&self) -> Result<()> {
        let client = connect(&self.pg).await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| ScanError::Connection(format!("connection test failed: {e}")))?;
        Ok(())
    }
}

async fn connect(pg: &PgConfig) -> Result<Client> {
    let (client, connection) = pg
        .connect(NoTls)
        .await
        .map_err(|e| ScanError::Connection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "PostgreSQL connection error");
        }
    });

    Ok(client)
}

fn key_type_for(data_type: &str) -> Option<KeyType> {
    match data_type {
        "smallint" | "integer" | "bigint" => Some(KeyType::Int64),
        "text" | "character varying" | "character" => Some(KeyType::Utf8),
        _ => None,
    }
}

impl Source for PostgresSource {
    type Session = PostgresSession;

    fn key_field(&self) -> &str {
        &self.key_field
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let client = connect(&self.pg).await?;
        let rows = client
            .query(LIST_TABLES_SQL, &[&self.schemas])
            .await
            .map_err(|e| ScanError::Connection(format!("table discovery failed: {e}")))?;
        Ok(rows
            .iter()
            .map(|row| Namespace::new(row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect())
    }

    async fn open_session(&self, namespace: &Namespace) -> Result<PostgresSession> {
        let client = connect(&self.pg).await?;
        let row = client
            .query_opt(
                KEY_TYPE_SQL,
                &[&namespace.database, &namespace.collection, &self.key_field],
            )
            .await
            .map_err(|e| ScanError::query(namespace, format!("key type lookup failed: {e}")))?;
        let Some(row) = row else {
            return Err(ScanError::Config(format!(
                "key field '{}' not found in {namespace}",
                self.key_field
            )));
        };
        let data_type: String = row.get(0);
        let key_type = key_type_for(&data_type).ok_or_else(|| {
            ScanError::Config(format!(
                "key field '{}' of {namespace} has unsupported type '{data_type}'",
                self.key_field
            ))
        })?;

        tracing::debug!(
            namespace = %namespace,
            key_field = self.key_field,
            key_type = ?key_type,
            "Opened source session"
        );

        Ok(PostgresSession {
            client,
            namespace: namespace.clone(),
            table: format!(
                "{}.{}",
                quote_identifier(&namespace.database),
                quote_identifier(&namespace.collection)
            ),
            key_column: quote_identifier(&self.key_field).to_string(),
            key_type,
        })
    }
}

/// One connection bound to one table.
pub struct PostgresSession {
    client: Client,
    namespace: Namespace,
    table: String,
    key_column: String,
    key_type: KeyType,
}

impl PostgresSession {
    fn query_error(&self, e: &tokio_postgres::Error) -> ScanError {
        if e.is_closed() {
            ScanError::Connection(format!("{}: {e}", self.namespace))
        } else {
            ScanError::query(&self.namespace, e)
        }
    }

    fn decode_key(&self, row: &tokio_postgres::Row) -> Result<Key> {
        let key = match self.key_type {
            KeyType::Int64 => row.try_get::<_, i64>(0).map(Key::Int64),
            KeyType::Utf8 => row.try_get::<_, String>(0).map(Key::Utf8),
        };
        key.map_err(|e| ScanError::query(&self.namespace, format!("null or invalid key: {e}")))
    }
}

impl SourceSession for PostgresSession {
    async fn key_bounds(&mut self) -> Result<Option<(Key, Key)>> {
        let sql = key_bounds_sql(&self.table, &self.key_column, self.key_type);
        let row = self
            .client
            .query_one(&sql, &[])
            .await
            .map_err(|e| self.query_error(&e))?;
        let bounds = match self.key_type {
            KeyType::Int64 => row
                .get::<_, Option<i64>>(0)
                .zip(row.get::<_, Option<i64>>(1))
                .map(|(lo, hi)| (Key::Int64(lo), Key::Int64(hi))),
            KeyType::Utf8 => row
                .get::<_, Option<String>>(0)
                .zip(row.get::<_, Option<String>>(1))
                .map(|(lo, hi)| (Key::Utf8(lo), Key::Utf8(hi))),
        };
        Ok(bounds)
    }

    async fn fetch_range(&mut self, range: &KeyRange, limit: Option<usize>) -> Result<Vec<Record>> {
        let query = build_range_query(&self.table, &self.key_column, self.key_type, range, limit)
            .map_err(|e| ScanError::query(&self.namespace, e))?;
        let params: Vec<&(dyn ToSql + Sync)> =
            query.params.iter().map(KeyBindParam::as_tosql).collect();

        let rows = self
            .client
            .query(&query.sql, &params)
            .await
            .map_err(|e| self.query_error(&e))?;

        rows.iter()
            .map(|row| {
                let key = self.decode_key(row)?;
                match row.get::<_, serde_json::Value>(1) {
                    serde_json::Value::Object(fields) => Ok(Record::new(key, fields)),
                    other => Err(ScanError::query(
                        &self.namespace,
                        format!("expected a row document, got {other}"),
                    )),
                }
            })
            .collect()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum KeyBindParam {
    Int64(i64),
    Text(String),
}

impl KeyBindParam {
    pub(crate) fn as_tosql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Int64(v) => v,
            Self::Text(v) => v,
        }
    }

    fn from_key(key: &Key, key_type: KeyType) -> std::result::Result<Self, String> {
        match (key, key_type) {
            (Key::Int64(v), KeyType::Int64) => Ok(Self::Int64(*v)),
            (Key::Utf8(v), KeyType::Utf8) => Ok(Self::Text(v.clone())),
            (key, expected) => Err(format!(
                "key {key} does not match column type {expected:?}"
            )),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RangeQuery {
    pub(crate) sql: String,
    pub(crate) params: Vec<KeyBindParam>,
}

fn key_expr(key_column: &str, key_type: KeyType) -> (String, &'static str) {
    match key_type {
        KeyType::Int64 => (key_column.to_string(), "bigint"),
        KeyType::Utf8 => (format!("{key_column} COLLATE \"C\""), "text"),
    }
}

pub(crate) fn key_bounds_sql(table: &str, key_column: &str, key_type: KeyType) -> String {
    let (expr, cast) = key_expr(key_column, key_type);
    format!("SELECT MIN({expr})::{cast}, MAX({expr})::{cast} FROM {table}")
}

/// Keyset query for `range`, ascending by key.
pub(crate) fn build_range_query(
    table: &str,
    key_column: &str,
    key_type: KeyType,
    range: &KeyRange,
    limit: Option<usize>,
) -> std::result::Result<RangeQuery, String> {
    let (expr, cast) = key_expr(key_column, key_type);
    let mut params = Vec::new();
    let mut predicates = Vec::new();

    for (bound, inclusive, exclusive) in [(&range.lower, ">=", ">"), (&range.upper, "<=", "<")] {
        let (op, key) = match bound {
            Bound::Included(key) => (inclusive, key),
            Bound::Excluded(key) => (exclusive, key),
            Bound::Unbounded => continue,
        };
        params.push(KeyBindParam::from_key(key, key_type)?);
        predicates.push(format!("{expr} {op} ${}::{cast}", params.len()));
    }

    let mut sql = format!("SELECT {key_column}::{cast}, to_jsonb(t) FROM {table} t");
    if !predicates.is_empty() {
        let _ = write!(sql, " WHERE {}", predicates.join(" AND "));
    }
    let _ = write!(sql, " ORDER BY {expr}");
    if let Some(limit) = limit {
        let _ = write!(sql, " LIMIT {limit}");
    }
    Ok(RangeQuery { sql, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_range_has_no_predicate() {
        let q = build_range_query("\"public\".\"users\"", "id", KeyType::Int64, &KeyRange::full(), Some(11))
            .unwrap();
        assert_eq!(
            q.sql,
            "SELECT id::bigint, to_jsonb(t) FROM \"public\".\"users\" t ORDER BY id LIMIT 11"
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn bounded_int_range_binds_both_ends() {
        let range = KeyRange {
            lower: Bound::Excluded(Key::Int64(10)),
            upper: Bound::Included(Key::Int64(20)),
        };
        let q = build_range_query("t1", "id", KeyType::Int64, &range, None).unwrap();
        assert_eq!(
            q.sql,
            "SELECT id::bigint, to_jsonb(t) FROM t1 t WHERE id > $1::bigint AND id <= $2::bigint ORDER BY id"
        );
        assert_eq!(q.params, vec![KeyBindParam::Int64(10), KeyBindParam::Int64(20)]);
    }

    #[test]
    fn text_keys_use_c_collation() {
        let range = KeyRange {
            lower: Bound::Included(Key::from("m")),
            upper: Bound::Unbounded,
        };
        let q = build_range_query("t1", "\"Code\"", KeyType::Utf8, &range, Some(3)).unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"Code\"::text, to_jsonb(t) FROM t1 t WHERE \"Code\" COLLATE \"C\" >= $1::text \
             ORDER BY \"Code\" COLLATE \"C\" LIMIT 3"
        );
        assert_eq!(q.params, vec![KeyBindParam::Text("m".into())]);
    }

    #[test]
    fn mismatched_key_type_rejected() {
        let range = KeyRange::after(Key::from("abc"));
        assert!(build_range_query("t1", "id", KeyType::Int64, &range, None).is_err());
    }

    #[test]
    fn key_bounds_sql_casts() {
        assert_eq!(
            key_bounds_sql("t1", "id", KeyType::Int64),
            "SELECT MIN(id)::bigint, MAX(id)::bigint FROM t1"
        );
    }

    #[test]
    fn key_type_mapping() {
        assert_eq!(key_type_for("integer"), Some(KeyType::Int64));
        assert_eq!(key_type_for("character varying"), Some(KeyType::Utf8));
        assert_eq!(key_type_for("uuid"), None);
    }

    fn test_source() -> PostgresSource {
        let url = std::env::var("TEST_POSTGRES_URL")
            .expect("TEST_POSTGRES_URL must be set for Postgres source tests");
        PostgresSource::from_connection_string(&url, "id").unwrap()
    }

    #[tokio::test]
    #[ignore = "requires TEST_POSTGRES_URL"]
    async fn scans_a_real_table() {
        let source = test_source();
        let client = connect(&source.pg).await.unwrap();
        client
            .batch_execute(
                "CREATE SCHEMA IF NOT EXISTS keyscan_test;
                 DROP TABLE IF EXISTS keyscan_test.items;
                 CREATE TABLE keyscan_test.items (id bigint, name text);
                 INSERT INTO keyscan_test.items VALUES (3, 'c'), (1, 'a'), (2, 'b'), (2, 'b2');",
            )
            .await
            .unwrap();

        let source = source.with_schemas(vec!["keyscan_test".into()]);
        let ns = Namespace::new("keyscan_test", "items");
        assert_eq!(source.list_namespaces().await.unwrap(), vec![ns.clone()]);

        let mut session = source.open_session(&ns).await.unwrap();
        assert_eq!(
            session.key_bounds().await.unwrap(),
            Some((Key::Int64(1), Key::Int64(3)))
        );
        let records = session
            .fetch_range(&KeyRange::after(Key::Int64(1)), Some(10))
            .await
            .unwrap();
        let keys: Vec<_> = records.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![Key::Int64(2), Key::Int64(2), Key::Int64(3)]);
        assert_eq!(records[2].fields["name"], "c");
    }
}
