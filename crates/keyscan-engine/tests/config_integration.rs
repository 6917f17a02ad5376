//! Integration tests for job parsing, validation and state backend setup.

use std::path::PathBuf;

use keyscan_engine::config::parser;
use keyscan_engine::config::types::StateBackendKind;
use keyscan_engine::config::validator;
use keyscan_engine::{NamespaceFilter, Router};
use keyscan_types::Namespace;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Test parsing and validating a well-formed job fixture.
#[test]
fn test_parse_and_validate_fixture_job() {
    std::env::set_var("TEST_KEYSCAN_PG_HOST", "db.internal");

    let config = parser::parse_job(&fixture("users_backfill.yaml"))
        .expect("Failed to parse fixture job");

    assert_eq!(config.job, "users_backfill");
    assert_eq!(config.source.host, "db.internal");
    assert_eq!(config.source.schemas, vec!["public"]);
    assert_eq!(config.scan.worker_cnt, 4);
    assert_eq!(config.scan.batch_per_second_limit, 100);
    assert_eq!(config.state.backend, StateBackendKind::Sqlite);

    validator::validate_job(&config).expect("Validation should pass");

    let filter = NamespaceFilter::from_config(&config.filter).unwrap();
    assert!(filter.exists(&Namespace::new("public", "users")));
    assert!(!filter.exists(&Namespace::new("public", "audit_log")));
    assert!(!filter.exists(&Namespace::new("billing", "invoices")));

    std::env::remove_var("TEST_KEYSCAN_PG_HOST");
}

/// Test that an invalid job fixture fails at parse time.
#[test]
fn test_parse_invalid_fixture() {
    let err = parser::parse_job(&fixture("invalid_job.yaml"))
        .unwrap_err()
        .to_string();
    assert!(
        err.contains("unknown variant") || err.contains("Failed to parse job YAML"),
        "Expected serde enum parse error, got: {err}"
    );
}
