//! Semantic validation for parsed job configuration values.

use anyhow::{bail, Result};

use crate::config::types::JobConfig;
use crate::router::NamespacePattern;

fn validate_patterns(patterns: &[String], context: &str, errors: &mut Vec<String>) {
    for pattern in patterns {
        if let Err(e) = NamespacePattern::parse(pattern) {
            errors.push(format!("{context}: {e}"));
        }
    }
}

/// Validate a parsed job configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the job config.
pub fn validate_job(config: &JobConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported job version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.job.trim().is_empty() {
        errors.push("Job name must not be empty".to_string());
    }

    if config.source.host.trim().is_empty() {
        errors.push("Source host must not be empty".to_string());
    }
    if config.source.database.trim().is_empty() {
        errors.push("Source database must not be empty".to_string());
    }
    if config.source.key_field.trim().is_empty() {
        errors.push("Source key_field must not be empty".to_string());
    }
    for (i, schema) in config.source.schemas.iter().enumerate() {
        if schema.trim().is_empty() {
            errors.push(format!("Source schema {i} is empty"));
        }
    }

    errors.extend(config.scan.violations());

    validate_patterns(&config.filter.include, "filter.include", &mut errors);
    validate_patterns(&config.filter.exclude, "filter.exclude", &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Job validation failed:\n  - {}", errors.join("\n  - "));
    }
}
