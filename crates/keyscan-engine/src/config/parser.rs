//! Job YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::JobConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let substituted = ENV_VAR_RE.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            missing.push(caps[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(substituted.into_owned())
}

/// Parse a job YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_job_str(yaml_str: &str) -> Result<JobConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: JobConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse job YAML")?;
    Ok(config)
}

/// Parse a job YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_job(path: &Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file: {}", path.display()))?;
    parse_job_str(&content)
}
