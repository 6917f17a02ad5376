use std::path::Path;

use anyhow::{Context, Result};

use keyscan_engine::config::{parser, validator};
use keyscan_engine::resolve;
use keyscan_engine::source::PostgresSource;

/// Execute the `check` command: validate job config, source and state connectivity.
pub async fn execute(job_path: &Path) -> Result<()> {
    // 1. Parse job YAML
    let config = parser::parse_job(job_path)
        .with_context(|| format!("Failed to parse job: {}", job_path.display()))?;

    // 2. Validate job structure
    validator::validate_job(&config)?;
    println!("Job structure:     OK");

    // 3. Check source and state
    let source_ok = match PostgresSource::new(&config.source).check().await {
        Ok(()) => {
            println!("Source:            OK");
            true
        }
        Err(e) => {
            println!("Source:            FAILED");
            println!("  {e}");
            false
        }
    };

    let state_config = config.state.clone();
    let state_ok = tokio::task::spawn_blocking(move || resolve::check_state_backend(&state_config))
        .await
        .unwrap_or(false);
    if state_ok {
        println!("State backend:     OK");
    } else {
        println!("State backend:     FAILED");
    }

    if source_ok && state_ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
