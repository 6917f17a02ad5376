use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use keyscan_engine::config::{parser, validator};
use keyscan_engine::source::PostgresSource;
use keyscan_engine::{resolve, NamespaceFilter, Orchestrator, PositionCache, ScanError, ScanSummary};

use crate::output::JsonLinesEmitter;

/// Execute the `run` command: parse, validate, and run a backfill job.
pub async fn execute(job_path: &Path) -> Result<()> {
    // 1. Parse job YAML
    let config = parser::parse_job(job_path)
        .with_context(|| format!("Failed to parse job: {}", job_path.display()))?;

    // 2. Validate
    validator::validate_job(&config)?;
    let router = NamespaceFilter::from_config(&config.filter)?;

    tracing::info!(
        job = config.job,
        database = config.source.database,
        key_field = config.source.key_field,
        workers = config.scan.worker_cnt,
        "Job validated"
    );

    // 3. Open state on the blocking pool
    let state_config = config.state.clone();
    let backend = tokio::task::spawn_blocking(move || resolve::create_state_backend(&state_config))
        .await
        .context("State backend setup task failed")??;
    let positions = Arc::new(
        PositionCache::new(Arc::clone(&backend), config.job.as_str())
            .with_key_field(config.source.key_field.as_str()),
    );

    // 4. Run until done or interrupted
    let mut orchestrator =
        Orchestrator::new(config.scan.clone(), PostgresSource::new(&config.source));
    let cancel = orchestrator.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping scan");
            cancel.cancel();
        }
    });

    let emitter = Arc::new(JsonLinesEmitter::stdout());
    let outcome = match orchestrator.start(emitter, &router, positions).await {
        Ok(()) => orchestrator.wait().await,
        Err(e) => Err(e),
    };
    interrupt.abort();
    drop(orchestrator);

    // The Postgres state backend owns a runtime and must drop off the reactor.
    tokio::task::spawn_blocking(move || drop(backend))
        .await
        .context("State backend shutdown task failed")?;

    match outcome {
        Ok(summary) => {
            eprintln!("Job '{}' completed successfully.", config.job);
            print_summary(&summary);
            Ok(())
        }
        Err(ScanError::Cancelled) => {
            eprintln!("Job '{}' cancelled; progress is saved.", config.job);
            Err(ScanError::Cancelled.into())
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("Job '{}' failed", config.job))),
    }
}

fn print_summary(summary: &ScanSummary) {
    eprintln!("  Namespaces:      {}", summary.namespaces.len());
    eprintln!("  Records emitted: {}", summary.records_emitted);
    eprintln!("  Batches emitted: {}", summary.batches_emitted);
    eprintln!("  Duration:        {:.2}s", summary.duration_secs);
    if summary.duration_secs > 0.0 {
        eprintln!(
            "  Throughput:      {:.0} rows/sec",
            summary.records_emitted as f64 / summary.duration_secs
        );
    }
    for ns in &summary.namespaces {
        let resumed = ns
            .resumed_from
            .as_ref()
            .map(|k| format!(", resumed after {k}"))
            .unwrap_or_default();
        eprintln!(
            "    {}: {} records in {} batches ({} chunks, {} partitions{})",
            ns.namespace, ns.records_emitted, ns.batches_emitted, ns.chunks, ns.partitions, resumed
        );
    }
}
