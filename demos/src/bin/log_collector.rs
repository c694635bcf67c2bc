use std::{process, time::Duration};

use anyhow::{Context as _, Result};
use collector_demos::{init_logging_defaults, init_tracing, read_env_any, read_env_string};
use testing_framework_logs::initialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_RUN_SECS: u64 = 60;
const DEFAULT_LABEL: &str = "demo";

fn main() {
    init_logging_defaults();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!("failed to start runtime: {err}");
            process::exit(1);
        }
    };

    let run_secs = read_env_any(&["LOGS_DEMO_RUN_SECS"], DEFAULT_RUN_SECS);
    let label = read_env_string(&["LOGS_DEMO_LABEL"], DEFAULT_LABEL);
    info!(run_secs, label = %label, "starting log collector demo");

    if let Err(err) = runtime.block_on(run(&label, Duration::from_secs(run_secs))) {
        warn!("log collector demo failed: {err:#}");
        process::exit(1);
    }
}

async fn run(label: &str, run_duration: Duration) -> Result<()> {
    let collector = initialize()
        .await
        .context("initializing log collection failed")?;
    if !collector.is_enabled() {
        warn!("no cluster reachable or collection disabled; nothing to collect");
        return Ok(());
    }

    let capture = collector.capture(label);
    let monitor = collector.monitor_namespaces(CancellationToken::new(), label);
    info!(
        clusters = collector.clusters().len(),
        artifacts_dir = %collector.config().artifacts_dir.display(),
        "monitoring namespaces"
    );

    tokio::select! {
        () = tokio::time::sleep(run_duration) => {}
        () = collector.shutdown_token().cancelled() => info!("interrupted, collecting what we have"),
    }
    monitor.stop().await;

    let summary = capture.finalize().await;
    let failures: usize = summary.dumps.iter().map(|dump| dump.failures).sum();
    info!(
        dumps = summary.dumps.len(),
        pods = summary.pods.len(),
        failures,
        "log collection finished"
    );

    collector.shutdown().await;
    Ok(())
}
