//! Runs every configured scan once and prints the results.
//!
//! Configuration comes from `MEDIASYNC_*` variables (or a `.env` file).
//! Pass mount directories as arguments to scan them as well:
//!
//! ```text
//! cargo run -p core-service --example scan_local -- /mnt/media
//! ```

use anyhow::Context;
use core_runtime::logging::{init_logging, LoggingConfig};
use core_service::{bootstrap_desktop, SyncEngineConfig};
use std::sync::Arc;

#[core_async::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default()).context("initialising logging")?;

    let config = SyncEngineConfig::from_env().context("loading configuration")?;
    let has_remote = config.remote.is_some();
    let core = bootstrap_desktop(config).await.context("bootstrapping core")?;

    let local = core.scan_local().await;
    println!("local: {}", summarize(&local));

    let mounts: Vec<String> = std::env::args().skip(1).collect();
    if !mounts.is_empty() {
        let result = core.scan_mounts(mounts).await.context("scanning mounts")?;
        println!(
            "mounts {:?}: {}",
            result.scanned_directories,
            summarize(&result.result)
        );
    }

    if has_remote {
        let result = core
            .scan_cloud(Some(Arc::new(|progress: core_sync::ScanProgress| {
                tracing::debug!(phase = %progress.phase, processed = progress.processed, total = progress.total, "cloud progress");
            })))
            .await;
        println!("cloud: {}", summarize(&result));
    }

    Ok(())
}

fn summarize(result: &core_service::ScanResult) -> String {
    let mut summary = format!(
        "{} added, {} updated, {} deleted",
        result.added_count, result.updated_count, result.deleted_count
    );
    for error in &result.errors {
        summary.push_str(&format!("\n  error: {}", error));
    }
    summary
}
