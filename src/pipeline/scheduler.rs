//! Run orchestration: discover, extract, partition, fan out, record.
//!
//! One scheduler drives a run end to end. Failures before partitioning
//! surface to the caller and leave no execution record; once workers are
//! in flight, individual failures are contained and the run is recorded
//! with whatever the surviving workers report.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{DbSettings, RunConfig};
use crate::core::{MalaError, Result};
use crate::db::{Dao, ExecutionRecord, RetryPolicy};
use crate::files::{discovery, extract};
use crate::pipeline::balance::lpt_partition;
use crate::pipeline::worker::{run_worker, WorkerStats};

/// Aggregated outcome of one run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Files in the final work set.
    pub files: usize,
    /// Samples seen across all workers (fcount sanity value).
    pub count: u64,
    /// Samples newly ingested.
    pub handled: u64,
    /// Known samples re-verified.
    pub verified: u64,
    pub workers_spawned: usize,
    pub workers_failed: usize,
}

/// Drive one full run. The returned stats carry the failed-worker count;
/// the caller decides the exit code.
pub async fn run(config: RunConfig, settings: DbSettings, retry: RetryPolicy) -> Result<RunStats> {
    let mut dao = Dao::connect(&settings).await?;
    let outcome = drive(&mut dao, config, &settings, retry).await;
    dao.close().await;
    outcome
}

async fn drive(
    dao: &mut Dao,
    config: RunConfig,
    settings: &DbSettings,
    retry: RetryPolicy,
) -> Result<RunStats> {
    let start_time = chrono::Local::now().naive_local();
    let exec_uuid = Uuid::new_v4().to_string();

    let mut targets = resolve_targets(dao, &config).await?;
    apply_filelimit(&mut targets, config.filelimit);

    if targets.is_empty() {
        println!("No files to process, exiting.");
        return Err(MalaError::NoFiles);
    }
    info!("Handling {} malware samples.", targets.len());

    if config.verify {
        match dao.samples_missing_strings().await {
            Ok(ids) => info!("{} known samples have no string coverage.", ids.len()),
            Err(e) => debug!("Could not probe string coverage: {e}"),
        }
    }

    let mut sized = Vec::with_capacity(targets.len());
    for path in targets {
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                // Let the worker report the unreadable sample; an unknown
                // size only costs balance, not correctness.
                warn!("Could not stat {}: {e}", path.display());
                0
            }
        };
        sized.push((path, size));
    }
    let files = sized.len();
    let chunks = lpt_partition(sized, config.thread_limit);
    info!(
        "Running with {} workers and {} chunks",
        config.thread_limit,
        chunks.len()
    );

    let config = Arc::new(config);
    let mut handles = Vec::with_capacity(chunks.len());
    for (worker_id, chunk) in chunks.into_iter().enumerate() {
        handles.push(tokio::spawn(run_worker(
            worker_id,
            chunk,
            Arc::clone(&config),
            settings.clone(),
            retry.clone(),
        )));
    }
    let workers_spawned = handles.len();

    let mut agg = WorkerStats::default();
    let mut workers_failed = 0usize;
    for handle in handles {
        match handle.await {
            Ok(Ok(stats)) => absorb(&mut agg, stats),
            // The worker already logged its own failure.
            Ok(Err(_)) => workers_failed += 1,
            Err(e) => {
                error!("Worker task aborted: {e}");
                workers_failed += 1;
            }
        }
    }

    let record = ExecutionRecord {
        exec_uuid: exec_uuid.clone(),
        cmdline: config.cmdline.clone(),
        fcount: files as i32,
        start_time,
        finish_time: chrono::Local::now().naive_local(),
        toolchain: config.toolchain_signature(),
        thread_limit: config.thread_limit as i32,
        shr_cutoff: config.shr_cutoff,
        fcount_sanity: agg.count as i32,
        handled_count: agg.handled as i32,
        verified_count: agg.verified as i32,
    };
    let execution_id = dao.insert_execution(&record).await?;
    // One ingest row per sample per execution, even when the same content
    // surfaced under more than one path.
    agg.sample_ids.sort_unstable();
    agg.sample_ids.dedup();
    for sample_id in &agg.sample_ids {
        dao.link_sample_to_execution(*sample_id, execution_id).await?;
    }
    info!(
        "Recorded execution {exec_uuid}: {} samples linked, {workers_failed} workers failed",
        agg.sample_ids.len()
    );

    Ok(RunStats {
        files,
        count: agg.count,
        handled: agg.handled,
        verified: agg.verified,
        workers_spawned,
        workers_failed,
    })
}

/// Resolve the work set: the named file in singleshot mode, a plain walk in
/// extracted mode, otherwise the archive phase (discover, package-filter,
/// extract, re-walk).
async fn resolve_targets(dao: &mut Dao, config: &RunConfig) -> Result<Vec<PathBuf>> {
    if config.singleshot {
        let file = config
            .filename
            .clone()
            .ok_or_else(|| MalaError::Config("Singleshot mode needs a filename".into()))?;
        debug!("Running on a single file: {}", file.display());
        return Ok(vec![file]);
    }

    if config.extracted {
        debug!("Checking target path {}", config.dir.display());
        return Ok(discovery::walk_samples(&config.dir));
    }

    let mut archives = discovery::walk_archives(&config.dir);
    debug!("Discovered {} archives under {}", archives.len(), config.dir.display());
    if config.package {
        archives = discovery::filter_known_packages(dao, archives).await;
    }
    let survivors = extract::extract_all(archives, &config.dest_dir, config.package).await;

    if config.package {
        // Each package unpacked into its own directory; collect their
        // contents rather than everything under dest_dir.
        let mut samples = BTreeSet::new();
        for archive in &survivors {
            let dir = extract::extraction_target(archive, &config.dest_dir);
            if dir.is_dir() {
                samples.extend(discovery::walk_samples(&dir));
            }
        }
        Ok(samples.into_iter().collect())
    } else {
        Ok(discovery::walk_samples(&config.dest_dir))
    }
}

fn apply_filelimit(targets: &mut Vec<PathBuf>, limit: usize) {
    if limit > 0 && targets.len() > limit {
        targets.truncate(limit);
    }
}

fn absorb(agg: &mut WorkerStats, stats: WorkerStats) {
    agg.count += stats.count;
    agg.handled += stats.handled;
    agg.verified += stats.verified;
    agg.sample_ids.extend(stats.sample_ids);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("s{i}"))).collect()
    }

    #[test]
    fn filelimit_zero_means_unlimited() {
        let mut targets = paths(5);
        apply_filelimit(&mut targets, 0);
        assert_eq!(targets.len(), 5);
    }

    #[test]
    fn filelimit_caps_in_input_order() {
        let mut targets = paths(5);
        apply_filelimit(&mut targets, 3);
        assert_eq!(targets, paths(3));

        let mut targets = paths(2);
        apply_filelimit(&mut targets, 3);
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn stats_absorb_sums_and_concatenates() {
        let mut agg = WorkerStats::default();
        absorb(
            &mut agg,
            WorkerStats {
                count: 3,
                handled: 2,
                verified: 1,
                sample_ids: vec![10, 11],
            },
        );
        absorb(
            &mut agg,
            WorkerStats {
                count: 1,
                handled: 0,
                verified: 1,
                sample_ids: vec![12],
            },
        );
        assert_eq!(agg.count, 4);
        assert_eq!(agg.handled, 2);
        assert_eq!(agg.verified, 2);
        assert_eq!(agg.sample_ids, vec![10, 11, 12]);
    }
}
