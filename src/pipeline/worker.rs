//! The per-sample worker.
//!
//! Each worker runs as its own task over one chunk of the work set, owning
//! a dedicated database connection and processing samples strictly in
//! order: hash, look up, then either skip, verify, or insert and run the
//! toolchain. Tool failures are contained per tool; database failures kill
//! the worker and leave the rest of the fleet running.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::{DbSettings, RunConfig};
use crate::core::hashing::hash_file;
use crate::core::{MalaError, Result};
use crate::db::{Dao, NewSample, RetryPolicy};
use crate::pipeline::verify::verify_sample;
use crate::tools::invoker::run_tool;
use crate::tools::parse::parse_output;
use crate::tools::ToolSpec;

/// What a worker hands back at fan-in.
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Samples seen, including skips.
    pub count: u64,
    /// Samples newly inserted and analyzed.
    pub handled: u64,
    /// Known samples re-checked in verify mode.
    pub verified: u64,
    /// Ids of every sample this worker touched.
    pub sample_ids: Vec<i64>,
}

/// Run one worker over its chunk. The connection is closed on every exit
/// path; a returned error means the worker died and its chunk is only
/// partially processed.
pub async fn run_worker(
    worker_id: usize,
    chunk: Vec<PathBuf>,
    config: Arc<RunConfig>,
    settings: DbSettings,
    retry: RetryPolicy,
) -> Result<WorkerStats> {
    let mut dao = Dao::connect(&settings).await?;
    let mut stats = WorkerStats::default();
    let outcome = process_chunk(&mut dao, &config, &retry, &chunk, &mut stats).await;
    dao.close().await;

    match outcome {
        Ok(()) => {
            debug!(
                "Worker {worker_id} finished. Processed: {} Verified: {} New: {}",
                stats.count, stats.verified, stats.handled
            );
            Ok(stats)
        }
        Err(e) => {
            error!("Worker {worker_id} failed, tearing it down: {e}");
            Err(e)
        }
    }
}

async fn process_chunk(
    dao: &mut Dao,
    config: &RunConfig,
    retry: &RetryPolicy,
    chunk: &[PathBuf],
    stats: &mut WorkerStats,
) -> Result<()> {
    for file in chunk {
        stats.count += 1;

        let digest = match hash_file(file).await {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Skipping unreadable sample {}: {e}", file.display());
                continue;
            }
        };

        let known_id = match dao.sample_id_by_sha256(&digest.sha256).await? {
            Some(id) => Some(id),
            None => {
                let sample = NewSample {
                    md5: digest.md5,
                    sha256: digest.sha256.clone(),
                    sha1: digest.sha1,
                    basename: file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    path: file.to_string_lossy().into_owned(),
                    fsize: digest.size as i32,
                };
                match dao.insert_sample(&sample).await {
                    Ok(id) => {
                        run_toolchain(dao, config, retry, id, file).await?;
                        stats.handled += 1;
                        stats.sample_ids.push(id);
                        None
                    }
                    // Another worker won the insert race; the sample is
                    // known after all.
                    Err(MalaError::Database(e)) if is_unique_violation(&e) => {
                        dao.sample_id_by_sha256(&digest.sha256).await?
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        if let Some(id) = known_id {
            if config.verify {
                verify_sample(dao, &config.toolchain, retry, config.shr_cutoff, id).await?;
                debug!("Verified file {id}");
                stats.verified += 1;
                stats.sample_ids.push(id);
            }
        }
    }
    Ok(())
}

/// Run every configured tool on one sample. A tool that fails to run,
/// parse, or persist is logged and skipped so the remaining tools still
/// execute; only retry exhaustion aborts the chunk.
async fn run_toolchain(
    dao: &mut Dao,
    config: &RunConfig,
    retry: &RetryPolicy,
    sample_id: i64,
    sample_path: &Path,
) -> Result<()> {
    for spec in &config.toolchain {
        if let Err(e) =
            run_and_persist(dao, spec, sample_path, config.shr_cutoff, retry, sample_id).await
        {
            if matches!(e, MalaError::RetryExhausted { .. }) {
                return Err(e);
            }
            warn!("Skipping tool {} on sample {sample_id}: {e}", spec.raw);
        }
    }
    Ok(())
}

/// Execute one tool, decode its output, persist the result.
pub(crate) async fn run_and_persist(
    dao: &mut Dao,
    spec: &ToolSpec,
    sample_path: &Path,
    cutoff: i32,
    retry: &RetryPolicy,
    sample_id: i64,
) -> Result<()> {
    let stdout = run_tool(spec, sample_path).await?;
    let output = parse_output(spec, &stdout, cutoff)?;
    dao.persist(output, sample_id, retry).await
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
