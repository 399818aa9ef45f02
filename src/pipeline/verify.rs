//! Verify mode: fill in missing tool coverage for known samples.

use std::path::Path;

use tracing::{info, warn};

use crate::core::{MalaError, Result};
use crate::db::{Dao, RetryPolicy};
use crate::pipeline::worker::run_and_persist;
use crate::tools::{ToolKind, ToolSpec};

/// Probe every output table of every configured tool for this sample and
/// rerun each tool with an empty table. The sample path comes from the
/// store, not the current walk, so verification works on corpora whose
/// source directories have moved on.
///
/// `strings` is never probed: t_stringinstance is by far the largest table
/// in the database and a per-sample count there is a sequential-scan tax
/// this loop cannot afford. Bulk gaps are visible through
/// [`Dao::samples_missing_strings`] instead.
pub async fn verify_sample(
    dao: &mut Dao,
    toolchain: &[ToolSpec],
    retry: &RetryPolicy,
    cutoff: i32,
    sample_id: i64,
) -> Result<()> {
    for spec in toolchain {
        if spec.kind == ToolKind::Strings {
            continue;
        }

        let mut missing = false;
        for table in spec.kind.tables() {
            if dao.sample_rowcount_in(sample_id, table).await? == 0 {
                info!("Missing {} output in {table} for sample {sample_id}", spec.raw);
                missing = true;
            }
        }
        if !missing {
            continue;
        }

        let path = dao.sample_path(sample_id).await?;
        if let Err(e) =
            run_and_persist(dao, spec, Path::new(&path), cutoff, retry, sample_id).await
        {
            if matches!(e, MalaError::RetryExhausted { .. }) {
                return Err(e);
            }
            warn!("Rerun of {} failed on sample {sample_id}: {e}", spec.raw);
        }
    }
    Ok(())
}
