//! Data access for one worker.
//!
//! Every worker owns exactly one connection, used in autocommit (each
//! statement commits on its own; no explicit transactions). All writes
//! except the shared strings table are naturally partitioned by sample, so
//! only [`Dao::insert_string_instances`] carries retry machinery.

use chrono::NaiveDateTime;
use sqlx::{Connection, PgConnection};
use tracing::{debug, error};

use crate::config::{DbSettings, STRING_CHUNK_SIZE};
use crate::core::{MalaError, Result};
use crate::db::retry::RetryPolicy;
use crate::tools::parse::{DiecDetect, EntropyRecord, ToolOutput};

/// Attributes of a sample not yet in the store.
#[derive(Debug, Clone)]
pub struct NewSample {
    pub md5: String,
    pub sha256: String,
    pub sha1: String,
    pub basename: String,
    pub path: String,
    pub fsize: i32,
}

/// Attributes of a package archive not yet in the store.
#[derive(Debug, Clone)]
pub struct NewPackage {
    pub md5: String,
    pub basename: String,
    pub path: String,
    pub fsize: i64,
    pub date_ingested: NaiveDateTime,
    pub fcount: i32,
}

/// One known package archive.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PackageRow {
    pub id: i64,
    pub md5: String,
    pub basename: String,
    pub path: String,
    pub fsize: i64,
    pub date_ingested: NaiveDateTime,
    pub fcount: i32,
}

/// The completed-run record written after fan-in.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub exec_uuid: String,
    pub cmdline: String,
    pub fcount: i32,
    pub start_time: NaiveDateTime,
    pub finish_time: NaiveDateTime,
    pub toolchain: String,
    pub thread_limit: i32,
    pub shr_cutoff: i32,
    pub fcount_sanity: i32,
    pub handled_count: i32,
    pub verified_count: i32,
}

/// One dedicated database connection plus the operations the pipeline needs.
pub struct Dao {
    conn: PgConnection,
}

impl Dao {
    pub async fn connect(settings: &DbSettings) -> Result<Self> {
        let conn = PgConnection::connect_with(&settings.connect_options()).await?;
        Ok(Self { conn })
    }

    /// Close the connection. Failures are logged, not surfaced; the worker
    /// is already on its way out.
    pub async fn close(self) {
        if let Err(e) = self.conn.close().await {
            debug!("Error closing connection: {e}");
        }
    }

    pub async fn sample_id_by_sha256(&mut self, sha256: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM t_file WHERE sha256 = $1 LIMIT 1")
            .bind(sha256)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(id)
    }

    /// Insert a sample the caller has already established as unknown.
    /// A SHA-256 collision here is a race with another worker and surfaces
    /// as a database error.
    pub async fn insert_sample(&mut self, sample: &NewSample) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO t_file (md5, sha256, sha1, basename, path, fsize) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(&sample.md5)
        .bind(&sample.sha256)
        .bind(&sample.sha1)
        .bind(&sample.basename)
        .bind(&sample.path)
        .bind(sample.fsize)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(id)
    }

    pub async fn search_package(&mut self, basename: &str) -> Result<Option<PackageRow>> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT id, md5, basename, path, fsize, date_ingested, fcount \
             FROM t_package WHERE basename = $1 LIMIT 1",
        )
        .bind(basename)
        .fetch_optional(&mut self.conn)
        .await?;
        Ok(row)
    }

    /// How many known samples were extracted out of this package, judged by
    /// path containment of the stripped archive basename.
    pub async fn package_sample_count(&mut self, stripped_basename: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM t_file WHERE path LIKE '%/' || $1 || '/%'",
        )
        .bind(stripped_basename)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(count)
    }

    pub async fn insert_package(&mut self, package: &NewPackage) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO t_package (md5, basename, path, fsize, date_ingested, fcount) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(&package.md5)
        .bind(&package.basename)
        .bind(&package.path)
        .bind(package.fsize)
        .bind(package.date_ingested)
        .bind(package.fcount)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(id)
    }

    pub async fn insert_execution(&mut self, record: &ExecutionRecord) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO t_executions \
             (exec_uuid, cmdline, fcount, start_time, finish_time, toolchain, \
              thread_limit, shr_cutoff, fcount_sanity, handled_count, verified_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id",
        )
        .bind(&record.exec_uuid)
        .bind(&record.cmdline)
        .bind(record.fcount)
        .bind(record.start_time)
        .bind(record.finish_time)
        .bind(&record.toolchain)
        .bind(record.thread_limit)
        .bind(record.shr_cutoff)
        .bind(record.fcount_sanity)
        .bind(record.handled_count)
        .bind(record.verified_count)
        .fetch_one(&mut self.conn)
        .await?;
        Ok(id)
    }

    pub async fn link_sample_to_execution(
        &mut self,
        sample_id: i64,
        execution_id: i64,
    ) -> Result<()> {
        sqlx::query("INSERT INTO t_file_ingest (id_file, id_execution) VALUES ($1, $2)")
            .bind(sample_id)
            .bind(execution_id)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    /// Rows for this sample in one of the per-tool output tables. The table
    /// name comes from the static tool->tables mapping, never from input.
    pub async fn sample_rowcount_in(&mut self, sample_id: i64, table: &str) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM {table} WHERE id_file = $1");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(sample_id)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(count)
    }

    pub async fn sample_path(&mut self, sample_id: i64) -> Result<String> {
        let path = sqlx::query_scalar::<_, String>("SELECT path FROM t_file WHERE id = $1")
            .bind(sample_id)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(path)
    }

    /// Ids of samples with no string coverage at all. Kept as one bulk query;
    /// probing t_stringinstance per sample is prohibitively expensive.
    pub async fn samples_missing_strings(&mut self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT id FROM t_file \
             WHERE id NOT IN (SELECT DISTINCT id_file FROM t_stringinstance)",
        )
        .fetch_all(&mut self.conn)
        .await?;
        Ok(ids)
    }

    /// Persist one parsed tool output for a sample.
    pub async fn persist(
        &mut self,
        output: ToolOutput,
        sample_id: i64,
        retry: &RetryPolicy,
    ) -> Result<()> {
        match output {
            ToolOutput::Strings {
                values,
                scores,
                offsets,
            } => {
                self.insert_string_instances(&values, &scores, &offsets, sample_id, retry)
                    .await
            }
            ToolOutput::Exif(pairs) => self.insert_exif(&pairs, sample_id).await,
            ToolOutput::DiecDetects(rows) => self.insert_diec_detects(&rows, sample_id).await,
            ToolOutput::DiecEntropy {
                records,
                total,
                status,
            } => {
                self.insert_diec_entropy(&records, total, &status, sample_id)
                    .await
            }
            ToolOutput::Tlsh(hash) => self.insert_tlsh(&hash, sample_id).await,
            ToolOutput::Ssdeep(hash) => self.insert_ssdeep(&hash, sample_id).await,
        }
    }

    /// The hot path. The strings table enforces uniqueness on value, so two
    /// workers inserting overlapping new values can deadlock. The insert is
    /// split in two:
    ///
    /// 1. Conflict-skipping bulk insert into t_strings through the
    ///    idempotent `insert_strings` procedure, in chunks, each chunk
    ///    retried under the policy until it lands or the policy gives up.
    /// 2. One `insert_string_instances` call joining the values back by
    ///    ordinal. Not idempotent, so never retried; failure loses this
    ///    sample's instances and is logged.
    pub async fn insert_string_instances(
        &mut self,
        values: &[String],
        scores: &[i32],
        offsets: &[i32],
        sample_id: i64,
        retry: &RetryPolicy,
    ) -> Result<()> {
        if values.is_empty() {
            debug!("No strings to process for sample {sample_id}");
            return Ok(());
        }

        for (value_chunk, score_chunk) in values
            .chunks(STRING_CHUNK_SIZE)
            .zip(scores.chunks(STRING_CHUNK_SIZE))
        {
            let mut attempt: u32 = 0;
            loop {
                match sqlx::query("SELECT insert_strings($1, $2)")
                    .bind(value_chunk)
                    .bind(score_chunk)
                    .execute(&mut self.conn)
                    .await
                {
                    Ok(_) => break,
                    Err(source) => {
                        attempt += 1;
                        if retry.exhausted(attempt) {
                            return Err(MalaError::RetryExhausted {
                                attempts: attempt,
                                source,
                            });
                        }
                        debug!(
                            "insert_strings attempt {attempt} failed for sample \
                             {sample_id}: {source}"
                        );
                        tokio::time::sleep(retry.delay(attempt)).await;
                    }
                }
            }
        }

        if let Err(e) = sqlx::query("SELECT insert_string_instances($1, $2, $3)")
            .bind(values)
            .bind(sample_id)
            .bind(offsets)
            .execute(&mut self.conn)
            .await
        {
            error!("insert_string_instances failed for sample {sample_id}: {e}");
        }
        Ok(())
    }

    pub async fn insert_exif(&mut self, pairs: &[(String, String)], sample_id: i64) -> Result<()> {
        for (tag, content) in pairs {
            sqlx::query("INSERT INTO t_exiftool (tag, content, id_file) VALUES ($1, $2, $3)")
                .bind(tag)
                .bind(content)
                .bind(sample_id)
                .execute(&mut self.conn)
                .await?;
        }
        Ok(())
    }

    pub async fn insert_tlsh(&mut self, hash: &str, sample_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO t_tlsh (tlsh_hash, id_file) VALUES ($1, $2)")
            .bind(hash)
            .bind(sample_id)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    pub async fn insert_ssdeep(&mut self, hash: &str, sample_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO t_ssdeep (ssdeep_hash, id_file) VALUES ($1, $2)")
            .bind(hash)
            .bind(sample_id)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    pub async fn insert_diec_detects(
        &mut self,
        rows: &[DiecDetect],
        sample_id: i64,
    ) -> Result<()> {
        for row in rows {
            sqlx::query(
                "INSERT INTO t_diec (info, name, string, type, version, id_file) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&row.info)
            .bind(&row.name)
            .bind(&row.string)
            .bind(&row.kind)
            .bind(&row.version)
            .bind(sample_id)
            .execute(&mut self.conn)
            .await?;
        }
        Ok(())
    }

    pub async fn insert_diec_entropy(
        &mut self,
        records: &[EntropyRecord],
        total: f64,
        status: &str,
        sample_id: i64,
    ) -> Result<()> {
        for record in records {
            sqlx::query(
                "INSERT INTO t_diec_ent (entropy, name, s_offset, size, status, id_file) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(record.entropy)
            .bind(&record.name)
            .bind(record.offset)
            .bind(record.size)
            .bind(&record.status)
            .bind(sample_id)
            .execute(&mut self.conn)
            .await?;
        }
        sqlx::query("INSERT INTO t_diec_meta (entropy, status, id_file) VALUES ($1, $2, $3)")
            .bind(total)
            .bind(status)
            .bind(sample_id)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }
}
