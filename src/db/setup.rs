//! Schema bootstrap.
//!
//! Idempotent DDL run once at startup so a fresh database is usable without
//! a separate provisioning step. Strings and their instances use bigserial
//! keys; the strings table passes 2^31 rows well before a million samples.

use sqlx::{Connection, PgConnection};
use tracing::debug;

use crate::config::DbSettings;
use crate::core::Result;

const TABLES: &[(&str, &str)] = &[
    (
        "t_file",
        "md5 char(32), sha256 char(64) UNIQUE, sha1 char(40), \
         basename text, path text, fsize integer",
    ),
    (
        "t_package",
        "md5 char(32) UNIQUE, basename text, path text, fsize bigint, \
         date_ingested timestamp without time zone, fcount integer",
    ),
    ("t_file_ingest", "id_file bigint, id_execution bigint"),
    (
        "t_executions",
        "exec_uuid char(36) UNIQUE, cmdline text, fcount integer, \
         start_time timestamp without time zone, \
         finish_time timestamp without time zone, toolchain text, \
         thread_limit integer, shr_cutoff integer, fcount_sanity integer, \
         handled_count integer, verified_count integer",
    ),
    ("t_strings", "value text UNIQUE, score integer"),
    (
        "t_stringinstance",
        "id_file bigint, id_string bigint, address integer",
    ),
    ("t_exiftool", "id_file bigint, tag text, content text"),
    ("t_tlsh", "id_file bigint, tlsh_hash varchar(72)"),
    ("t_ssdeep", "id_file bigint, ssdeep_hash varchar(1480)"),
    (
        "t_diec",
        "id_file bigint, info text, name text, string text, type text, version text",
    ),
    (
        "t_diec_ent",
        "id_file bigint, entropy decimal(10, 8), name text, s_offset bigint, \
         size bigint, status text",
    ),
    (
        "t_diec_meta",
        "id_file bigint, entropy decimal(10, 8), status text",
    ),
];

/// Conflict-skipping bulk insert into the shared strings table. Idempotent;
/// this is what makes the chunked retry in the DAO safe.
const INSERT_STRINGS_FN: &str = "\
CREATE OR REPLACE FUNCTION insert_strings(arr_strings TEXT[], arr_scores INTEGER[])
RETURNS VOID AS $$
BEGIN
    INSERT INTO t_strings (value, score)
    SELECT unnest(arr_strings), unnest(arr_scores)
    ON CONFLICT (value) DO NOTHING;
END;
$$ LANGUAGE plpgsql;";

/// Ordinal join of the sample's values back against t_strings, emitting one
/// instance row per occurrence with its byte offset.
const INSERT_STRING_INSTANCES_FN: &str = "\
CREATE OR REPLACE FUNCTION insert_string_instances(arr_strings TEXT[], \
file_id_val BIGINT, arr_addresses INTEGER[])
RETURNS VOID AS $$
BEGIN
    INSERT INTO t_stringinstance (id_string, id_file, address)
    SELECT t.id, file_id_val, a.address
    FROM unnest(arr_strings) WITH ORDINALITY AS v(value, ord)
    JOIN t_strings t ON t.value = v.value
    JOIN unnest(arr_addresses) WITH ORDINALITY AS a(address, ord) ON v.ord = a.ord;
END;
$$ LANGUAGE plpgsql;";

/// Ensure every table and stored procedure exists.
pub async fn ensure_schema(settings: &DbSettings) -> Result<()> {
    let mut conn = PgConnection::connect_with(&settings.connect_options()).await?;
    for (name, columns) in TABLES {
        let sql =
            format!("CREATE TABLE IF NOT EXISTS {name} (id bigserial PRIMARY KEY, {columns})");
        sqlx::query(&sql).execute(&mut conn).await?;
    }
    sqlx::query(INSERT_STRINGS_FN).execute(&mut conn).await?;
    sqlx::query(INSERT_STRING_INSTANCES_FN)
        .execute(&mut conn)
        .await?;
    conn.close().await?;
    debug!("Schema ensured: {} tables and 2 procedures", TABLES.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_spec_table_is_provisioned() {
        let names: Vec<&str> = TABLES.iter().map(|(name, _)| *name).collect();
        for expected in [
            "t_file",
            "t_package",
            "t_file_ingest",
            "t_executions",
            "t_strings",
            "t_stringinstance",
            "t_exiftool",
            "t_tlsh",
            "t_ssdeep",
            "t_diec",
            "t_diec_ent",
            "t_diec_meta",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn verifier_tables_are_all_provisioned() {
        use crate::tools::ToolKind;
        let names: Vec<&str> = TABLES.iter().map(|(name, _)| *name).collect();
        for kind in [
            ToolKind::Strings,
            ToolKind::Exiftool,
            ToolKind::Diec,
            ToolKind::Tlsh,
            ToolKind::Ssdeep,
        ] {
            for table in kind.tables() {
                assert!(names.contains(table), "missing {table}");
            }
        }
    }
}
