//! Run configuration and pipeline constants.

pub mod settings;

use std::path::PathBuf;

use crate::tools::ToolSpec;

pub use settings::DbSettings;

/// Longest string (in chars) the readability scorer will consider.
pub const MAX_STRING_CHAR_LIMIT: usize = 2600;

/// Chunk size for streaming file hashes.
pub const FILE_HASH_BUFFER_SIZE: usize = 8192;

/// Readability score a string must exceed to be persisted.
pub const SHR_CUTOFF: i32 = 40;

/// Batch size for the contended `insert_strings` stored procedure.
pub const STRING_CHUNK_SIZE: usize = 256;

/// Archive extraction is disk-bound; more workers than this just thrash.
pub const EXTRACT_WORKERS: usize = 2;

/// Password applied to every sample archive.
pub const ARCHIVE_PASSWORD: &str = "infected";

/// Default analysis toolchain. `strings` must carry `-t d` so the parser
/// receives decimal offsets.
pub const DEFAULT_TOOLCHAIN: &[&str] = &[
    "exiftool,-S,-j,-P",
    "strings,-t,d,-a,-n,6",
    "strings,-t,d,-a,-n,6,-e,l",
    "diec,-je",
    "diec,-jd",
    "tlsh,-ojson,-f",
    "ssdeep,-sbc",
];

/// Immutable per-run configuration.
///
/// Built once by the CLI (or a test harness) and passed by reference into the
/// scheduler and every worker. A `single_tool` override replaces the
/// toolchain at construction time; nothing mutates this afterwards.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory to walk for input.
    pub dir: PathBuf,
    /// Directory archives are extracted into.
    pub dest_dir: PathBuf,
    /// Single sample path for singleshot mode.
    pub filename: Option<PathBuf>,
    /// Inputs are already extracted; skip the archive phase.
    pub extracted: bool,
    /// Process exactly one sample, then exit.
    pub singleshot: bool,
    /// Fill in missing tool outputs for already-known samples.
    pub verify: bool,
    /// Archives are multi-sample packages; track them in t_package.
    pub package: bool,
    /// Cap on the number of samples (0 = unlimited).
    pub filelimit: usize,
    /// Worker fan-out width.
    pub thread_limit: usize,
    /// Readability gate applied to extracted strings.
    pub shr_cutoff: i32,
    /// Parsed analysis toolchain, applied in order to every sample.
    pub toolchain: Vec<ToolSpec>,
    /// Original command line, recorded on the execution row.
    pub cmdline: String,
}

impl RunConfig {
    /// Compact signature of the toolchain for the execution record.
    pub fn toolchain_signature(&self) -> String {
        self.toolchain
            .iter()
            .map(|spec| spec.raw.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
