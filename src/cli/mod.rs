//! Command-line interface.
//!
//! The CLI's only job is to build the immutable [`RunConfig`]; nothing in
//! the pipeline reads argv.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{RunConfig, DEFAULT_TOOLCHAIN, SHR_CUTOFF};
use crate::core::{MalaError, Result};
use crate::tools::{parse_toolchain, ToolSpec};

/// Ingest malware corpora into MalaDB
#[derive(Parser, Debug)]
#[command(name = "mala")]
#[command(version)]
#[command(about = "Ingest malware corpora into MalaDB", long_about = None)]
pub struct Cli {
    /// File for single file mode
    #[arg(long)]
    pub filename: Option<PathBuf>,

    /// A directory to scan for 7z files
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// A directory to extract malware samples into
    #[arg(long, default_value = ".")]
    pub dest_dir: PathBuf,

    /// All samples already extracted
    #[arg(short, long)]
    pub extracted: bool,

    /// Ingest one malware sample
    #[arg(short, long)]
    pub singleshot: bool,

    /// If we know a sample, verify the current toolchain has been run and
    /// get any missing tool outputs
    #[arg(short, long)]
    pub verify: bool,

    /// Archives are multi-sample packages; track them in t_package
    #[arg(short, long)]
    pub package: bool,

    /// One tool cmdline to run on every input sample, in quotes
    #[arg(long)]
    pub single_tool: Option<String>,

    /// How many samples to process into MalaDB (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub filelimit: usize,

    /// Worker fan-out width
    #[arg(short, long, env = "MALA_THREADS", default_value_t = default_threads())]
    pub threads: usize,
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
}

impl Cli {
    /// Build the immutable run configuration. A `--single-tool` override
    /// replaces the default toolchain here; unknown tools are rejected
    /// before anything touches the filesystem or the database.
    pub fn into_run_config(self) -> Result<RunConfig> {
        if self.singleshot && self.filename.is_none() {
            return Err(MalaError::Config(
                "Singleshot mode needs --filename".into(),
            ));
        }

        let toolchain: Vec<ToolSpec> = match &self.single_tool {
            Some(single) => {
                tracing::debug!("Running in single tool mode");
                vec![ToolSpec::parse(single)?]
            }
            None => parse_toolchain(DEFAULT_TOOLCHAIN)?,
        };

        let cmdline = std::env::args().skip(1).collect::<Vec<_>>().join(" ");

        Ok(RunConfig {
            dir: self.dir,
            dest_dir: self.dest_dir,
            filename: self.filename,
            extracted: self.extracted,
            singleshot: self.singleshot,
            verify: self.verify,
            package: self.package,
            filelimit: self.filelimit,
            thread_limit: self.threads.max(1),
            shr_cutoff: SHR_CUTOFF,
            toolchain,
            cmdline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolKind;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mala").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = parse(&[]);
        assert_eq!(cli.dir, PathBuf::from("."));
        assert_eq!(cli.dest_dir, PathBuf::from("."));
        assert_eq!(cli.filelimit, 0);
        assert!(!cli.extracted && !cli.verify && !cli.package);

        let config = cli.into_run_config().unwrap();
        assert_eq!(config.toolchain.len(), DEFAULT_TOOLCHAIN.len());
        assert_eq!(config.shr_cutoff, SHR_CUTOFF);
        assert!(config.thread_limit >= 1);
    }

    #[test]
    fn single_tool_replaces_the_toolchain() {
        let cli = parse(&["--single-tool", "tlsh,-ojson,-f"]);
        let config = cli.into_run_config().unwrap();
        assert_eq!(config.toolchain.len(), 1);
        assert_eq!(config.toolchain[0].kind, ToolKind::Tlsh);
    }

    #[test]
    fn unknown_single_tool_is_rejected() {
        let cli = parse(&["--single-tool", "radare2,-A"]);
        assert!(matches!(
            cli.into_run_config(),
            Err(MalaError::UnknownTool(_))
        ));
    }

    #[test]
    fn singleshot_requires_a_filename() {
        let cli = parse(&["-s"]);
        assert!(matches!(cli.into_run_config(), Err(MalaError::Config(_))));

        let cli = parse(&["-s", "--filename", "/tmp/sample.bin"]);
        let config = cli.into_run_config().unwrap();
        assert!(config.singleshot);
        assert_eq!(config.filename, Some(PathBuf::from("/tmp/sample.bin")));
    }
}
