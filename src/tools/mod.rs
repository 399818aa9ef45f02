//! Analysis tool specifications.
//!
//! A toolchain entry is a comma-delimited string: the head is the
//! executable, the tail is its argv prefix, and the sample path is appended
//! as the final argument at execution time. The set of supported tools is
//! closed; an entry naming anything else is rejected when the run
//! configuration is built, never mid-run.

pub mod invoker;
pub mod parse;

use std::path::Path;

use crate::core::{MalaError, Result};

/// The closed set of supported analysis tools, keyed by executable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Strings,
    Exiftool,
    Diec,
    Tlsh,
    Ssdeep,
}

impl ToolKind {
    pub fn from_program(program: &str) -> Option<Self> {
        // A spec may name the executable by absolute path.
        let name = Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(program);
        match name {
            "strings" => Some(Self::Strings),
            "exiftool" => Some(Self::Exiftool),
            "diec" => Some(Self::Diec),
            "tlsh" => Some(Self::Tlsh),
            "ssdeep" => Some(Self::Ssdeep),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Strings => "strings",
            Self::Exiftool => "exiftool",
            Self::Diec => "diec",
            Self::Tlsh => "tlsh",
            Self::Ssdeep => "ssdeep",
        }
    }

    /// Output tables this tool is expected to populate for every sample.
    /// The verifier probes these; `strings` is listed for completeness but
    /// the verifier never probes it (t_stringinstance is far too large).
    pub fn tables(self) -> &'static [&'static str] {
        match self {
            Self::Strings => &["t_stringinstance", "t_strings"],
            Self::Exiftool => &["t_exiftool"],
            Self::Diec => &["t_diec", "t_diec_meta", "t_diec_ent"],
            Self::Tlsh => &["t_tlsh"],
            Self::Ssdeep => &["t_ssdeep"],
        }
    }
}

/// One parsed toolchain entry.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub program: String,
    pub args: Vec<String>,
    /// The entry as written, kept for logging and the execution record.
    pub raw: String,
}

impl ToolSpec {
    /// Split a comma-delimited toolchain entry into executable + argv prefix.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split(',');
        let program = parts
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(MalaError::EmptyToolSpec)?;
        let kind = ToolKind::from_program(program)
            .ok_or_else(|| MalaError::UnknownTool(raw.to_string()))?;
        Ok(Self {
            kind,
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
            raw: raw.to_string(),
        })
    }
}

/// Parse a whole toolchain, rejecting the run on the first bad entry.
pub fn parse_toolchain<S: AsRef<str>>(entries: &[S]) -> Result<Vec<ToolSpec>> {
    entries.iter().map(|e| ToolSpec::parse(e.as_ref())).collect()
}
