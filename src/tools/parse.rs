//! Per-tool output decoders.
//!
//! Each decoder turns raw tool stdout into a [`ToolOutput`] the persistence
//! layer writes verbatim. Decoders are total on well-formed output; anything
//! else is an error the worker logs before moving on to the next tool.

use serde::Deserialize;
use serde_json::Value;

use crate::core::readability::readability_score;
use crate::core::{MalaError, Result};
use crate::tools::{ToolKind, ToolSpec};

/// Parsed tool output, ready for persistence.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Parallel arrays: gated string values, their scores, byte offsets.
    Strings {
        values: Vec<String>,
        scores: Vec<i32>,
        offsets: Vec<i32>,
    },
    /// Flat tag -> content map from exiftool.
    Exif(Vec<(String, String)>),
    /// Rows from a diec deep scan.
    DiecDetects(Vec<DiecDetect>),
    /// Per-section entropy rows plus the whole-file row from a diec
    /// entropy scan.
    DiecEntropy {
        records: Vec<EntropyRecord>,
        total: f64,
        status: String,
    },
    Tlsh(String),
    Ssdeep(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiecDetect {
    #[serde(default)]
    pub info: String,
    pub name: String,
    pub string: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntropyRecord {
    pub entropy: f64,
    pub name: String,
    pub offset: i64,
    pub size: i64,
    pub status: String,
}

#[derive(Deserialize)]
struct TlshReport {
    digests: Vec<TlshDigest>,
}

#[derive(Deserialize)]
struct TlshDigest {
    tlsh: String,
}

/// Dispatch stdout to the decoder for this tool.
pub fn parse_output(spec: &ToolSpec, stdout: &str, cutoff: i32) -> Result<ToolOutput> {
    match spec.kind {
        ToolKind::Strings => Ok(parse_strings(stdout, cutoff)),
        ToolKind::Exiftool => parse_exiftool(stdout),
        ToolKind::Diec => parse_diec(stdout),
        ToolKind::Tlsh => parse_tlsh(stdout),
        ToolKind::Ssdeep => parse_ssdeep(stdout),
    }
}

/// Decode `strings -t d` output: one `<decimal offset> <text>` pair per
/// line. Lines shorter than 9 chars after left-trim, without a space, or
/// with an unparseable offset are dropped; surviving text is gated on its
/// readability score.
pub fn parse_strings(stdout: &str, cutoff: i32) -> ToolOutput {
    let mut values = Vec::new();
    let mut scores = Vec::new();
    let mut offsets = Vec::new();

    if stdout.len() >= 9 {
        for line in stdout.lines() {
            let line = line.trim_start();
            if line.chars().count() < 9 || !line.contains(' ') {
                continue;
            }
            let Some((offset_text, text)) = line.split_once(' ') else {
                continue;
            };
            let Ok(offset) = offset_text.parse::<i32>() else {
                continue;
            };
            let text = text.trim_start();
            let score = readability_score(text);
            if score > cutoff {
                values.push(text.to_string());
                scores.push(score);
                offsets.push(offset);
            }
        }
    }

    ToolOutput::Strings {
        values,
        scores,
        offsets,
    }
}

/// Decode `exiftool -S -j -P`: a JSON list of objects merged into one flat
/// tag -> content map. Later objects overwrite earlier tags.
fn parse_exiftool(stdout: &str) -> Result<ToolOutput> {
    let objects: Vec<serde_json::Map<String, Value>> =
        serde_json::from_str(stdout).map_err(|e| MalaError::ToolOutput {
            tool: "exiftool",
            reason: e.to_string(),
        })?;

    let mut merged = serde_json::Map::new();
    for object in objects {
        merged.extend(object);
    }

    let pairs = merged
        .into_iter()
        .map(|(tag, value)| (tag, stringify(value)))
        .collect();
    Ok(ToolOutput::Exif(pairs))
}

fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Decode diec JSON. An entropy scan (`-je`) carries `records` plus
/// whole-file `total`/`status`; a deep scan (`-jd`) carries `detects`. A
/// detect block without `values` becomes a single placeholder row so the
/// sample still registers as scanned.
fn parse_diec(stdout: &str) -> Result<ToolOutput> {
    let report: Value = serde_json::from_str(stdout).map_err(|e| MalaError::ToolOutput {
        tool: "diec",
        reason: e.to_string(),
    })?;

    if let Some(detects) = report.get("detects") {
        let first = detects.get(0).ok_or_else(|| MalaError::ToolOutput {
            tool: "diec",
            reason: "empty detects list".into(),
        })?;
        if let Some(values) = first.get("values") {
            let rows: Vec<DiecDetect> =
                serde_json::from_value(values.clone()).map_err(|e| MalaError::ToolOutput {
                    tool: "diec",
                    reason: e.to_string(),
                })?;
            return Ok(ToolOutput::DiecDetects(rows));
        }
        let string = first
            .get("string")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(ToolOutput::DiecDetects(vec![DiecDetect {
            info: "broken".into(),
            name: "broken".into(),
            string,
            kind: "broken".into(),
            version: "broken".into(),
        }]));
    }

    if let Some(records) = report.get("records") {
        let records: Vec<EntropyRecord> =
            serde_json::from_value(records.clone()).map_err(|e| MalaError::ToolOutput {
                tool: "diec",
                reason: e.to_string(),
            })?;
        let total = report
            .get("total")
            .and_then(Value::as_f64)
            .ok_or_else(|| MalaError::ToolOutput {
                tool: "diec",
                reason: "missing total entropy".into(),
            })?;
        let status = report
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(ToolOutput::DiecEntropy {
            records,
            total,
            status,
        });
    }

    Err(MalaError::ToolOutput {
        tool: "diec",
        reason: "neither detects nor records present".into(),
    })
}

/// Decode `tlsh -ojson -f`: the digest lives at `digests[0].tlsh`.
fn parse_tlsh(stdout: &str) -> Result<ToolOutput> {
    let report: TlshReport = serde_json::from_str(stdout).map_err(|e| MalaError::ToolOutput {
        tool: "tlsh",
        reason: e.to_string(),
    })?;
    let digest = report
        .digests
        .into_iter()
        .next()
        .ok_or_else(|| MalaError::ToolOutput {
            tool: "tlsh",
            reason: "empty digests list".into(),
        })?;
    Ok(ToolOutput::Tlsh(digest.tlsh))
}

/// Decode `ssdeep -sbc` plaintext: the hash is the first comma-delimited
/// field of the second line (the first line is the format header).
fn parse_ssdeep(stdout: &str) -> Result<ToolOutput> {
    let hash = stdout
        .lines()
        .nth(1)
        .and_then(|line| line.split(',').next())
        .filter(|hash| !hash.is_empty())
        .ok_or_else(|| MalaError::ToolOutput {
            tool: "ssdeep",
            reason: "missing hash line".into(),
        })?;
    Ok(ToolOutput::Ssdeep(hash.to_string()))
}
