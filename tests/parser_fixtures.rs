//! Black-box fixtures over the library surface: tool output decoding,
//! readability gating, toolchain parsing, and work-set balancing.

use std::path::PathBuf;

use mala::config::{DEFAULT_TOOLCHAIN, SHR_CUTOFF};
use mala::core::readability::readability_score;
use mala::pipeline::balance::lpt_partition;
use mala::tools::parse::{parse_output, parse_strings, ToolOutput};
use mala::tools::{parse_toolchain, ToolKind, ToolSpec};

/// Output of `strings -t d -a -n 6` against a PE sample, as the worker
/// receives it: right-aligned decimal offsets, one candidate per line.
const STRINGS_STDOUT: &str = "\
     77 !This program cannot be run in DOS mode.\n\
    296 .text\n\
   1362 GetProcAddress\n\
   1380 LoadLibraryA\n\
   2217 kernel32.dll\n\
   4096 eeeeeeeeeeeeeeeeeee\n\
   5120 !!!!!!!!!!####\n";

#[test]
fn strings_pipeline_gates_on_readability() {
    let ToolOutput::Strings {
        values,
        scores,
        offsets,
    } = parse_strings(STRINGS_STDOUT, SHR_CUTOFF)
    else {
        panic!("expected strings output");
    };

    // The run of 'e's and the punctuation noise fail the gate.
    assert_eq!(
        values,
        vec![
            "!This program cannot be run in DOS mode.",
            ".text",
            "GetProcAddress",
            "LoadLibraryA",
            "kernel32.dll"
        ]
    );
    assert_eq!(offsets, vec![77, 296, 1362, 1380, 2217]);
    assert_eq!(values.len(), scores.len());
    for (value, score) in values.iter().zip(&scores) {
        assert_eq!(*score, readability_score(value));
        assert!(*score > SHR_CUTOFF);
    }
}

#[test]
fn exiftool_fixture_decodes_to_flat_pairs() {
    let spec = ToolSpec::parse("exiftool,-S,-j,-P").unwrap();
    let stdout = r#"[{
        "SourceFile": "/malware/extracted/batch-0042/sample.exe",
        "FileType": "Win32 EXE",
        "FileTypeExtension": "exe",
        "MIMEType": "application/octet-stream",
        "MachineType": 332,
        "TimeStamp": "2019:07:23 11:08:41+02:00",
        "PEType": 267
    }]"#;

    let ToolOutput::Exif(pairs) = parse_output(&spec, stdout, SHR_CUTOFF).unwrap() else {
        panic!("expected exif output");
    };
    assert_eq!(pairs.len(), 7);
    assert!(pairs.contains(&("MachineType".into(), "332".into())));
    assert!(pairs.contains(&("FileType".into(), "Win32 EXE".into())));
}

#[test]
fn default_toolchain_is_fully_typed() {
    let chain = parse_toolchain(DEFAULT_TOOLCHAIN).unwrap();
    let kinds: Vec<ToolKind> = chain.iter().map(|spec| spec.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ToolKind::Exiftool,
            ToolKind::Strings,
            ToolKind::Strings,
            ToolKind::Diec,
            ToolKind::Diec,
            ToolKind::Tlsh,
            ToolKind::Ssdeep
        ]
    );
}

#[test]
fn balancer_keeps_bins_within_the_largest_file() {
    let files: Vec<(PathBuf, u64)> = [100u64, 100, 90, 10, 10, 10]
        .iter()
        .enumerate()
        .map(|(i, size)| (PathBuf::from(format!("sample{i}")), *size))
        .collect();

    let chunks = lpt_partition(files.clone(), 2);
    assert_eq!(chunks.len(), 2);

    let totals: Vec<u64> = chunks
        .iter()
        .map(|chunk| {
            chunk
                .iter()
                .map(|path| files.iter().find(|(p, _)| p == path).unwrap().1)
                .sum()
        })
        .collect();
    let spread = totals.iter().max().unwrap() - totals.iter().min().unwrap();
    assert!(spread <= 100, "bin totals {totals:?} spread too far");
    assert_eq!(totals.iter().sum::<u64>(), 320);
}

#[test]
fn scorer_and_gate_are_stable_across_calls() {
    for _ in 0..3 {
        assert!(readability_score("Hello, world!") > SHR_CUTOFF);
        assert!(readability_score("eeeeeeeeeeee") <= SHR_CUTOFF);
        assert_eq!(readability_score(""), 0);
    }
}
