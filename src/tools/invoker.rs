//! External tool execution.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::core::Result;
use crate::tools::ToolSpec;

/// Run one tool against a sample and collect its stdout.
///
/// The sample path is appended as the final argv element. Stderr is
/// discarded and a non-zero exit is not an error; the parsers tolerate
/// empty or partial output. There is no timeout, so a hung child stalls
/// its worker until killed externally.
pub async fn run_tool(spec: &ToolSpec, sample: &Path) -> Result<String> {
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .arg(sample)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    // The child gets an immediate EOF on stdin.
    drop(child.stdin.take());

    let output = child.wait_with_output().await?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
