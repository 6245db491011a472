use std::process::Command;

use camino::Utf8Path;
use tracing::{debug, info};

use crate::{HopError, Result, ValidationError};

/// How a repository declares its test suite. Any of these makes the
/// gate mandatory; none of them downgrades it to a warning.
pub(crate) fn test_runner_configured(root: &Utf8Path) -> bool {
    if root.join("pytest.ini").is_file() || root.join("tests").is_dir() {
        return true;
    }
    let pyproject = root.join("pyproject.toml");
    if let Ok(content) = fs_err::read_to_string(pyproject) {
        if content.contains("[tool.pytest") {
            return true;
        }
    }
    false
}

/// Run the test suite from the project root. Non-zero exit aborts the
/// calling operation with the tail of the output.
pub(crate) fn run_tests(root: &Utf8Path) -> Result<()> {
    info!("running test suite in {root}");
    let output = Command::new("python3")
        .args(["-m", "pytest"])
        .current_dir(root)
        .output()
        .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot spawn test runner: {e}")))?;
    if output.status.success() {
        debug!("test suite passed");
        return Ok(());
    }
    let exit_code = output.status.code().unwrap_or(-1);
    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Err(ValidationError::TestsFailed {
        exit_code,
        tail: tail_lines(&combined, 30),
    }
    .into())
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
