use std::process::Output;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("worktree has uncommitted changes:\n  {}", changes.join("\n  "))]
    DirtyWorktree { changes: Vec<String> },
    #[error("branch `{0}` does not exist")]
    BranchMissing(String),
    #[error("branch `{0}` already exists")]
    BranchExists(String),
    #[error("merging `{branch}` produced conflicts; the merge was aborted:\n{stderr}")]
    MergeConflict { branch: String, stderr: String },
    #[error("cannot reach the remote: {0}")]
    RemoteUnavailable(String),
    #[error("the remote rejected the push: {0}")]
    PushRejected(String),
    #[error("tag `{0}` already exists")]
    TagExists(String),
    #[error("tag `{0}` does not exist")]
    TagMissing(String),
    #[error("expected to be on branch `{expected}`, but HEAD is on `{actual}`")]
    NotOnBranch { expected: String, actual: String },
    #[error("git {} failed: {stderr}", args.join(" "))]
    CommandFailed { args: Vec<String>, stderr: String },
    #[error("failed to spawn git: {0}")]
    Io(#[from] std::io::Error),
}

/// Classify a failed git invocation from its stderr.
///
/// Only the transport-level cases are recognised here; callers refine
/// the generic [`GitError::CommandFailed`] into branch/tag kinds where
/// they know which ref they were touching.
pub(crate) fn classify(args: &[&str], output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let lower = stderr.to_lowercase();
    if lower.contains("could not read from remote")
        || lower.contains("unable to access")
        || lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
    {
        GitError::RemoteUnavailable(stderr)
    } else if lower.contains("[rejected]")
        || lower.contains("[remote rejected]")
        || lower.contains("failed to push some refs")
        || lower.contains("stale info")
    {
        GitError::PushRejected(stderr)
    } else {
        GitError::CommandFailed {
            args: args.iter().map(ToString::to_string).collect(),
            stderr,
        }
    }
}
