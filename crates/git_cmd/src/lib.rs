//! Typed operations over a local git working copy and its `origin`
//! remote.
//!
//! Every method shells out to the `git` binary with the working copy as
//! current directory. Output is captured, commands are logged at debug
//! level, and failures are classified into [`GitError`] kinds so callers
//! can react to the case they care about (missing branch, rejected push,
//! unreachable remote) instead of parsing stderr themselves.

mod error;
#[cfg(feature = "test_fixture")]
pub mod test_fixture;

pub use error::GitError;

use std::process::{Command, Output};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, trace, warn};

/// Outcome of pushing a ref that may be refused by the remote without
/// the push being an error of ours (somebody else won the race).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote accepted the ref. It is now visible to everyone.
    Accepted,
    /// The remote already had a conflicting ref.
    Rejected,
}

/// A git working copy with an `origin` remote.
#[derive(Debug)]
pub struct Repo {
    directory: Utf8PathBuf,
}

impl Repo {
    /// Open the working copy at `directory`.
    pub fn new(directory: impl Into<Utf8PathBuf>) -> Result<Self, GitError> {
        let repo = Self {
            directory: directory.into(),
        };
        // `rev-parse` fails fast when the directory is not a work tree.
        repo.git(&["rev-parse", "--is-inside-work-tree"])?;
        Ok(repo)
    }

    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// Run git with the given arguments and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(error::classify(args, &output))
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        debug!("git {}", args.join(" "));
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.directory)
            .args(args)
            .output()?;
        trace!(
            "git {:?}: status {}, stderr: {}",
            args,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(output)
    }

    pub fn current_branch(&self) -> Result<String, GitError> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Fail with [`GitError::NotOnBranch`] unless HEAD is on `expected`.
    pub fn expect_branch(&self, expected: &str) -> Result<(), GitError> {
        let actual = self.current_branch()?;
        if actual == expected {
            Ok(())
        } else {
            Err(GitError::NotOnBranch {
                expected: expected.to_string(),
                actual,
            })
        }
    }

    pub fn current_commit_hash(&self) -> Result<String, GitError> {
        self.git(&["rev-parse", "HEAD"])
    }

    /// Paths with uncommitted changes, untracked files included.
    pub fn changed_files(&self) -> Result<Vec<String>, GitError> {
        // not routed through `git()`: trimming would eat the leading
        // space of the first ` M path` line
        let args = &["status", "--porcelain"];
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(error::classify(args, &output));
        }
        let status = String::from_utf8_lossy(&output.stdout);
        Ok(status
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| line[3..].trim().to_string())
            .collect())
    }

    pub fn is_clean(&self) -> Result<bool, GitError> {
        Ok(self.changed_files()?.is_empty())
    }

    /// Fail with [`GitError::DirtyWorktree`] if anything is modified or
    /// untracked.
    pub fn require_clean(&self) -> Result<(), GitError> {
        let changes = self.changed_files()?;
        if changes.is_empty() {
            Ok(())
        } else {
            Err(GitError::DirtyWorktree { changes })
        }
    }

    /// Fetch from origin, pruning branches and tags deleted remotely.
    pub fn fetch(&self) -> Result<(), GitError> {
        self.git(&["fetch", "--prune", "--prune-tags", "--tags", "origin"])?;
        Ok(())
    }

    /// Whether the local `branch` points at the same commit as
    /// `origin/<branch>`.
    pub fn is_synced_with(&self, branch: &str) -> Result<bool, GitError> {
        let local = self.git(&["rev-parse", &format!("refs/heads/{branch}")])?;
        let remote = self.git(&["rev-parse", &format!("refs/remotes/origin/{branch}")])?;
        Ok(local == remote)
    }

    /// Whether `ancestor` is reachable from `descendant`.
    pub fn is_ancestor_of(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let output = self.run(&["merge-base", "--is-ancestor", ancestor, descendant])?;
        Ok(output.status.success())
    }

    pub fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.git(&["checkout", branch]).map_err(|e| match e {
            GitError::CommandFailed { stderr, .. }
                if stderr.contains("did not match any") || stderr.contains("pathspec") =>
            {
                GitError::BranchMissing(branch.to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    pub fn create_branch(&self, name: &str, from: &str) -> Result<(), GitError> {
        self.git(&["branch", name, from]).map_err(|e| match e {
            GitError::CommandFailed { stderr, .. } if stderr.contains("already exists") => {
                GitError::BranchExists(name.to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let output = self.run(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{name}")])?;
        Ok(output.status.success())
    }

    pub fn remote_branch_exists(&self, name: &str) -> Result<bool, GitError> {
        Ok(self
            .list_remote_branches(name)?
            .iter()
            .any(|branch| branch == name))
    }

    /// Branch names on origin starting with `prefix`.
    pub fn list_remote_branches(&self, prefix: &str) -> Result<Vec<String>, GitError> {
        let pattern = format!("refs/heads/{prefix}*");
        let out = self.git(&["ls-remote", "--heads", "origin", &pattern])?;
        Ok(out
            .lines()
            .filter_map(|line| line.split('\t').nth(1))
            .filter_map(|r| r.strip_prefix("refs/heads/"))
            .map(ToString::to_string)
            .collect())
    }

    pub fn delete_branch(&self, name: &str, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        self.git(&["branch", flag, name]).map_err(|e| match e {
            GitError::CommandFailed { stderr, .. } if stderr.contains("not found") => {
                GitError::BranchMissing(name.to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    pub fn delete_remote_branch(&self, name: &str) -> Result<(), GitError> {
        self.git(&["push", "origin", &format!(":refs/heads/{name}")])?;
        Ok(())
    }

    /// Merge `branch` into the current branch with a merge commit.
    ///
    /// On conflict the merge is aborted, leaving the working copy as it
    /// was before the call.
    pub fn merge_no_ff(&self, branch: &str, message: &str) -> Result<(), GitError> {
        let args = &["merge", "--no-ff", "-m", message, branch];
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(());
        }
        // conflict markers land on stdout, not stderr
        let detail = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout).trim(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        if detail.to_lowercase().contains("conflict") {
            if let Err(e) = self.git(&["merge", "--abort"]) {
                warn!("failed to abort conflicted merge: {e}");
            }
            Err(GitError::MergeConflict {
                branch: branch.to_string(),
                stderr: detail.trim().to_string(),
            })
        } else {
            Err(error::classify(args, &output))
        }
    }

    /// Fast-forward the current branch to `to`. Fails when histories
    /// have diverged.
    pub fn merge_ff_only(&self, to: &str) -> Result<(), GitError> {
        self.git(&["merge", "--ff-only", to])?;
        Ok(())
    }

    /// Local tag names matching the glob `pattern` (all tags when empty).
    pub fn list_tags(&self, pattern: &str) -> Result<Vec<String>, GitError> {
        let out = if pattern.is_empty() {
            self.git(&["tag", "-l"])?
        } else {
            self.git(&["tag", "-l", pattern])?
        };
        Ok(out.lines().map(ToString::to_string).collect())
    }

    pub fn tag_exists(&self, name: &str) -> Result<bool, GitError> {
        let output = self.run(&["rev-parse", "--verify", "--quiet", &format!("refs/tags/{name}")])?;
        Ok(output.status.success())
    }

    /// Create a tag on `reference` (HEAD by default). Annotated when a
    /// message is given, lightweight otherwise.
    pub fn create_tag(
        &self,
        name: &str,
        reference: Option<&str>,
        message: Option<&str>,
    ) -> Result<(), GitError> {
        let reference = reference.unwrap_or("HEAD");
        let result = match message {
            Some(message) => self.git(&["tag", "-a", name, "-m", message, reference]),
            None => self.git(&["tag", name, reference]),
        };
        result.map_err(|e| match e {
            GitError::CommandFailed { stderr, .. } if stderr.contains("already exists") => {
                GitError::TagExists(name.to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    /// Push a tag to origin.
    ///
    /// This is the atomic coordination primitive: the remote either
    /// accepts the ref, making it visible to every other clone, or
    /// rejects it because somebody else pushed the same name first.
    /// Transport failures are reported as [`GitError::RemoteUnavailable`],
    /// never as [`PushOutcome::Rejected`].
    pub fn push_tag(&self, name: &str) -> Result<PushOutcome, GitError> {
        let refspec = format!("refs/tags/{name}:refs/tags/{name}");
        match self.git(&["push", "origin", &refspec]) {
            Ok(_) => Ok(PushOutcome::Accepted),
            Err(GitError::PushRejected(_)) => Ok(PushOutcome::Rejected),
            Err(other) => Err(other),
        }
    }

    pub fn delete_tag(&self, name: &str) -> Result<(), GitError> {
        self.git(&["tag", "-d", name]).map_err(|e| match e {
            GitError::CommandFailed { stderr, .. } if stderr.contains("not found") => {
                GitError::TagMissing(name.to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    pub fn delete_remote_tag(&self, name: &str) -> Result<(), GitError> {
        self.git(&["push", "origin", &format!(":refs/tags/{name}")])?;
        Ok(())
    }

    pub fn add(&self, paths: &[&str]) -> Result<(), GitError> {
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.git(&args)?;
        Ok(())
    }

    pub fn add_all(&self) -> Result<(), GitError> {
        self.git(&["add", "-A"])?;
        Ok(())
    }

    pub fn rm(&self, path: &str) -> Result<(), GitError> {
        self.git(&["rm", "-q", "-r", "--", path])?;
        Ok(())
    }

    /// Stage a rename so the file keeps its history.
    pub fn mv(&self, src: &str, dst: &str) -> Result<(), GitError> {
        self.git(&["mv", src, dst])?;
        Ok(())
    }

    pub fn commit(&self, message: &str) -> Result<(), GitError> {
        self.git(&["commit", "-m", message])?;
        Ok(())
    }

    pub fn add_all_and_commit(&self, message: &str) -> Result<(), GitError> {
        self.add_all()?;
        self.commit(message)
    }

    /// Commit with no content change. Used for structured notification
    /// messages other clones can observe.
    pub fn commit_empty(&self, message: &str) -> Result<(), GitError> {
        self.git(&["commit", "--allow-empty", "-m", message])?;
        Ok(())
    }

    pub fn reset_hard(&self, reference: &str) -> Result<(), GitError> {
        self.git(&["reset", "--hard", reference])?;
        Ok(())
    }

    /// Push the current branch to origin, setting the upstream.
    pub fn push(&self) -> Result<(), GitError> {
        let branch = self.current_branch()?;
        self.push_branch(&branch)
    }

    pub fn push_branch(&self, name: &str) -> Result<(), GitError> {
        self.git(&["push", "-u", "origin", name])?;
        Ok(())
    }

    /// Push with bounded retry, backing off exponentially. Transient
    /// transport failures are retried; rejections are not, the remote
    /// has made up its mind.
    pub fn push_branch_with_retry(&self, name: &str, attempts: u32) -> Result<(), GitError> {
        let mut backoff = Duration::from_millis(500);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.push_branch(name) {
                Ok(()) => return Ok(()),
                Err(e @ GitError::PushRejected(_)) => return Err(e),
                Err(e) => {
                    warn!("push of `{name}` failed (attempt {attempt}/{attempts}): {e}");
                    last_err = Some(e);
                    if attempt < attempts {
                        std::thread::sleep(backoff);
                        backoff *= 2;
                    }
                }
            }
        }
        Err(last_err.expect("attempts is at least 1"))
    }

    /// Contents of `path` as committed on `reference`, without touching
    /// the working copy. [`None`] when the file does not exist there.
    pub fn show(&self, reference: &str, path: &str) -> Result<Option<String>, GitError> {
        let spec = format!("{reference}:{path}");
        let output = self.run(&["show", &spec])?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("does not exist")
                || stderr.contains("exists on disk, but not in")
                || stderr.contains("Invalid object name")
                || stderr.contains("invalid object name")
            {
                Ok(None)
            } else {
                Err(error::classify(&["show", &spec], &output))
            }
        }
    }

    /// Subject lines of the commits in `range` (e.g. `main..topic`).
    pub fn log_subjects(&self, range: &str) -> Result<Vec<String>, GitError> {
        let out = self.git(&["log", "--format=%s", range])?;
        Ok(out
            .lines()
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }
}
