use camino::Utf8PathBuf;
use semver::Version;

use crate::PatchId;

/// Exit-code classes of the CLI collaborator contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    Precondition,
    Coordination,
    Validation,
    Environment,
    Internal,
}

impl ExitClass {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Precondition => 1,
            Self::Coordination => 2,
            Self::Validation => 3,
            Self::Environment => 4,
            Self::Internal => 5,
        }
    }
}

/// Top-level error of every operation. Each variant maps to one
/// [`ExitClass`]; the message carries the remediation hint.
#[derive(Debug, thiserror::Error)]
pub enum HopError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl HopError {
    pub fn exit_class(&self) -> ExitClass {
        match self {
            Self::Precondition(_) | Self::Invariant(_) => ExitClass::Precondition,
            Self::Coordination(_) => ExitClass::Coordination,
            Self::Validation(_) => ExitClass::Validation,
            Self::Environment(_) => ExitClass::Environment,
            Self::Internal(_) => ExitClass::Internal,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("not inside a hop repository (no `.hop/config` found)")]
    OutsideRepo,
    #[error("this clone tracks production only (`devel = false`); re-clone with development enabled to modify releases")]
    DevelDisabled,
    #[error("expected to be on branch `{expected}`, but HEAD is on `{actual}`")]
    WrongBranch { expected: String, actual: String },
    #[error("worktree has uncommitted changes; commit or stash them first:\n  {}", changes.join("\n  "))]
    DirtyWorktree { changes: Vec<String> },
    #[error("branch `{branch}` is not in sync with origin; run `git pull` first")]
    OutOfSync { branch: String },
    #[error("`{0}` is missing")]
    MissingDirectory(Utf8PathBuf),
    #[error("no schema snapshot at `{0}`; deploy or create a release first")]
    MissingSchema(Utf8PathBuf),
    #[error("malformed patch id `{0}`: expected `<issue-number>[-<slug>]`")]
    MalformedPatchId(String),
    #[error("patch `{0}` already exists")]
    PatchExists(PatchId),
    #[error("patch `{0}` has no executable file (`.sql` or `.py`)")]
    EmptyPatch(PatchId),
    #[error("branch `{0}` already exists")]
    BranchExists(String),
    #[error("branch `{0}` does not exist")]
    MissingBranch(String),
    #[error("version `{0}` has no release")]
    UnknownVersion(Version),
    #[error("release `{0}` already exists")]
    ReleaseExists(Version),
    #[error("patch `{id}` is already listed in the {version} manifest")]
    DuplicateManifestEntry { id: PatchId, version: Version },
    #[error("patch `{id}` is not listed in the {version} manifest")]
    UnknownManifestEntry { id: PatchId, version: Version },
    #[error("patch `{id}` is not listed in any release manifest")]
    NotInManifest { id: PatchId },
    #[error("patch `{id}` is already staged in release {version}")]
    AlreadyStaged { id: PatchId, version: Version },
    #[error("no release candidate to promote; run `promote-rc` first")]
    NoActiveRc,
    #[error("no release under development")]
    NoDevelopmentRelease,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("patch id `{id}` is already reserved on the remote (tag `patch-id/{id}`)")]
    ReservedElsewhere { id: PatchId },
    #[error("another operation holds the lock `{tag}` (age {age_secs}s); retry later or wait for it to go stale")]
    Busy { tag: String, age_secs: u64 },
    #[error("the remote rejected the push: {0}")]
    PushRejected(String),
    #[error("cannot reach the remote: {0}")]
    RemoteUnavailable(String),
    #[error("branch `{branch}` has diverged from origin; reconcile it manually before retrying")]
    Diverged { branch: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("patch `{patch}` failed while applying `{file}`: {detail}")]
    ApplyFailed {
        patch: PatchId,
        file: Utf8PathBuf,
        detail: String,
    },
    #[error("patch is not idempotent with the declared state; re-applying changed:\n  {}", paths.join("\n  "))]
    IdempotencyViolation { paths: Vec<String> },
    #[error("test suite failed with exit code {exit_code}:\n{tail}")]
    TestsFailed { exit_code: i32, tail: String },
    #[error("merging `{branch}` produced conflicts:\n{detail}")]
    MergeConflict { branch: String, detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("database unreachable: {0}")]
    DbUnreachable(String),
    #[error("database permission denied: {0}")]
    PermissionDenied(String),
    #[error("database authentication failed: {0}")]
    AuthFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InvariantError {
    #[error("release {attempted} cannot be promoted yet: promote {must_first} first")]
    SequentialityViolated {
        attempted: Version,
        must_first: Version,
    },
    #[error("release {version} has an open candidate; promote it to production before starting another")]
    ActiveRcExists { version: Version },
    #[error("hotfixes target the production release ({production}), not {version}")]
    HotfixTargetsNonProduction {
        version: Version,
        production: Version,
    },
    #[error("cannot classify release file `{0}`")]
    UnknownPhase(String),
}

impl From<git_cmd::GitError> for HopError {
    fn from(e: git_cmd::GitError) -> Self {
        use git_cmd::GitError;
        match e {
            GitError::DirtyWorktree { changes } => {
                PreconditionError::DirtyWorktree { changes }.into()
            }
            GitError::BranchMissing(name) => PreconditionError::MissingBranch(name).into(),
            GitError::BranchExists(name) => PreconditionError::BranchExists(name).into(),
            GitError::NotOnBranch { expected, actual } => {
                PreconditionError::WrongBranch { expected, actual }.into()
            }
            GitError::MergeConflict { branch, stderr } => ValidationError::MergeConflict {
                branch,
                detail: stderr,
            }
            .into(),
            GitError::RemoteUnavailable(detail) => {
                CoordinationError::RemoteUnavailable(detail).into()
            }
            GitError::PushRejected(detail) => CoordinationError::PushRejected(detail).into(),
            // tag faults mean a protocol step ran out of order
            e @ (GitError::TagExists(_)
            | GitError::TagMissing(_)
            | GitError::CommandFailed { .. }
            | GitError::Io(_)) => Self::Internal(e.into()),
        }
    }
}

impl From<psql_cmd::PgError> for HopError {
    fn from(e: psql_cmd::PgError) -> Self {
        use psql_cmd::PgError;
        match e {
            PgError::Unreachable(detail) => EnvironmentError::DbUnreachable(detail).into(),
            PgError::AuthFailed(detail) => EnvironmentError::AuthFailed(detail).into(),
            PgError::PermissionDenied(detail) => EnvironmentError::PermissionDenied(detail).into(),
            // bare SQL failures outside a patch application are driver bugs
            e @ (PgError::Sql { .. } | PgError::Io(_)) => Self::Internal(e.into()),
        }
    }
}

impl From<release_name::NameError> for HopError {
    fn from(e: release_name::NameError) -> Self {
        Self::Internal(e.into())
    }
}
