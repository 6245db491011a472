use std::fmt;
use std::time::Duration;

use release_name::ReleaseFile;
use semver::Version;

use crate::{PatchId, PatchState};

/// The user-facing operations, as the CLI collaborator names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    NewRelease,
    CreatePatch,
    ApplyPatch,
    MergePatch,
    PromoteRc,
    PromoteProd,
    HotfixOpen,
    PromoteHotfix,
    Deploy,
    Status,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NewRelease => "new-release",
            Self::CreatePatch => "create-patch",
            Self::ApplyPatch => "apply-patch",
            Self::MergePatch => "merge-patch",
            Self::PromoteRc => "promote-rc",
            Self::PromoteProd => "promote-prod",
            Self::HotfixOpen => "hotfix-open",
            Self::PromoteHotfix => "promote-hotfix",
            Self::Deploy => "deploy",
            Self::Status => "status",
        };
        f.write_str(name)
    }
}

/// Structured result of a successful operation.
#[derive(Debug)]
pub struct OperationReport {
    pub operation: Operation,
    /// What the operation touched: patch ids, versions, snapshot files.
    pub identifiers: Vec<String>,
    pub tags_pushed: Vec<String>,
    pub branches_deleted: Vec<String>,
    pub notifications_emitted: Vec<String>,
    /// The mutex tag held while the operation ran, if any.
    pub lock_tag: Option<String>,
    /// Non-fatal problems the user should act on.
    pub warnings: Vec<String>,
}

impl OperationReport {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            identifiers: vec![],
            tags_pushed: vec![],
            branches_deleted: vec![],
            notifications_emitted: vec![],
            lock_tag: None,
            warnings: vec![],
        }
    }

    pub fn identifier(&mut self, id: impl Into<String>) -> &mut Self {
        self.identifiers.push(id.into());
        self
    }
}

/// Where the working copy stands, which gates the operations the CLI
/// offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Not inside a hop repository.
    Outside,
    /// Inside a repository with uncommitted changes: look, don't touch.
    Dirty,
    /// Development clone, positioned on `ho-prod` or a release branch.
    DevProd,
    /// Development clone, positioned on a patch branch.
    DevDev,
    /// Production-only clone (`devel = false`).
    SyncOnly,
}

impl Context {
    /// The operation table computed at startup: what each context
    /// allows.
    pub fn allowed_operations(self) -> &'static [Operation] {
        match self {
            Self::Outside => &[],
            Self::Dirty => &[Operation::Status],
            Self::DevProd => &[
                Operation::NewRelease,
                Operation::CreatePatch,
                Operation::PromoteRc,
                Operation::PromoteProd,
                Operation::HotfixOpen,
                Operation::PromoteHotfix,
                Operation::Deploy,
                Operation::Status,
            ],
            Self::DevDev => &[
                Operation::ApplyPatch,
                Operation::MergePatch,
                Operation::Status,
            ],
            Self::SyncOnly => &[Operation::Deploy, Operation::Status],
        }
    }
}

/// Everything `status` reports about the repository and its releases.
#[derive(Debug)]
pub struct StatusReport {
    pub context: Context,
    /// Current production (or hotfix) release per the working copy.
    pub production: Option<ReleaseFile>,
    /// The release candidate awaiting production promotion, if any.
    pub active_rc: Option<ReleaseFile>,
    pub releases: Vec<ReleaseStatus>,
    /// `Patches/` directories not listed in any manifest.
    pub unlisted_patches: Vec<PatchId>,
    /// Lock tags currently visible, with their age.
    pub observed_locks: Vec<(String, Duration)>,
    /// `[notify]` commits on the release branch not yet merged into the
    /// current patch branch.
    pub pending_notifications: Vec<String>,
}

#[derive(Debug)]
pub struct ReleaseStatus {
    pub version: Version,
    pub hotfix: bool,
    pub entries: Vec<(PatchId, PatchState)>,
}
