//! Core of `hop`: a patch-based, release-oriented workflow for
//! PostgreSQL schema changes, coordinated through a shared git remote.
//!
//! The crate couples three things into one state machine:
//!
//! - git refs (`ho-prod`, `ho-release/X.Y.Z`, `ho-patch/<id>`, tags),
//! - the per-release patch manifest under `.hop/releases/`,
//! - a PostgreSQL database tracked in `half_orm_meta.hop_release`.
//!
//! Entry point is [`Orchestrator`], which wires the drivers together
//! and exposes one method per user-facing operation.

mod applier;
mod backup;
mod branches;
mod config;
mod db;
mod error;
mod generator;
mod lock;
mod manifest;
mod migrate;
mod orchestrator;
mod patch;
mod patch_lifecycle;
mod release_lifecycle;
mod remote;
mod repo;
mod report;
mod test_gate;

pub mod deploy;

pub use applier::compute_sequence;
pub use backup::{BackupStore, DirBackupStore};
pub use config::Config;
pub use db::Database;
pub use deploy::{DeployReport, Deployer};
pub use error::{
    CoordinationError, EnvironmentError, ExitClass, HopError, InvariantError, PreconditionError,
    ValidationError,
};
pub use generator::{NoGenerator, SchemaGenerator};
pub use lock::{LOCK_STALENESS, LockGuard, LockScope, LockService};
pub use manifest::{Manifest, ManifestStore, PatchState, parse_snapshot, render_snapshot};
pub use migrate::{MigrationOutcome, Migrator};
pub use orchestrator::Orchestrator;
pub use patch::{PatchId, PatchStore};
pub use patch_lifecycle::PatchLifecycle;
pub use release_lifecycle::ReleaseLifecycle;
pub use repo::Repo;
pub use report::{Context, Operation, OperationReport, ReleaseStatus, StatusReport};

pub type Result<T> = std::result::Result<T, HopError>;

/// The permanent trunk branch. Commits land on it only through
/// promotions and migrations.
pub const PROD_BRANCH: &str = "ho-prod";
pub const RELEASE_BRANCH_PREFIX: &str = "ho-release/";
pub const PATCH_BRANCH_PREFIX: &str = "ho-patch/";
pub const VALIDATE_BRANCH_PREFIX: &str = "ho-validate/";
/// Prefix of the permanent reservation tags (`patch-id/<id>`).
pub const PATCH_TAG_PREFIX: &str = "patch-id/";
/// Metadata directory at the repository root.
pub const HOP_DIR: &str = ".hop";
/// Patch directories live at the repository root, next to the code.
pub const PATCHES_DIR: &str = "Patches";
