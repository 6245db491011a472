use release_name::BumpLevel;
use semver::Version;

use crate::{
    BackupStore, Context, Database, DeployReport, Deployer, DirBackupStore, LockService,
    ManifestStore, MigrationOutcome, Migrator, NoGenerator, OperationReport, PATCH_BRANCH_PREFIX,
    PatchId, PatchLifecycle, PatchStore, RELEASE_BRANCH_PREFIX, ReleaseLifecycle, Repo, Result,
    SchemaGenerator, StatusReport, remote, report::ReleaseStatus,
};

/// Wires the drivers together and exposes the stable API the CLI
/// collaborator consumes: one method per user-facing operation, each
/// returning a structured report or a typed error.
///
/// The orchestrator owns the working copy; every lifecycle borrows it
/// for a single operation. Locks and ephemeral branches are released in
/// guaranteed-cleanup sections inside the lifecycles, so an error here
/// never leaks remote state.
#[derive(Debug)]
pub struct Orchestrator {
    repo: Repo,
    db: Box<dyn Database>,
    generator: Box<dyn SchemaGenerator>,
    backups: Box<dyn BackupStore>,
}

impl Orchestrator {
    pub fn new(repo: Repo, db: Box<dyn Database>) -> Self {
        let backups = Box::new(DirBackupStore::new(repo.backups_dir()));
        Self {
            repo,
            db,
            generator: Box::new(NoGenerator),
            backups,
        }
    }

    /// Plug in the ORM's code generator.
    pub fn with_generator(mut self, generator: Box<dyn SchemaGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_backup_store(mut self, backups: Box<dyn BackupStore>) -> Self {
        self.backups = backups;
        self
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    fn patches(&self) -> PatchLifecycle<'_> {
        PatchLifecycle::new(&self.repo, self.db.as_ref(), self.generator.as_ref())
    }

    fn releases(&self) -> ReleaseLifecycle<'_> {
        ReleaseLifecycle::new(&self.repo, self.db.as_ref(), self.generator.as_ref())
    }

    pub fn new_release(&self, level: BumpLevel) -> Result<OperationReport> {
        self.releases().create_release(level)
    }

    pub fn create_patch(&self, id: &str) -> Result<OperationReport> {
        self.patches().create_patch(id)
    }

    pub fn apply_patch(&self) -> Result<OperationReport> {
        self.patches().apply_patch()
    }

    pub fn merge_patch(&self) -> Result<OperationReport> {
        self.patches().merge_patch()
    }

    pub fn promote_rc(&self) -> Result<OperationReport> {
        self.releases().promote_to_rc()
    }

    pub fn promote_prod(&self) -> Result<OperationReport> {
        self.releases().promote_to_prod()
    }

    pub fn hotfix_open(&self, version: &Version) -> Result<OperationReport> {
        self.releases().hotfix_open(version)
    }

    pub fn promote_hotfix(&self) -> Result<OperationReport> {
        self.releases().promote_to_hotfix()
    }

    pub fn deploy(&self, target: &Version) -> Result<DeployReport> {
        Deployer::new(&self.repo, self.db.as_ref(), self.backups.as_ref()).deploy(target)
    }

    pub fn migrate(&mut self) -> Result<Vec<(Version, MigrationOutcome)>> {
        Migrator::new(&mut self.repo).run()
    }

    /// Where the working copy stands; drives the operation table the
    /// CLI offers.
    pub fn context(&self) -> Result<Context> {
        if !self.repo.config().devel {
            return Ok(Context::SyncOnly);
        }
        if !self.repo.git().is_clean()? {
            return Ok(Context::Dirty);
        }
        let branch = self.repo.git().current_branch()?;
        if branch.starts_with(PATCH_BRANCH_PREFIX) {
            Ok(Context::DevDev)
        } else {
            Ok(Context::DevProd)
        }
    }

    /// A consolidated view of the shared state: manifests are read from
    /// origin, so the report is the same whatever branch is checked
    /// out.
    pub fn status(&self) -> Result<StatusReport> {
        let git = self.repo.git();
        git.fetch()?;
        let manifests = ManifestStore::new(self.repo.releases_dir());

        let mut releases = vec![];
        for version in remote::dev_versions(git)? {
            if let Some(manifest) = remote::manifest_on_branch(git, &version)? {
                releases.push(ReleaseStatus {
                    version: manifest.version().clone(),
                    hotfix: manifest.is_hotfix(),
                    entries: manifest.entries(),
                });
            }
        }

        Ok(StatusReport {
            context: self.context()?,
            production: self.repo.current_production()?,
            active_rc: manifests.active_rc()?,
            releases,
            unlisted_patches: self.unlisted_patches()?,
            observed_locks: LockService::new(git).observed_locks()?,
            pending_notifications: self.pending_notifications()?,
        })
    }

    /// `Patches/` directories no manifest references. Usually leftovers
    /// of promoted releases; occasionally a candidate whose manifest
    /// commit failed.
    fn unlisted_patches(&self) -> Result<Vec<PatchId>> {
        let patches_dir = self.repo.patches_dir();
        if !patches_dir.is_dir() {
            return Ok(vec![]);
        }
        let store = PatchStore::new(patches_dir.clone());
        let mut unlisted = vec![];
        for entry in fs_err::read_dir(&patches_dir)
            .map_err(|e| crate::HopError::Internal(e.into()))?
        {
            let entry = entry.map_err(|e| crate::HopError::Internal(e.into()))?;
            let Some(name) = entry.file_name().to_str().map(ToString::to_string) else {
                continue;
            };
            let Ok(id) = PatchId::parse(&name) else {
                continue;
            };
            if store.exists(&id) && remote::find_patch(self.repo.git(), &id)?.is_none() {
                unlisted.push(id);
            }
        }
        unlisted.sort();
        Ok(unlisted)
    }

    /// `[notify]` commits on the release branch the current patch
    /// branch has not merged yet.
    fn pending_notifications(&self) -> Result<Vec<String>> {
        let git = self.repo.git();
        let branch = git.current_branch()?;
        if !branch.starts_with(PATCH_BRANCH_PREFIX) {
            return Ok(vec![]);
        }
        let Some(id) = PatchId::from_branch_name(&branch) else {
            return Ok(vec![]);
        };
        let Some(manifest) = remote::find_patch(git, &id)? else {
            return Ok(vec![]);
        };
        let release_branch = format!("{RELEASE_BRANCH_PREFIX}{}", manifest.version());
        let range = format!("HEAD..origin/{release_branch}");
        let subjects = git.log_subjects(&range)?;
        Ok(subjects
            .into_iter()
            .filter(|subject| subject.starts_with("[notify]"))
            .collect())
    }
}
