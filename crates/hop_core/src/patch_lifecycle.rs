use semver::Version;
use tracing::{debug, info, warn};

use crate::{
    Database, LockScope, LockService, Manifest, ManifestStore, Operation, OperationReport,
    PATCHES_DIR, PatchId, PatchState, PatchStore, PreconditionError, RELEASE_BRANCH_PREFIX, Repo,
    Result, SchemaGenerator, ValidationError, applier, test_gate,
};

/// Creation, application and integration of patches.
#[derive(Debug)]
pub struct PatchLifecycle<'a> {
    repo: &'a Repo,
    db: &'a dyn Database,
    generator: &'a dyn SchemaGenerator,
}

impl<'a> PatchLifecycle<'a> {
    pub fn new(repo: &'a Repo, db: &'a dyn Database, generator: &'a dyn SchemaGenerator) -> Self {
        Self {
            repo,
            db,
            generator,
        }
    }

    fn manifests(&self) -> ManifestStore {
        ManifestStore::new(self.repo.releases_dir())
    }

    fn patches(&self) -> PatchStore {
        PatchStore::new(self.repo.patches_dir())
    }

    /// The release version encoded in the current branch name.
    fn current_release_version(&self) -> Result<(String, Version)> {
        let branch = self.repo.git().current_branch()?;
        let version = branch
            .strip_prefix(RELEASE_BRANCH_PREFIX)
            .and_then(|v| release_name::parse_version(v).ok())
            .ok_or_else(|| PreconditionError::WrongBranch {
                expected: format!("{RELEASE_BRANCH_PREFIX}X.Y.Z"),
                actual: branch.clone(),
            })?;
        Ok((branch, version))
    }

    /// The patch id encoded in the current branch name.
    fn current_patch_id(&self) -> Result<PatchId> {
        let branch = self.repo.git().current_branch()?;
        PatchId::from_branch_name(&branch).ok_or_else(|| {
            PreconditionError::WrongBranch {
                expected: "ho-patch/<id>".to_string(),
                actual: branch,
            }
            .into()
        })
    }

    /// Open a new patch: branch, directory, global id reservation.
    ///
    /// The reservation tag push is the point of no return. Every step
    /// before it rolls back to a pristine clone on failure; every step
    /// after it downgrades to a warning, because the id is allocated
    /// and the work can be pushed by hand.
    pub fn create_patch(&self, raw_id: &str) -> Result<OperationReport> {
        self.repo.require_devel()?;
        let id = PatchId::parse(raw_id)?;
        let git = self.repo.git();
        let (release_branch, version) = self.current_release_version()?;
        git.require_clean()?;
        git.fetch()?;
        if !git.is_synced_with(&release_branch)? {
            return Err(PreconditionError::OutOfSync {
                branch: release_branch,
            }
            .into());
        }

        let store = self.patches();
        if store.exists(&id) {
            return Err(PreconditionError::PatchExists(id).into());
        }
        let patch_branch = id.branch_name();
        if git.branch_exists(&patch_branch)? || git.remote_branch_exists(&patch_branch)? {
            return Err(PreconditionError::BranchExists(patch_branch).into());
        }
        if let Some(manifest) = crate::remote::find_patch(git, &id)? {
            return Err(PreconditionError::DuplicateManifestEntry {
                id,
                version: manifest.version().clone(),
            }
            .into());
        }

        let mut report = OperationReport::new(Operation::CreatePatch);
        report.identifier(id.as_str());

        git.create_branch(&patch_branch, &release_branch)?;
        git.checkout(&patch_branch)?;

        let reserved = (|| -> Result<()> {
            store.create(&id)?;
            git.add(&[&format!("{PATCHES_DIR}/{id}")])?;
            git.commit(&format!("Add Patches/{id} directory"))?;
            LockService::new(git).reserve_patch(&id)
        })();
        if let Err(e) = reserved {
            // nothing reached the remote: wipe every local trace
            debug!("create_patch rolling back: {e}");
            let _ = git.git(&["checkout", "-f", &release_branch]);
            let _ = fs_err::remove_dir_all(store.dir(&id));
            let _ = git.delete_branch(&patch_branch, true);
            return Err(e);
        }
        report.tags_pushed.push(id.tag_name());

        if let Err(e) = git.push_branch_with_retry(&patch_branch, 3) {
            report.warnings.push(format!(
                "the id is reserved but `{patch_branch}` could not be pushed: {e}; push it manually"
            ));
        }

        // record the candidate on the release branch; the reservation
        // stands whatever happens here
        if let Err(e) = self.record_candidate(&release_branch, &version, &id) {
            let _ = git.reset_hard(&format!("origin/{release_branch}"));
            report.warnings.push(format!(
                "could not record `{id}` in the {version} manifest: {e}; add it manually"
            ));
        }

        git.checkout(&patch_branch)?;
        info!("created patch {id} for release {version}");
        Ok(report)
    }

    fn record_candidate(
        &self,
        release_branch: &str,
        version: &Version,
        id: &PatchId,
    ) -> Result<()> {
        let git = self.repo.git();
        git.checkout(release_branch)?;
        let manifests = self.manifests();
        let mut manifest = manifests.load_manifest(version)?;
        manifest.add_candidate(id, None)?;
        let path = manifests.save(&manifest)?;
        git.add(&[self.repo.relative(&path)])?;
        git.commit(&format!("Add {id} to the {version} manifest"))?;
        git.push_branch(release_branch)?;
        Ok(())
    }

    /// Replay the release context plus the current patch against a
    /// database reset to the production schema, then regenerate model
    /// sources.
    pub fn apply_patch(&self) -> Result<OperationReport> {
        self.repo.require_devel()?;
        let id = self.current_patch_id()?;
        let store = self.patches();
        store.validate(&id)?;

        let schema = self.repo.schema_link();
        if std::fs::symlink_metadata(&schema).is_err() {
            return Err(PreconditionError::MissingSchema(schema).into());
        }

        let entries = self.release_context(&id)?;
        let sequence = applier::compute_sequence(&entries, &id);
        info!("applying {} patch(es) onto a pristine schema", sequence.len());
        let outcome =
            applier::apply_patches(self.repo, self.db, self.generator, &schema, &sequence)?;

        let mut report = OperationReport::new(Operation::ApplyPatch);
        report.identifier(id.as_str());
        for applied in &outcome.applied {
            report.identifier(applied.as_str());
        }
        Ok(report)
    }

    /// The manifest entries governing the apply order for `id`: the
    /// remote manifest listing the patch, falling back to the working
    /// tree when the remote is silent about it (the candidate row is
    /// recorded in a separate step that may have failed).
    fn release_context(&self, id: &PatchId) -> Result<Vec<(PatchId, PatchState)>> {
        if let Some(manifest) = crate::remote::find_patch(self.repo.git(), id)? {
            return Ok(manifest.entries());
        }
        let fallback = self.manifests().dev_manifests()?.into_iter().next_back();
        match fallback {
            Some(manifest) => {
                warn!(
                    "patch {id} is not listed in any manifest; applying against release {}",
                    manifest.version()
                );
                Ok(manifest.entries())
            }
            None => Err(PreconditionError::NoDevelopmentRelease.into()),
        }
    }

    /// Integrate the current patch into its release branch, behind the
    /// validation gate: merge on an ephemeral branch, prove the patch
    /// idempotent against a pristine schema, run the test suite, and
    /// only then fast-forward the release branch.
    pub fn merge_patch(&self) -> Result<OperationReport> {
        self.repo.require_devel()?;
        let git = self.repo.git();
        let id = self.current_patch_id()?;
        git.require_clean()?;
        git.fetch()?;

        let Some(manifest) = crate::remote::find_patch(git, &id)? else {
            return Err(PreconditionError::NotInManifest { id }.into());
        };
        if manifest.state_of(&id) == Some(PatchState::Staged) {
            return Err(PreconditionError::AlreadyStaged {
                id,
                version: manifest.version().clone(),
            }
            .into());
        }
        let version = manifest.version().clone();
        let release_branch = format!("{RELEASE_BRANCH_PREFIX}{version}");
        crate::branches::sync_local_branch(git, &release_branch)?;

        let lock = LockService::new(git).acquire(&LockScope::Release(version.clone()))?;
        let mut report = OperationReport::new(Operation::MergePatch);
        report.identifier(id.as_str());
        report.lock_tag = Some(lock.tag().to_string());

        let validate_branch = id.validation_branch_name();
        let result = self.validate_and_integrate(
            &id,
            &version,
            &release_branch,
            &validate_branch,
            &manifest,
            &mut report,
        );

        if result.is_err() {
            // leave the clone where the user started, on the patch branch
            let _ = git.git(&["merge", "--abort"]);
            let _ = git.git(&["checkout", "-f", &id.branch_name()]);
        }
        // the ephemeral branch never survives a merge attempt
        if git.branch_exists(&validate_branch).unwrap_or(false) {
            let _ = git.delete_branch(&validate_branch, true);
        }
        lock.release();

        result?;
        info!("merged patch {id} into release {version}");
        Ok(report)
    }

    fn validate_and_integrate(
        &self,
        id: &PatchId,
        version: &Version,
        release_branch: &str,
        validate_branch: &str,
        manifest: &Manifest,
        report: &mut OperationReport,
    ) -> Result<()> {
        let git = self.repo.git();
        let patch_branch = id.branch_name();

        git.create_branch(validate_branch, release_branch)?;
        git.checkout(validate_branch)?;

        // staged patches are normally part of the release branch
        // already; merging their surviving branches is a no-op safety
        // net for interrupted integrations
        for staged in manifest.staged() {
            let branch = staged.branch_name();
            if git.remote_branch_exists(&branch)? {
                debug!("re-merging surviving staged branch {branch}");
                git.merge_no_ff(
                    &format!("origin/{branch}"),
                    &format!("Merge {branch} into {validate_branch}"),
                )?;
            }
        }

        let message = format!(
            "Merge {patch_branch} into {release_branch}\n\nCloses #{}",
            id.issue_number()
        );
        git.merge_no_ff(&patch_branch, &message)?;

        let manifests = self.manifests();
        let mut staged_manifest = manifests.load_manifest(version)?;
        staged_manifest.set_staged(id)?;
        let manifest_path = manifests.save(&staged_manifest)?;
        git.add(&[self.repo.relative(&manifest_path)])?;
        git.commit(&format!("Stage {id} in release {version}"))?;

        // idempotency proof: replaying the declared state must leave
        // the working tree untouched
        let sequence = applier::compute_sequence(&staged_manifest.entries(), id);
        let outcome = applier::apply_patches(
            self.repo,
            self.db,
            self.generator,
            &self.repo.schema_link(),
            &sequence,
        )?;
        let changed = git.changed_files()?;
        if !changed.is_empty() {
            applier::rollback(self.db, &self.repo.schema_link(), &outcome.generated);
            let _ = git.reset_hard("HEAD");
            return Err(ValidationError::IdempotencyViolation { paths: changed }.into());
        }

        if test_gate::test_runner_configured(self.repo.root()) {
            test_gate::run_tests(self.repo.root())?;
        } else {
            report
                .warnings
                .push("no test runner configured; the test gate was skipped".to_string());
        }

        // atomic commit point: from here on the integration is real
        git.checkout(release_branch)?;
        git.merge_ff_only(validate_branch)?;
        git.push_branch(release_branch)?;

        git.delete_remote_branch(&patch_branch)?;
        git.delete_branch(&patch_branch, true)?;
        report.branches_deleted.push(patch_branch.clone());
        git.delete_branch(validate_branch, true)?;

        let note = format!(
            "[notify] merge_patch: integrated {patch_branch} into {release_branch}; \
             update candidate branches with `git merge {release_branch}`"
        );
        git.commit_empty(&note)?;
        git.push_branch(release_branch)?;
        report.notifications_emitted.push(note);
        Ok(())
    }
}
