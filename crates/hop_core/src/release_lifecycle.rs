use camino::Utf8PathBuf;
use release_name::{BumpLevel, ReleaseFile, ReleasePhase};
use semver::Version;
use tracing::{debug, info, warn};

use crate::{
    Database, HOP_DIR, InvariantError, LockScope, LockService, ManifestStore, Operation,
    OperationReport, PATCH_BRANCH_PREFIX, PROD_BRANCH, PatchId, PreconditionError,
    RELEASE_BRANCH_PREFIX, Repo, Result, SchemaGenerator, applier, branches,
    error::CoordinationError, remote,
};

/// Release creation and promotion: development manifest to RC snapshot,
/// RC to production, hotfix re-entry.
#[derive(Debug)]
pub struct ReleaseLifecycle<'a> {
    repo: &'a Repo,
    db: &'a dyn Database,
    generator: &'a dyn SchemaGenerator,
}

impl<'a> ReleaseLifecycle<'a> {
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

    fn release_branch(version: &Version) -> String {
        format!("{RELEASE_BRANCH_PREFIX}{version}")
    }

    fn dev_versions(&self) -> Result<Vec<Version>> {
        remote::dev_versions(self.repo.git())
    }

    /// Next free number for a `-rcN` / `-hotfixN` marker: files on disk
    /// and promotion tags both count, so deleting a file never recycles
    /// a number.
    fn next_marker_number(&self, version: &Version, hotfix: bool) -> Result<u32> {
        let from_files = self
            .manifests()
            .release_files()?
            .into_iter()
            .filter(|file| &file.version == version)
            .filter_map(|file| match file.phase {
                ReleasePhase::Candidate(n) if !hotfix => Some(n),
                ReleasePhase::Hotfix(n) if hotfix => Some(n),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let pattern = if hotfix {
            format!("release-{version}-hotfix*")
        } else {
            format!("release-rc-{version}-*")
        };
        let from_tags = self
            .repo
            .git()
            .list_tags(&pattern)?
            .into_iter()
            .filter_map(|tag| {
                let marker = if hotfix { "hotfix" } else { "-" };
                tag.rsplit(marker).next()?.parse::<u32>().ok()
            })
            .max()
            .unwrap_or(0);
        Ok(from_files.max(from_tags) + 1)
    }

    /// Open a release branch for the next version at `level`.
    ///
    /// The bump base is the highest version known anywhere: production
    /// or an in-flight release branch. Several releases may be under
    /// development at once; promotion serialises them later.
    pub fn create_release(&self, level: BumpLevel) -> Result<OperationReport> {
        self.repo.require_devel()?;
        let git = self.repo.git();
        git.require_clean()?;
        git.fetch()?;
        branches::checkout_synced(git, PROD_BRANCH)?;

        let production = self.repo.current_production_version()?;
        let current = self
            .dev_versions()?
            .into_iter()
            .max()
            .unwrap_or_else(|| production.clone())
            .max(production.clone());
        let next = level.bump(&current);
        let release_branch = Self::release_branch(&next);
        if git.branch_exists(&release_branch)? || git.remote_branch_exists(&release_branch)? {
            return Err(PreconditionError::ReleaseExists(next).into());
        }

        git.create_branch(&release_branch, PROD_BRANCH)?;
        git.checkout(&release_branch)?;
        let path = self.manifests().create_empty(&next, false)?;
        git.add(&[self.repo.relative(&path)])?;
        git.commit(&format!("Open release {next}"))?;
        git.push_branch(&release_branch)?;

        let mut report = OperationReport::new(Operation::NewRelease);
        report.identifier(next.to_string());
        info!("created release {next} from {PROD_BRANCH} at {current}");
        Ok(report)
    }

    /// Promote the next eligible release to its next candidate number.
    ///
    /// Sequential promotion: only the smallest in-flight version may
    /// move, and only one version may hold an active RC at a time.
    pub fn promote_to_rc(&self) -> Result<OperationReport> {
        self.repo.require_devel()?;
        let git = self.repo.git();
        git.require_clean()?;
        git.fetch()?;

        let lock = LockService::new(git).acquire(&LockScope::Prod)?;
        let mut report = OperationReport::new(Operation::PromoteRc);
        report.lock_tag = Some(lock.tag().to_string());

        let result = self.promote_to_rc_locked(&mut report);
        lock.release();
        result?;
        Ok(report)
    }

    fn promote_to_rc_locked(&self, report: &mut OperationReport) -> Result<()> {
        let git = self.repo.git();
        branches::checkout_synced(git, PROD_BRANCH)?;

        let target = self.rc_target()?;
        if let Some(active) = self.manifests().active_rc()? {
            if active.version != target {
                return Err(InvariantError::ActiveRcExists {
                    version: active.version,
                }
                .into());
            }
        }

        let n = self.next_marker_number(&target, false)?;
        let rc = ReleaseFile::new(target.clone(), ReleasePhase::Candidate(n));
        let release_branch = Self::release_branch(&target);
        report.identifier(rc.file_name());

        // snapshot the staged set on the release branch and clear it
        // from the manifest; candidates stay
        branches::checkout_synced(git, &release_branch)?;
        let manifests = self.manifests();
        let mut manifest = manifests.load_manifest(&target)?;
        let staged = manifest.staged();
        let snapshot_path = manifests.write_snapshot(&rc, &staged)?;
        manifest.clear_staged();
        let manifest_path = manifests.save(&manifest)?;
        git.add(&[
            self.repo.relative(&snapshot_path),
            self.repo.relative(&manifest_path),
        ])?;
        git.commit(&format!("Promote {target} to rc{n}"))?;
        git.push_branch(&release_branch)?;

        // the code payload of the staged patches lands on ho-prod, so
        // the candidate is testable from production checkouts
        git.checkout(PROD_BRANCH)?;
        git.merge_no_ff(
            &release_branch,
            &format!("Merge {release_branch} into {PROD_BRANCH} (rc{n})"),
        )?;

        let tag = rc.tag_name().expect("candidates always have a tag");
        git.create_tag(&tag, None, Some(&format!("Release candidate {n} for {target}")))?;
        match git.push_tag(&tag)? {
            git_cmd::PushOutcome::Accepted => report.tags_pushed.push(tag),
            git_cmd::PushOutcome::Rejected => {
                return Err(CoordinationError::PushRejected(format!(
                    "promotion tag {tag} already exists on origin"
                ))
                .into());
            }
        }

        // staged source branches are normally deleted at merge time;
        // sweep any leftover from interrupted integrations
        for id in &staged {
            let branch = id.branch_name();
            if git.remote_branch_exists(&branch)? {
                git.delete_remote_branch(&branch)?;
                if git.branch_exists(&branch)? {
                    git.delete_branch(&branch, true)?;
                }
                report.branches_deleted.push(branch);
            }
        }

        self.notify_stale_patch_branches(
            &format!(
                "[notify] promote_to_rc: {PROD_BRANCH} advanced to {target}-rc{n}; \
                 run `git merge {PROD_BRANCH}`"
            ),
            report,
        )?;

        git.checkout(PROD_BRANCH)?;
        git.push_branch(PROD_BRANCH)?;
        info!("promoted {target} to rc{n}");
        Ok(())
    }

    /// The version `promote_to_rc` must pick: the smallest in-flight
    /// version with staged work, falling back to the smallest in-flight
    /// version at all (an empty release is promotable).
    fn rc_target(&self) -> Result<Version> {
        let dev = self.dev_versions()?;
        let mut plain = vec![];
        for version in dev {
            match remote::manifest_on_branch(self.repo.git(), &version)? {
                // hotfix streams promote through promote_to_hotfix
                Some(manifest) if manifest.is_hotfix() => continue,
                Some(manifest) => plain.push((version, manifest.staged())),
                None => {
                    warn!("release branch for {version} carries no manifest; skipping");
                }
            }
        }
        let target = plain
            .iter()
            .find(|(_, staged)| !staged.is_empty())
            .or_else(|| plain.first())
            .map(|(version, _)| version.clone())
            .ok_or(PreconditionError::NoDevelopmentRelease)?;
        if let Some((lower, _)) = plain.iter().find(|(version, _)| *version < target) {
            return Err(InvariantError::SequentialityViolated {
                attempted: target,
                must_first: lower.clone(),
            }
            .into());
        }
        Ok(target)
    }

    /// Promote the active release candidate to production.
    pub fn promote_to_prod(&self) -> Result<OperationReport> {
        self.repo.require_devel()?;
        let git = self.repo.git();
        git.require_clean()?;
        git.fetch()?;

        let lock = LockService::new(git).acquire(&LockScope::Prod)?;
        let mut report = OperationReport::new(Operation::PromoteProd);
        report.lock_tag = Some(lock.tag().to_string());

        let result = self.promote_to_prod_locked(&mut report);
        lock.release();
        result?;
        Ok(report)
    }

    fn promote_to_prod_locked(&self, report: &mut OperationReport) -> Result<()> {
        let git = self.repo.git();
        branches::checkout_synced(git, PROD_BRANCH)?;

        let rc = self.manifests().active_rc()?.ok_or(PreconditionError::NoActiveRc)?;
        let target = rc.version.clone();
        if let Some(lower) = self
            .dev_versions()?
            .into_iter()
            .find(|version| *version < target)
        {
            return Err(InvariantError::SequentialityViolated {
                attempted: target,
                must_first: lower,
            }
            .into());
        }
        report.identifier(target.to_string());

        let manifests = self.manifests();
        let ids = manifests.load_snapshot(&rc)?;
        let production = ReleaseFile::new(target.clone(), ReleasePhase::Production);

        // the snapshot move keeps history: the rc file becomes the
        // production file
        let rc_path = manifests.snapshot_path(&rc);
        let prod_path = manifests.snapshot_path(&production);
        git.mv(self.repo.relative(&rc_path), self.repo.relative(&prod_path))?;
        let manifest_path = manifests.manifest_path(&target, false);
        if manifest_path.exists() {
            git.rm(self.repo.relative(&manifest_path))?;
        }

        self.rebuild_model(&production, &ids, report)?;

        git.add_all()?;
        git.commit(&format!("Release {target}"))?;

        let tag = production.tag_name().expect("production always has a tag");
        git.create_tag(&tag, None, Some(&format!("Release {target}")))?;
        match git.push_tag(&tag)? {
            git_cmd::PushOutcome::Accepted => report.tags_pushed.push(tag),
            git_cmd::PushOutcome::Rejected => {
                return Err(CoordinationError::PushRejected(format!(
                    "promotion tag {tag} already exists on origin"
                ))
                .into());
            }
        }

        self.delete_release_branch(&target, report)?;
        git.push_branch(PROD_BRANCH)?;
        info!("promoted {target} to production");
        Ok(())
    }

    /// Replay the release on a pristine replica and capture the
    /// resulting model artifacts.
    fn rebuild_model(
        &self,
        release: &ReleaseFile,
        ids: &[PatchId],
        report: &mut OperationReport,
    ) -> Result<()> {
        let suffix = release.artifact_suffix();
        // hotfixes rebuild from their own base version, production
        // releases from whatever production is now
        let base_schema = match release.phase {
            ReleasePhase::Hotfix(_) => self.repo.schema_file(&release.version.to_string()),
            _ => self.repo.schema_link(),
        };
        debug!("rebuilding model {suffix} from {base_schema}");
        applier::apply_patches(self.repo, self.db, self.generator, &base_schema, ids)?;

        fs_err::create_dir_all(self.repo.model_dir())
            .map_err(|e| crate::HopError::Internal(e.into()))?;
        self.db.dump_schema(&self.repo.schema_file(&suffix))?;
        self.db.dump_metadata(&self.repo.metadata_file(&suffix))?;
        let seed_tables = &self.repo.config().seed_tables;
        if !seed_tables.is_empty() {
            self.db.dump_seed(&self.repo.seed_file(&suffix), seed_tables)?;
        }
        self.repo.update_schema_link(&suffix)?;
        self.db.write_release_row(release)?;
        report.identifier(format!("schema-{suffix}.sql"));
        Ok(())
    }

    fn delete_release_branch(&self, version: &Version, report: &mut OperationReport) -> Result<()> {
        let git = self.repo.git();
        let release_branch = Self::release_branch(version);
        if git.remote_branch_exists(&release_branch)? {
            git.delete_remote_branch(&release_branch)?;
        }
        if git.branch_exists(&release_branch)? {
            git.delete_branch(&release_branch, true)?;
        }
        report.branches_deleted.push(release_branch);
        Ok(())
    }

    /// Emit a rebase notification on every surviving patch branch that
    /// no longer descends from the tip of `ho-prod`.
    fn notify_stale_patch_branches(
        &self,
        message: &str,
        report: &mut OperationReport,
    ) -> Result<()> {
        let git = self.repo.git();
        for branch in git.list_remote_branches(PATCH_BRANCH_PREFIX)? {
            if git.is_ancestor_of(PROD_BRANCH, &branch).unwrap_or(false) {
                continue;
            }
            branches::checkout_synced(git, &branch)?;
            git.commit_empty(message)?;
            git.push_branch(&branch)?;
            report.notifications_emitted.push(branch);
        }
        Ok(())
    }

    /// Reopen a released version for hotfixing: recreate its release
    /// branch from the production tag, with a hotfix manifest.
    pub fn hotfix_open(&self, version: &Version) -> Result<OperationReport> {
        self.repo.require_devel()?;
        let git = self.repo.git();
        git.require_clean()?;
        git.fetch()?;

        let production = ReleaseFile::new(version.clone(), ReleasePhase::Production);
        let tag = production.tag_name().expect("production always has a tag");
        if !git.tag_exists(&tag)? {
            return Err(PreconditionError::UnknownVersion(version.clone()).into());
        }
        let release_branch = Self::release_branch(version);
        if git.branch_exists(&release_branch)? || git.remote_branch_exists(&release_branch)? {
            return Err(PreconditionError::ReleaseExists(version.clone()).into());
        }

        git.create_branch(&release_branch, &tag)?;
        git.checkout(&release_branch)?;
        let path = self.manifests().create_empty(version, true)?;
        git.add(&[self.repo.relative(&path)])?;
        git.commit(&format!("Open hotfix stream for {version}"))?;
        git.push_branch(&release_branch)?;

        let mut report = OperationReport::new(Operation::HotfixOpen);
        report.identifier(version.to_string());
        info!("reopened release {version} from tag {tag}");
        Ok(report)
    }

    /// Promote the staged hotfix patches of the current release branch.
    pub fn promote_to_hotfix(&self) -> Result<OperationReport> {
        self.repo.require_devel()?;
        let git = self.repo.git();
        git.require_clean()?;
        git.fetch()?;

        let branch = git.current_branch()?;
        let version = branch
            .strip_prefix(RELEASE_BRANCH_PREFIX)
            .and_then(|v| release_name::parse_version(v).ok())
            .ok_or_else(|| PreconditionError::WrongBranch {
                expected: format!("{RELEASE_BRANCH_PREFIX}X.Y.Z"),
                actual: branch.clone(),
            })?;

        let lock = LockService::new(git).acquire(&LockScope::Prod)?;
        let mut report = OperationReport::new(Operation::PromoteHotfix);
        report.lock_tag = Some(lock.tag().to_string());

        let result = self.promote_to_hotfix_locked(&version, &branch, &mut report);
        lock.release();
        result?;
        Ok(report)
    }

    fn promote_to_hotfix_locked(
        &self,
        version: &Version,
        release_branch: &str,
        report: &mut OperationReport,
    ) -> Result<()> {
        let git = self.repo.git();
        let manifests = self.manifests();
        let manifest = manifests.load_manifest(version)?;
        if !manifest.is_hotfix() {
            return Err(PreconditionError::WrongBranch {
                expected: "a reopened (hotfix) release branch".to_string(),
                actual: release_branch.to_string(),
            }
            .into());
        }
        let production = self.production_version_on_remote()?;
        if &production != version {
            return Err(InvariantError::HotfixTargetsNonProduction {
                version: version.clone(),
                production,
            }
            .into());
        }

        let n = self.next_marker_number(version, true)?;
        let hotfix = ReleaseFile::new(version.clone(), ReleasePhase::Hotfix(n));
        report.identifier(hotfix.file_name());

        let staged = manifest.staged();
        let snapshot_path = manifests.write_snapshot(&hotfix, &staged)?;
        git.add(&[self.repo.relative(&snapshot_path)])?;
        git.rm(self.repo.relative(&manifests.manifest_path(version, true)))?;
        git.commit(&format!("Promote {version} to hotfix{n}"))?;

        branches::checkout_synced(git, PROD_BRANCH)?;
        git.merge_no_ff(
            release_branch,
            &format!("Merge {release_branch} into {PROD_BRANCH} (hotfix{n})"),
        )?;

        self.rebuild_model(&hotfix, &staged, report)?;
        git.add_all()?;
        git.commit(&format!("Hotfix {version}-hotfix{n}"))?;

        let tag = hotfix.tag_name().expect("hotfixes always have a tag");
        git.create_tag(&tag, None, Some(&format!("Hotfix {n} for {version}")))?;
        match git.push_tag(&tag)? {
            git_cmd::PushOutcome::Accepted => report.tags_pushed.push(tag),
            git_cmd::PushOutcome::Rejected => {
                return Err(CoordinationError::PushRejected(format!(
                    "promotion tag {tag} already exists on origin"
                ))
                .into());
            }
        }

        self.delete_release_branch(version, report)?;
        git.push_branch(PROD_BRANCH)?;
        info!("promoted hotfix {version}-hotfix{n}");
        Ok(())
    }

    /// Production version as recorded on `origin/ho-prod`, read from
    /// the committed symlink blob.
    fn production_version_on_remote(&self) -> Result<Version> {
        let link_path = format!("{HOP_DIR}/model/schema.sql");
        let reference = format!("origin/{PROD_BRANCH}");
        let Some(target) = self.repo.git().show(&reference, &link_path)? else {
            return Ok(Version::new(0, 0, 0));
        };
        let name = Utf8PathBuf::from(target.trim().to_string());
        let name = name.file_name().unwrap_or_default();
        let release = name
            .strip_prefix("schema-")
            .and_then(|s| s.strip_suffix(".sql"))
            .and_then(ReleaseFile::from_artifact_suffix)
            .ok_or_else(|| InvariantError::UnknownPhase(name.to_string()))?;
        Ok(release.version)
    }
}
