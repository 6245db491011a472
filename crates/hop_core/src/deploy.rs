//! Apply production and hotfix releases to a target database.

use camino::Utf8PathBuf;
use release_name::{ReleaseFile, ReleasePhase};
use semver::Version;
use tracing::{debug, info};

use crate::{
    BackupStore, Database, HopError, ManifestStore, Repo, Result, applier,
};

/// What a deployment did: the snapshots applied in order and the
/// backups taken before each of them.
#[derive(Debug, Default)]
pub struct DeployReport {
    pub applied: Vec<ReleaseFile>,
    pub backups: Vec<Utf8PathBuf>,
    /// A fresh database was fast-pathed from the model artifacts
    /// instead of replaying every snapshot.
    pub fresh_load: bool,
}

/// Brings a database from its recorded version up to a target version,
/// snapshot by snapshot, with a backup before each step.
#[derive(Debug)]
pub struct Deployer<'a> {
    repo: &'a Repo,
    db: &'a dyn Database,
    backups: &'a dyn BackupStore,
}

impl<'a> Deployer<'a> {
    pub fn new(repo: &'a Repo, db: &'a dyn Database, backups: &'a dyn BackupStore) -> Self {
        Self { repo, db, backups }
    }

    pub fn deploy(&self, target: &Version) -> Result<DeployReport> {
        let manifests = ManifestStore::new(self.repo.releases_dir());
        let files = manifests.release_files()?;
        let current = self.db.read_current_version()?;
        let plan = deployment_plan(&files, current.as_ref(), target);
        debug!("deployment plan: {plan:?}");

        let mut report = DeployReport::default();
        if plan.is_empty() {
            info!("database already at or past {target}; nothing to deploy");
            return Ok(report);
        }

        if current.is_none() {
            // fresh database: load the final state directly instead of
            // replaying history
            let last = plan.last().expect("plan is non-empty");
            self.fresh_load(last)?;
            report.applied = vec![last.clone()];
            report.fresh_load = true;
            return Ok(report);
        }

        for release in plan {
            let backup = self
                .backups
                .dump(self.db, &release.artifact_suffix())
                .map_err(HopError::Internal)?;
            report.backups.push(backup);

            let ids = manifests.load_snapshot(&release)?;
            info!(
                "deploying {} ({} patch(es))",
                release.file_name(),
                ids.len()
            );
            applier::run_patches(self.repo, self.db, &ids)?;
            self.db.write_release_row(&release)?;
            report.applied.push(release);
        }
        Ok(report)
    }

    fn fresh_load(&self, release: &ReleaseFile) -> Result<()> {
        let suffix = release.artifact_suffix();
        info!("fresh database: loading model artifacts for {suffix}");
        self.db.reset_to_schema(&self.repo.schema_file(&suffix))?;
        let metadata = self.repo.metadata_file(&suffix);
        if metadata.is_file() {
            self.db.apply_sql_file(&metadata)?;
        }
        let seed = self.repo.seed_file(&suffix);
        if seed.is_file() {
            self.db.apply_sql_file(&seed)?;
        }
        self.db.write_release_row(release)?;
        Ok(())
    }
}

/// Position of a snapshot in the deployment chain: hotfixes sort right
/// after their base production release.
fn chain_key(release: &ReleaseFile) -> (Version, u32) {
    let n = match release.phase {
        ReleasePhase::Hotfix(n) => n,
        _ => 0,
    };
    (release.version.clone(), n)
}

/// The ordered list of snapshots to apply: every production snapshot
/// past `current` up to `target`, each followed by its hotfix chain.
pub fn deployment_plan(
    files: &[ReleaseFile],
    current: Option<&ReleaseFile>,
    target: &Version,
) -> Vec<ReleaseFile> {
    let mut chain: Vec<ReleaseFile> = files
        .iter()
        .filter(|file| {
            matches!(
                file.phase,
                ReleasePhase::Production | ReleasePhase::Hotfix(_)
            )
        })
        .filter(|file| &file.version <= target)
        .cloned()
        .collect();
    chain.sort_by_key(chain_key);

    match current {
        None => chain,
        Some(current) => {
            let current_key = chain_key(current);
            chain
                .into_iter()
                .filter(|file| chain_key(file) > current_key)
                .collect()
        }
    }
}
