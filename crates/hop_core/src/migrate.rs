use semver::Version;
use tracing::{debug, info};

use crate::{HOP_DIR, HopError, Repo, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Migrated,
    /// The repository already had the target layout; only the recorded
    /// tool version moved.
    AlreadyApplied,
}

/// A repository-layout migration. Ordered by target tool version,
/// idempotent, and guarded: it only runs when the recorded version is
/// strictly lower than its target.
struct Migration {
    target: Version,
    summary: &'static str,
    run: fn(&Repo) -> Result<MigrationOutcome>,
}

fn migrations() -> Vec<Migration> {
    vec![Migration {
        target: Version::new(0, 17, 1),
        summary: "move metadata under .hop/",
        run: migrate_hop_layout,
    }]
}

/// Migrates a repository created by an older tool version to the
/// current layout.
#[derive(Debug)]
pub struct Migrator<'a> {
    repo: &'a mut Repo,
}

impl<'a> Migrator<'a> {
    pub fn new(repo: &'a mut Repo) -> Self {
        Self { repo }
    }

    /// Run every pending migration, committing one `[migrate X.Y.Z]`
    /// commit per migration that did something.
    pub fn run(&mut self) -> Result<Vec<(Version, MigrationOutcome)>> {
        self.repo.require_devel()?;
        let mut results = vec![];
        for migration in migrations() {
            if self.repo.config().hop_version >= migration.target {
                debug!(
                    "migration {} already recorded (repo at {})",
                    migration.target,
                    self.repo.config().hop_version
                );
                continue;
            }
            info!("running migration {}: {}", migration.target, migration.summary);
            let outcome = (migration.run)(self.repo)?;
            self.repo.set_hop_version(migration.target.clone())?;

            let git = self.repo.git();
            git.add_all()?;
            git.commit(&format!(
                "[migrate {}] {}",
                migration.target, migration.summary
            ))?;
            git.push()?;
            results.push((migration.target, outcome));
        }
        Ok(results)
    }
}

/// v0.17.1: `releases/`, `model/` and `backups/` moved from the
/// repository root into `.hop/`, and backups left version control.
fn migrate_hop_layout(repo: &Repo) -> Result<MigrationOutcome> {
    let git = repo.git();
    let mut moved = false;
    for dir in ["releases", "model"] {
        let legacy = repo.root().join(dir);
        let new = repo.hop_dir().join(dir);
        if legacy.is_dir() && !new.exists() {
            git.mv(dir, &format!("{HOP_DIR}/{dir}"))?;
            moved = true;
        }
    }
    let legacy_backups = repo.root().join("backups");
    if legacy_backups.is_dir() && !repo.backups_dir().exists() {
        // backups are untracked; a plain rename is enough
        fs_err::rename(&legacy_backups, repo.backups_dir())
            .map_err(|e| HopError::Internal(e.into()))?;
        moved = true;
    }

    let gitignore = repo.root().join(".gitignore");
    let ignore_line = format!("{HOP_DIR}/backups/");
    let content = fs_err::read_to_string(&gitignore).unwrap_or_default();
    if !content.lines().any(|line| line.trim() == ignore_line) {
        let mut content = content;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&ignore_line);
        content.push('\n');
        fs_err::write(&gitignore, content).map_err(|e| HopError::Internal(e.into()))?;
        moved = true;
    }

    if moved {
        Ok(MigrationOutcome::Migrated)
    } else {
        Ok(MigrationOutcome::AlreadyApplied)
    }
}
