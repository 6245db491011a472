use camino::{Utf8Path, Utf8PathBuf};
use release_name::ReleaseFile;
use semver::Version;
use tracing::debug;

use crate::{
    Config, HOP_DIR, HopError, PATCHES_DIR, PreconditionError, Result,
};

/// A hop working copy: a git repository with a `.hop/` metadata
/// directory. Owned by the [`crate::Orchestrator`]; every driver
/// borrows it for the duration of one operation.
#[derive(Debug)]
pub struct Repo {
    root: Utf8PathBuf,
    git: git_cmd::Repo,
    config: Config,
}

impl Repo {
    /// Open the repository at `root`. Fails when `.hop/config` is
    /// missing or no remote is configured.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self> {
        let root = root.into();
        let config_path = root.join(HOP_DIR).join("config");
        if !config_path.exists() {
            return Err(PreconditionError::OutsideRepo.into());
        }
        let config = Config::load(&config_path)?;
        if config.git_origin.is_empty() {
            return Err(HopError::Internal(anyhow::anyhow!(
                "no remote configured in {config_path}; hop needs a shared origin"
            )));
        }
        let git = git_cmd::Repo::new(root.clone()).map_err(HopError::from)?;
        Ok(Self { root, git, config })
    }

    /// Walk up from `start` towards the filesystem root looking for a
    /// `.hop/config`, like git discovers its own repository.
    pub fn find(start: &Utf8Path) -> Result<Self> {
        let mut dir = start;
        loop {
            if dir.join(HOP_DIR).join("config").exists() {
                debug!("found hop repository at {dir}");
                return Self::open(dir);
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => return Err(PreconditionError::OutsideRepo.into()),
            }
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn git(&self) -> &git_cmd::Repo {
        &self.git
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Refuse mutating operations on production-only clones.
    pub fn require_devel(&self) -> Result<()> {
        if self.config.devel {
            Ok(())
        } else {
            Err(PreconditionError::DevelDisabled.into())
        }
    }

    pub fn reload_config(&mut self) -> Result<()> {
        self.config = Config::load(&self.config_path())?;
        Ok(())
    }

    pub fn set_hop_version(&mut self, version: Version) -> Result<()> {
        self.config.hop_version = version;
        self.config.store(&self.config_path())
    }

    pub fn hop_dir(&self) -> Utf8PathBuf {
        self.root.join(HOP_DIR)
    }

    pub fn config_path(&self) -> Utf8PathBuf {
        self.hop_dir().join("config")
    }

    pub fn releases_dir(&self) -> Utf8PathBuf {
        self.hop_dir().join("releases")
    }

    pub fn model_dir(&self) -> Utf8PathBuf {
        self.hop_dir().join("model")
    }

    pub fn backups_dir(&self) -> Utf8PathBuf {
        self.hop_dir().join("backups")
    }

    pub fn patches_dir(&self) -> Utf8PathBuf {
        self.root.join(PATCHES_DIR)
    }

    /// `model/schema.sql`, a symlink to the currently-active versioned
    /// schema. Single source of truth for "current production version"
    /// when reading from a working copy.
    pub fn schema_link(&self) -> Utf8PathBuf {
        self.model_dir().join("schema.sql")
    }

    pub fn schema_file(&self, artifact_suffix: &str) -> Utf8PathBuf {
        self.model_dir().join(format!("schema-{artifact_suffix}.sql"))
    }

    pub fn metadata_file(&self, artifact_suffix: &str) -> Utf8PathBuf {
        self.model_dir()
            .join(format!("metadata-{artifact_suffix}.sql"))
    }

    pub fn seed_file(&self, artifact_suffix: &str) -> Utf8PathBuf {
        self.model_dir().join(format!("seed-{artifact_suffix}.sql"))
    }

    /// The production release the working copy is at, read from the
    /// `model/schema.sql` symlink target. [`None`] before the first
    /// promotion.
    pub fn current_production(&self) -> Result<Option<ReleaseFile>> {
        let link = self.schema_link();
        if std::fs::symlink_metadata(&link).is_err() {
            return Ok(None);
        }
        let target = std::fs::read_link(&link)
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot read symlink {link}: {e}")))?;
        let target = Utf8PathBuf::from_path_buf(target)
            .map_err(|p| HopError::Internal(anyhow::anyhow!("non-utf8 symlink target {p:?}")))?;
        let name = target
            .file_name()
            .ok_or_else(|| HopError::Internal(anyhow::anyhow!("empty symlink target")))?;
        let release = name
            .strip_prefix("schema-")
            .and_then(|s| s.strip_suffix(".sql"))
            .and_then(ReleaseFile::from_artifact_suffix)
            .ok_or_else(|| crate::InvariantError::UnknownPhase(name.to_string()))?;
        Ok(Some(release))
    }

    /// Production version as a plain number, `0.0.0` before the first
    /// promotion.
    pub fn current_production_version(&self) -> Result<Version> {
        Ok(self
            .current_production()?
            .map(|release| release.version)
            .unwrap_or_else(|| Version::new(0, 0, 0)))
    }

    /// Point `model/schema.sql` at `schema-<suffix>.sql`.
    pub fn update_schema_link(&self, artifact_suffix: &str) -> Result<()> {
        let link = self.schema_link();
        if std::fs::symlink_metadata(&link).is_ok() {
            fs_err::remove_file(&link)
                .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot remove {link}: {e}")))?;
        }
        let target = format!("schema-{artifact_suffix}.sql");
        std::os::unix::fs::symlink(&target, &link).map_err(|e| {
            HopError::Internal(anyhow::anyhow!("cannot symlink {link} -> {target}: {e}"))
        })?;
        Ok(())
    }

    /// Path of `path` relative to the repository root, as git wants it.
    pub fn relative<'a>(&self, path: &'a Utf8Path) -> &'a str {
        path.strip_prefix(&self.root).map_or(path.as_str(), Utf8Path::as_str)
    }
}
