use std::fmt;
use std::sync::OnceLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::{HopError, PATCH_BRANCH_PREFIX, PATCH_TAG_PREFIX, PreconditionError, Result, VALIDATE_BRANCH_PREFIX};

/// Identifier of a patch: an issue number, optionally followed by a
/// slug (`42-login`). The leading integer drives issue auto-close in
/// merge commit messages. Case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId(String);

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+(-[A-Za-z0-9._-]+)?$").expect("valid regex"))
}

impl PatchId {
    pub fn parse(s: &str) -> Result<Self> {
        if id_regex().is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(PreconditionError::MalformedPatchId(s.to_string()).into())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The external issue number, used for `Closes #N` autoclose.
    pub fn issue_number(&self) -> u64 {
        let digits = self
            .0
            .split('-')
            .next()
            .expect("split always yields at least one item");
        digits.parse().expect("validated by the id regex")
    }

    pub fn branch_name(&self) -> String {
        format!("{PATCH_BRANCH_PREFIX}{}", self.0)
    }

    pub fn validation_branch_name(&self) -> String {
        format!("{VALIDATE_BRANCH_PREFIX}{}", self.0)
    }

    /// The permanent reservation tag.
    pub fn tag_name(&self) -> String {
        format!("{PATCH_TAG_PREFIX}{}", self.0)
    }

    /// Recover the id from a `ho-patch/<id>` branch name.
    pub fn from_branch_name(branch: &str) -> Option<Self> {
        let id = branch.strip_prefix(PATCH_BRANCH_PREFIX)?;
        Self::parse(id).ok()
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PatchId {
    type Err = HopError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The on-disk patch directories (`Patches/<id>/`).
#[derive(Debug)]
pub struct PatchStore {
    patches_dir: Utf8PathBuf,
}

impl PatchStore {
    pub fn new(patches_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            patches_dir: patches_dir.into(),
        }
    }

    pub fn dir(&self, id: &PatchId) -> Utf8PathBuf {
        self.patches_dir.join(id.as_str())
    }

    pub fn exists(&self, id: &PatchId) -> bool {
        self.dir(id).is_dir()
    }

    /// Create `Patches/<id>/` seeded with a README, so the directory is
    /// non-empty and reviewable before any SQL lands.
    pub fn create(&self, id: &PatchId) -> Result<Utf8PathBuf> {
        let dir = self.dir(id);
        if dir.exists() {
            return Err(PreconditionError::PatchExists(id.clone()).into());
        }
        fs_err::create_dir_all(&dir)
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot create {dir}: {e}")))?;
        let readme = dir.join("README.md");
        fs_err::write(
            &readme,
            format!("# Patch {id}\n\nDescribe the change and its rollout caveats here.\n"),
        )
        .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot write {readme}: {e}")))?;
        Ok(dir)
    }

    /// Files the applier executes, in strict lexicographic order.
    /// Anything that is not `.sql` or `.py` is documentation.
    pub fn executable_files(&self, id: &PatchId) -> Result<Vec<Utf8PathBuf>> {
        let dir = self.dir(id);
        if !dir.is_dir() {
            return Err(PreconditionError::MissingDirectory(dir).into());
        }
        let mut files: Vec<Utf8PathBuf> = fs_err::read_dir(&dir)
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot read {dir}: {e}")))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
            .filter(|path| path.is_file() && is_executable(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// A patch must carry at least one executable file before it can be
    /// applied or merged.
    pub fn validate(&self, id: &PatchId) -> Result<()> {
        if self.executable_files(id)?.is_empty() {
            return Err(PreconditionError::EmptyPatch(id.clone()).into());
        }
        Ok(())
    }
}

fn is_executable(path: &Utf8Path) -> bool {
    matches!(path.extension(), Some("sql" | "py"))
}
