use semver::Version;

use crate::{NameError, parse_version};

/// Phase of a release, as encoded in its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReleasePhase {
    /// Mutable manifest, work in progress.
    Development,
    /// Immutable release-candidate snapshot number `n` (n >= 1).
    Candidate(u32),
    /// Immutable production snapshot.
    Production,
    /// Immutable hotfix snapshot number `n` (n >= 1).
    Hotfix(u32),
}

/// A release file: a version plus the phase its name encodes.
///
/// Lexicographic order of production file names matches semver order of
/// the versions they carry, because every component is numeric and the
/// extension is constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFile {
    pub version: Version,
    pub phase: ReleasePhase,
}

const MANIFEST_SUFFIX: &str = "-patches.toml";
const HOTFIX_MANIFEST_SUFFIX: &str = "-hotfix-patches.toml";
const SNAPSHOT_EXT: &str = ".txt";

impl ReleaseFile {
    pub fn new(version: Version, phase: ReleasePhase) -> Self {
        Self { version, phase }
    }

    /// Parse a file name from the `releases/` directory.
    ///
    /// Returns [`None`] for names that are not release files at all
    /// (editor droppings, hidden files), so callers can skip them while
    /// scanning a directory.
    pub fn parse(file_name: &str) -> Option<Self> {
        if let Some(version) = file_name.strip_suffix(HOTFIX_MANIFEST_SUFFIX) {
            let version = parse_version(version).ok()?;
            return Some(Self::new(version, ReleasePhase::Development));
        }
        if let Some(version) = file_name.strip_suffix(MANIFEST_SUFFIX) {
            let version = parse_version(version).ok()?;
            return Some(Self::new(version, ReleasePhase::Development));
        }
        let stem = file_name.strip_suffix(SNAPSHOT_EXT)?;
        if let Some((version, n)) = split_numbered(stem, "-rc") {
            return Some(Self::new(version, ReleasePhase::Candidate(n)));
        }
        if let Some((version, n)) = split_numbered(stem, "-hotfix") {
            return Some(Self::new(version, ReleasePhase::Hotfix(n)));
        }
        let version = parse_version(stem).ok()?;
        Some(Self::new(version, ReleasePhase::Production))
    }

    /// Like [`ReleaseFile::parse`] but for contexts where the name must
    /// be a release file.
    pub fn parse_strict(file_name: &str) -> Result<Self, NameError> {
        Self::parse(file_name).ok_or_else(|| NameError::InvalidReleaseFile(file_name.to_string()))
    }

    /// The file name under `releases/` for this release.
    ///
    /// Development always formats to the plain manifest name; the
    /// hotfix-stream manifest name is produced by
    /// [`hotfix_manifest_file_name`].
    pub fn file_name(&self) -> String {
        match self.phase {
            ReleasePhase::Development => manifest_file_name(&self.version),
            ReleasePhase::Candidate(n) => format!("{}-rc{n}{SNAPSHOT_EXT}", self.version),
            ReleasePhase::Production => format!("{}{SNAPSHOT_EXT}", self.version),
            ReleasePhase::Hotfix(n) => format!("{}-hotfix{n}{SNAPSHOT_EXT}", self.version),
        }
    }

    /// The immutable git tag marking this promotion.
    ///
    /// Development has no tag: only promotions are tagged.
    pub fn tag_name(&self) -> Option<String> {
        match self.phase {
            ReleasePhase::Development => None,
            ReleasePhase::Candidate(n) => Some(format!("release-rc-{}-{n}", self.version)),
            ReleasePhase::Production => Some(format!("release-{}", self.version)),
            ReleasePhase::Hotfix(n) => Some(format!("release-{}-hotfix{n}", self.version)),
        }
    }

    /// Suffix of the versioned artifacts under `model/`
    /// (`schema-<suffix>.sql`, `metadata-<suffix>.sql`, `seed-<suffix>.sql`).
    pub fn artifact_suffix(&self) -> String {
        match self.phase {
            ReleasePhase::Development | ReleasePhase::Candidate(_) | ReleasePhase::Production => {
                self.version.to_string()
            }
            ReleasePhase::Hotfix(n) => format!("{}-hotfix{n}", self.version),
        }
    }

    /// Inverse of [`ReleaseFile::artifact_suffix`]: classify the suffix
    /// of a versioned artifact (`1.3.4`, `1.3.4-hotfix2`). Candidates
    /// and development manifests never produce artifacts, so only
    /// production and hotfix come back.
    pub fn from_artifact_suffix(suffix: &str) -> Option<Self> {
        if let Some((version, n)) = split_numbered(suffix, "-hotfix") {
            return Some(Self::new(version, ReleasePhase::Hotfix(n)));
        }
        let version = parse_version(suffix).ok()?;
        Some(Self::new(version, ReleasePhase::Production))
    }

    pub fn is_snapshot(&self) -> bool {
        self.phase != ReleasePhase::Development
    }
}

/// `X.Y.Z-patches.toml`, the mutable development manifest.
pub fn manifest_file_name(version: &Version) -> String {
    format!("{version}{MANIFEST_SUFFIX}")
}

/// `X.Y.Z-hotfix-patches.toml`, the mutable manifest of a reopened
/// (hotfix) release.
pub fn hotfix_manifest_file_name(version: &Version) -> String {
    format!("{version}{HOTFIX_MANIFEST_SUFFIX}")
}

fn split_numbered(stem: &str, marker: &str) -> Option<(Version, u32)> {
    let idx = stem.rfind(marker)?;
    let (version, rest) = stem.split_at(idx);
    let n: u32 = rest[marker.len()..].parse().ok()?;
    if n == 0 {
        return None;
    }
    let version = parse_version(version).ok()?;
    Some((version, n))
}
