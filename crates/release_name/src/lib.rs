//! Naming rules for releases.
//!
//! A release goes through four phases, each mapped to a file in the
//! `releases/` directory:
//!
//! - development: `X.Y.Z-patches.toml` (mutable manifest)
//! - release candidate `n`: `X.Y.Z-rcN.txt` (immutable snapshot)
//! - production: `X.Y.Z.txt` (immutable snapshot)
//! - hotfix `n`: `X.Y.Z-hotfixN.txt` (immutable snapshot)
//!
//! This crate owns the parsing and formatting of those names, the
//! matching git tag names, and version arithmetic (level bumps).

mod phase;

pub use phase::{ReleaseFile, ReleasePhase, hotfix_manifest_file_name, manifest_file_name};

use semver::Version;

/// Which part of the version a new release bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpLevel {
    Major,
    Minor,
    Patch,
}

impl std::str::FromStr for BumpLevel {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            other => Err(NameError::InvalidLevel(other.to_string())),
        }
    }
}

impl BumpLevel {
    /// Bump the given field and zero every lower field.
    pub fn bump(self, version: &Version) -> Version {
        match self {
            Self::Major => Version::new(version.major + 1, 0, 0),
            Self::Minor => Version::new(version.major, version.minor + 1, 0),
            Self::Patch => Version::new(version.major, version.minor, version.patch + 1),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("invalid version `{0}`: expected `X.Y.Z`")]
    InvalidVersion(String),
    #[error("invalid bump level `{0}`: expected `major`, `minor` or `patch`")]
    InvalidLevel(String),
    #[error("`{0}` is not a release file name")]
    InvalidReleaseFile(String),
}

/// Parse a plain `X.Y.Z` version. Pre-release and build metadata are
/// rejected: release versions are always bare triples.
pub fn parse_version(s: &str) -> Result<Version, NameError> {
    let version =
        Version::parse(s).map_err(|_| NameError::InvalidVersion(s.to_string()))?;
    if !version.pre.is_empty() || !version.build.is_empty() {
        return Err(NameError::InvalidVersion(s.to_string()));
    }
    Ok(version)
}
