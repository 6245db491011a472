//! Read-only views of hop metadata as committed on origin branches.
//!
//! A patch branch forks before its candidate row lands on the release
//! branch, so the working tree is not authoritative for manifest
//! questions; origin is.

use git_cmd::Repo as GitRepo;
use semver::Version;

use crate::{HOP_DIR, Manifest, PatchId, RELEASE_BRANCH_PREFIX, Result};

/// Versions with a release branch on the remote, sorted ascending.
pub(crate) fn dev_versions(git: &GitRepo) -> Result<Vec<Version>> {
    let mut versions: Vec<Version> = git
        .list_remote_branches(RELEASE_BRANCH_PREFIX)?
        .into_iter()
        .filter_map(|branch| {
            branch
                .strip_prefix(RELEASE_BRANCH_PREFIX)
                .and_then(|v| release_name::parse_version(v).ok())
        })
        .collect();
    versions.sort();
    Ok(versions)
}

/// The development manifest of `version` as committed on its remote
/// release branch, without touching the working copy.
pub(crate) fn manifest_on_branch(git: &GitRepo, version: &Version) -> Result<Option<Manifest>> {
    let reference = format!("origin/{RELEASE_BRANCH_PREFIX}{version}");
    for hotfix in [true, false] {
        let name = if hotfix {
            release_name::hotfix_manifest_file_name(version)
        } else {
            release_name::manifest_file_name(version)
        };
        let path = format!("{HOP_DIR}/releases/{name}");
        if let Some(content) = git.show(&reference, &path)? {
            return Manifest::parse(version.clone(), hotfix, &content).map(Some);
        }
    }
    Ok(None)
}

/// The remote manifest listing `id`, if any. A patch is never in two
/// manifests at once, so the first hit is the only one.
pub(crate) fn find_patch(git: &GitRepo, id: &PatchId) -> Result<Option<Manifest>> {
    for version in dev_versions(git)? {
        if let Some(manifest) = manifest_on_branch(git, &version)? {
            if manifest.state_of(id).is_some() {
                return Ok(Some(manifest));
            }
        }
    }
    Ok(None)
}
