use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use release_name::{ReleaseFile, hotfix_manifest_file_name, manifest_file_name};
use semver::Version;
use toml_edit::{DocumentMut, Item, Table, value};
use tracing::debug;

use crate::{HopError, PatchId, PreconditionError, Result};

/// State of a patch inside a development manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    /// A development branch exists, work in progress.
    Candidate,
    /// Integrated into the release branch, validated, promotable.
    Staged,
}

impl PatchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Staged => "staged",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "candidate" => Some(Self::Candidate),
            "staged" => Some(Self::Staged),
            _ => None,
        }
    }
}

impl fmt::Display for PatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PATCHES_SECTION: &str = "patches";

/// The mutable manifest of a release under development: an ordered map
/// from patch id to state. Insertion order is the application order and
/// survives every state transition.
///
/// Backed by a [`DocumentMut`] so user comments and blank lines
/// round-trip untouched.
#[derive(Debug, Clone)]
pub struct Manifest {
    version: Version,
    hotfix: bool,
    doc: DocumentMut,
}

impl Manifest {
    pub fn empty(version: Version, hotfix: bool) -> Self {
        let mut doc = DocumentMut::new();
        doc.insert(PATCHES_SECTION, Item::Table(Table::new()));
        Self {
            version,
            hotfix,
            doc,
        }
    }

    pub fn parse(version: Version, hotfix: bool, content: &str) -> Result<Self> {
        let doc: DocumentMut = content.parse().map_err(|e| {
            HopError::Internal(anyhow::anyhow!("malformed manifest for {version}: {e}"))
        })?;
        let manifest = Self {
            version,
            hotfix,
            doc,
        };
        // surface malformed ids and states early, not at first use
        for (id, state) in manifest.raw_entries() {
            PatchId::parse(&id)?;
            PatchState::parse(&state).ok_or_else(|| {
                HopError::Internal(anyhow::anyhow!(
                    "manifest for {}: patch `{id}` has unknown state `{state}`",
                    manifest.version
                ))
            })?;
        }
        Ok(manifest)
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether this is the manifest of a reopened (hotfix) release.
    pub fn is_hotfix(&self) -> bool {
        self.hotfix
    }

    pub fn file_name(&self) -> String {
        if self.hotfix {
            hotfix_manifest_file_name(&self.version)
        } else {
            manifest_file_name(&self.version)
        }
    }

    fn table(&self) -> Option<&Table> {
        self.doc.get(PATCHES_SECTION).and_then(Item::as_table)
    }

    fn table_mut(&mut self) -> &mut Table {
        self.doc
            .entry(PATCHES_SECTION)
            .or_insert(Item::Table(Table::new()))
            .as_table_mut()
            .expect("patches section is always a table")
    }

    fn raw_entries(&self) -> Vec<(String, String)> {
        self.table()
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(key, item)| {
                        item.as_str().map(|state| (key.to_string(), state.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All entries in application order.
    pub fn entries(&self) -> Vec<(PatchId, PatchState)> {
        self.raw_entries()
            .into_iter()
            .map(|(id, state)| {
                (
                    PatchId::parse(&id).expect("validated at parse time"),
                    PatchState::parse(&state).expect("validated at parse time"),
                )
            })
            .collect()
    }

    pub fn state_of(&self, id: &PatchId) -> Option<PatchState> {
        self.entries()
            .into_iter()
            .find(|(entry, _)| entry == id)
            .map(|(_, state)| state)
    }

    /// The staged subset, still in application order.
    pub fn staged(&self) -> Vec<PatchId> {
        self.entries()
            .into_iter()
            .filter(|(_, state)| *state == PatchState::Staged)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Append a candidate, or insert it before `before`.
    pub fn add_candidate(&mut self, id: &PatchId, before: Option<&PatchId>) -> Result<()> {
        if self.state_of(id).is_some() {
            return Err(PreconditionError::DuplicateManifestEntry {
                id: id.clone(),
                version: self.version.clone(),
            }
            .into());
        }
        match before {
            None => {
                self.table_mut().insert(id.as_str(), value(PatchState::Candidate.as_str()));
            }
            Some(before) => {
                if self.state_of(before).is_none() {
                    return Err(PreconditionError::UnknownManifestEntry {
                        id: before.clone(),
                        version: self.version.clone(),
                    }
                    .into());
                }
                // toml_edit only appends, so rebuild the table around
                // the insertion point
                let entries = self.entries();
                let table = self.table_mut();
                table.clear();
                for (existing, state) in entries {
                    if &existing == before {
                        table.insert(id.as_str(), value(PatchState::Candidate.as_str()));
                    }
                    table.insert(existing.as_str(), value(state.as_str()));
                }
            }
        }
        Ok(())
    }

    /// Candidate -> Staged, in place: position is preserved.
    pub fn set_staged(&mut self, id: &PatchId) -> Result<()> {
        match self.state_of(id) {
            None => Err(PreconditionError::UnknownManifestEntry {
                id: id.clone(),
                version: self.version.clone(),
            }
            .into()),
            Some(PatchState::Staged) => Err(PreconditionError::AlreadyStaged {
                id: id.clone(),
                version: self.version.clone(),
            }
            .into()),
            Some(PatchState::Candidate) => {
                self.table_mut()
                    .insert(id.as_str(), value(PatchState::Staged.as_str()));
                Ok(())
            }
        }
    }

    /// Drop an entry. Only legal while the release is in development,
    /// which is the only time a manifest exists at all.
    pub fn remove(&mut self, id: &PatchId) -> Result<()> {
        if self.state_of(id).is_none() {
            return Err(PreconditionError::UnknownManifestEntry {
                id: id.clone(),
                version: self.version.clone(),
            }
            .into());
        }
        self.table_mut().remove(id.as_str());
        Ok(())
    }

    /// Drop every staged entry; candidates keep their order. Ran after
    /// a promotion has captured the staged subset in a snapshot.
    pub fn clear_staged(&mut self) {
        for id in self.staged() {
            self.table_mut().remove(id.as_str());
        }
    }

    pub fn to_toml_string(&self) -> String {
        self.doc.to_string()
    }
}

/// Parse an immutable snapshot (`X.Y.Z.txt`, `X.Y.Z-rcN.txt`,
/// `X.Y.Z-hotfixN.txt`): one patch id per line, `#` comments and blank
/// lines tolerated.
pub fn parse_snapshot(content: &str) -> Result<Vec<PatchId>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PatchId::parse)
        .collect()
}

/// Render a snapshot with its single header comment
/// (`# Release X.Y.Z[-rcN|-hotfixN]`).
pub fn render_snapshot(release: &ReleaseFile, ids: &[PatchId]) -> String {
    let file_name = release.file_name();
    let label = file_name.strip_suffix(".txt").unwrap_or(&file_name);
    let mut out = format!("# Release {label}\n");
    for id in ids {
        out.push_str(id.as_str());
        out.push('\n');
    }
    out
}

/// Reads and writes the release files under `.hop/releases/`.
#[derive(Debug)]
pub struct ManifestStore {
    releases_dir: Utf8PathBuf,
}

impl ManifestStore {
    pub fn new(releases_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            releases_dir: releases_dir.into(),
        }
    }

    pub fn releases_dir(&self) -> &Utf8Path {
        &self.releases_dir
    }

    pub fn manifest_path(&self, version: &Version, hotfix: bool) -> Utf8PathBuf {
        let name = if hotfix {
            hotfix_manifest_file_name(version)
        } else {
            manifest_file_name(version)
        };
        self.releases_dir.join(name)
    }

    pub fn snapshot_path(&self, release: &ReleaseFile) -> Utf8PathBuf {
        self.releases_dir.join(release.file_name())
    }

    /// Load the development manifest of `version`, probing the hotfix
    /// name first: a reopened release only ever has the hotfix one.
    pub fn load_manifest(&self, version: &Version) -> Result<Manifest> {
        for hotfix in [true, false] {
            let path = self.manifest_path(version, hotfix);
            if path.is_file() {
                let content = fs_err::read_to_string(&path)
                    .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot read {path}: {e}")))?;
                return Manifest::parse(version.clone(), hotfix, &content);
            }
        }
        Err(PreconditionError::UnknownVersion(version.clone()).into())
    }

    pub fn save(&self, manifest: &Manifest) -> Result<Utf8PathBuf> {
        let path = self.manifest_path(manifest.version(), manifest.is_hotfix());
        fs_err::write(&path, manifest.to_toml_string())
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot write {path}: {e}")))?;
        Ok(path)
    }

    pub fn create_empty(&self, version: &Version, hotfix: bool) -> Result<Utf8PathBuf> {
        let path = self.manifest_path(version, hotfix);
        if path.exists() {
            return Err(PreconditionError::ReleaseExists(version.clone()).into());
        }
        fs_err::create_dir_all(&self.releases_dir).map_err(|e| {
            HopError::Internal(anyhow::anyhow!("cannot create {}: {e}", self.releases_dir))
        })?;
        let manifest = Manifest::empty(version.clone(), hotfix);
        self.save(&manifest)
    }

    pub fn delete_manifest(&self, version: &Version, hotfix: bool) -> Result<()> {
        let path = self.manifest_path(version, hotfix);
        fs_err::remove_file(&path)
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot remove {path}: {e}")))?;
        Ok(())
    }

    /// Every parseable release file in the directory, unsorted.
    pub fn release_files(&self) -> Result<Vec<ReleaseFile>> {
        if !self.releases_dir.is_dir() {
            return Ok(vec![]);
        }
        let mut files = vec![];
        for entry in fs_err::read_dir(&self.releases_dir).map_err(|e| {
            HopError::Internal(anyhow::anyhow!("cannot read {}: {e}", self.releases_dir))
        })? {
            let entry = entry.map_err(|e| HopError::Internal(e.into()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(release) = ReleaseFile::parse(name) {
                files.push(release);
            }
        }
        Ok(files)
    }

    /// The development manifests present in the working tree, sorted by
    /// version.
    pub fn dev_manifests(&self) -> Result<Vec<Manifest>> {
        let mut versions: Vec<Version> = self
            .release_files()?
            .into_iter()
            .filter(|file| !file.is_snapshot())
            .map(|file| file.version)
            .collect();
        versions.sort();
        versions.dedup();
        versions.into_iter().map(|v| self.load_manifest(&v)).collect()
    }

    /// The one manifest listing `id`, if any. Manifest invariant: a
    /// patch never appears in two manifests at once.
    pub fn find_patch(&self, id: &PatchId) -> Result<Option<(Manifest, PatchState)>> {
        for manifest in self.dev_manifests()? {
            if let Some(state) = manifest.state_of(id) {
                debug!("patch {id} is {state} in release {}", manifest.version());
                return Ok(Some((manifest, state)));
            }
        }
        Ok(None)
    }

    /// The release candidate awaiting production promotion: the highest
    /// rc of any version that has no production snapshot yet. At most
    /// one such version exists when the promotion invariants hold.
    pub fn active_rc(&self) -> Result<Option<ReleaseFile>> {
        let files = self.release_files()?;
        let in_production: Vec<&Version> = files
            .iter()
            .filter(|file| file.phase == release_name::ReleasePhase::Production)
            .map(|file| &file.version)
            .collect();
        let mut rcs: Vec<&ReleaseFile> = files
            .iter()
            .filter(|file| {
                matches!(file.phase, release_name::ReleasePhase::Candidate(_))
                    && !in_production.contains(&&file.version)
            })
            .collect();
        rcs.sort_by_key(|file| (file.version.clone(), file.phase));
        Ok(rcs.last().map(|file| (*file).clone()))
    }

    pub fn load_snapshot(&self, release: &ReleaseFile) -> Result<Vec<PatchId>> {
        let path = self.snapshot_path(release);
        let content = fs_err::read_to_string(&path)
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot read {path}: {e}")))?;
        parse_snapshot(&content)
    }

    pub fn write_snapshot(&self, release: &ReleaseFile, ids: &[PatchId]) -> Result<Utf8PathBuf> {
        let path = self.snapshot_path(release);
        fs_err::write(&path, render_snapshot(release, ids))
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot write {path}: {e}")))?;
        Ok(path)
    }
}
