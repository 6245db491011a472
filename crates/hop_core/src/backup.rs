use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::Database;

/// Where deployment backups go. The store only sees opaque snapshots;
/// retention and offsite copies are somebody else's job.
pub trait BackupStore: std::fmt::Debug {
    /// Dump `db` before applying `label`, returning the snapshot path.
    fn dump(&self, db: &dyn Database, label: &str) -> anyhow::Result<Utf8PathBuf>;
}

/// Backups as plain files under `.hop/backups/`, named
/// `<dbname>-<label>-pre.dump`. Existing backups are never deleted.
#[derive(Debug)]
pub struct DirBackupStore {
    dir: Utf8PathBuf,
}

impl DirBackupStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }
}

impl BackupStore for DirBackupStore {
    fn dump(&self, db: &dyn Database, label: &str) -> anyhow::Result<Utf8PathBuf> {
        fs_err::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}-{label}-pre.dump", db.dbname()));
        db.dump_all(&path)?;
        info!("backed up {} to {path}", db.dbname());
        Ok(path)
    }
}
