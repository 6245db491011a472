use camino::{Utf8Path, Utf8PathBuf};

use crate::Database;

/// Code generation over the introspected schema, invoked after every
/// successful SQL application. External collaborator: the ORM's
/// generator plugs in here.
pub trait SchemaGenerator: std::fmt::Debug {
    /// Regenerate sources under `root` from the current state of `db`.
    /// Returns the paths it wrote, so a failing apply can revert them.
    fn generate(&self, db: &dyn Database, root: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>>;
}

/// Generator for repositories that only track SQL, and for tests.
#[derive(Debug, Default)]
pub struct NoGenerator;

impl SchemaGenerator for NoGenerator {
    fn generate(&self, _db: &dyn Database, _root: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>> {
        Ok(vec![])
    }
}
