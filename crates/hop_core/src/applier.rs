use camino::{Utf8Path, Utf8PathBuf};
use psql_cmd::PgError;
use tracing::{debug, info, warn};

use crate::{
    Database, HopError, PatchId, PatchState, PatchStore, Repo, Result, SchemaGenerator,
    ValidationError,
};

/// The ordered set of patches a single `apply` run executes: every
/// staged patch plus the current one.
///
/// A current patch that is already staged keeps its recorded position
/// (re-apply scenario); otherwise it runs last.
pub fn compute_sequence(entries: &[(PatchId, PatchState)], current: &PatchId) -> Vec<PatchId> {
    let mut sequence: Vec<PatchId> = entries
        .iter()
        .filter(|(_, state)| *state == PatchState::Staged)
        .map(|(id, _)| id.clone())
        .collect();
    if !sequence.contains(current) {
        sequence.push(current.clone());
    }
    sequence
}

#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub applied: Vec<PatchId>,
    /// Files written by the code generator; a failing run removes them.
    pub generated: Vec<Utf8PathBuf>,
}

/// Replay `ids` in order against a database reset to `schema`, then
/// regenerate model sources.
///
/// On any failure the database is reset again and generated files are
/// reverted; the original error survives, rollback failures are only
/// logged so they never mask it.
pub(crate) fn apply_patches(
    repo: &Repo,
    db: &dyn Database,
    generator: &dyn SchemaGenerator,
    schema: &Utf8Path,
    ids: &[PatchId],
) -> Result<ApplyOutcome> {
    db.reset_to_schema(schema)?;

    let result = apply_inner(repo, db, generator, ids);
    if let Err(e) = &result {
        debug!("apply failed, rolling back: {e}");
        // nothing generated survives a failed run: the generator is the
        // last step, and it reports no paths on error
        rollback(db, schema, &[]);
    }
    result
}

fn apply_inner(
    repo: &Repo,
    db: &dyn Database,
    generator: &dyn SchemaGenerator,
    ids: &[PatchId],
) -> Result<ApplyOutcome> {
    let applied = run_patches(repo, db, ids)?;
    let generated = generator
        .generate(db, repo.root())
        .map_err(HopError::Internal)?;
    Ok(ApplyOutcome { applied, generated })
}

/// Execute the patches in order against the database as it stands, with
/// no reset and no generator run. The deployer replays snapshots
/// incrementally through this.
pub(crate) fn run_patches(
    repo: &Repo,
    db: &dyn Database,
    ids: &[PatchId],
) -> Result<Vec<PatchId>> {
    let store = PatchStore::new(repo.patches_dir());
    let mut applied = vec![];
    for id in ids {
        store.validate(id)?;
        for file in store.executable_files(id)? {
            info!("applying {file}");
            let result = match file.extension() {
                Some("sql") => db.apply_sql_file(&file),
                Some("py") => db.apply_python_file(&file, repo.root()),
                _ => unreachable!("executable_files only yields sql and py"),
            };
            result.map_err(|e| apply_error(repo, id, &file, e))?;
        }
        applied.push(id.clone());
    }
    Ok(applied)
}

fn apply_error(repo: &Repo, id: &PatchId, file: &Utf8Path, e: PgError) -> HopError {
    match e {
        PgError::Sql { stderr, .. } => ValidationError::ApplyFailed {
            patch: id.clone(),
            file: repo.relative(file).into(),
            detail: stderr,
        }
        .into(),
        other => other.into(),
    }
}

pub(crate) fn rollback(db: &dyn Database, schema: &Utf8Path, generated: &[Utf8PathBuf]) {
    if let Err(e) = db.reset_to_schema(schema) {
        warn!("rollback reset failed: {e}");
    }
    for path in generated {
        if let Err(e) = fs_err::remove_file(path) {
            warn!("rollback could not remove {path}: {e}");
        }
    }
}
