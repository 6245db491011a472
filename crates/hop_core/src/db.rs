use camino::Utf8Path;
use psql_cmd::{PgClient, PgError};
use release_name::ReleaseFile;

/// The database operations the lifecycles need. [`PgClient`] is the
/// production implementation; tests inject an in-memory fake.
pub trait Database: std::fmt::Debug {
    fn dbname(&self) -> &str;

    /// Bring the database to the exact state captured in `schema`.
    fn reset_to_schema(&self, schema: &Utf8Path) -> Result<(), PgError>;

    /// Execute one SQL file in one session, stopping at the first error.
    fn apply_sql_file(&self, file: &Utf8Path) -> Result<(), PgError>;

    /// Run a patch script with the connection in the environment and
    /// `cwd` as working directory.
    fn apply_python_file(&self, file: &Utf8Path, cwd: &Utf8Path) -> Result<(), PgError>;

    fn dump_schema(&self, out: &Utf8Path) -> Result<(), PgError>;
    fn dump_metadata(&self, out: &Utf8Path) -> Result<(), PgError>;
    fn dump_seed(&self, out: &Utf8Path, tables: &[String]) -> Result<(), PgError>;

    /// Full backup, for the deployer's pre-apply snapshots.
    fn dump_all(&self, out: &Utf8Path) -> Result<(), PgError>;

    /// Latest row of `half_orm_meta.hop_release`; [`None`] on a fresh
    /// database.
    fn read_current_version(&self) -> Result<Option<ReleaseFile>, PgError>;

    fn write_release_row(&self, release: &ReleaseFile) -> Result<(), PgError>;
}

impl Database for PgClient {
    fn dbname(&self) -> &str {
        PgClient::dbname(self)
    }

    fn reset_to_schema(&self, schema: &Utf8Path) -> Result<(), PgError> {
        PgClient::reset_to_schema(self, schema)
    }

    fn apply_sql_file(&self, file: &Utf8Path) -> Result<(), PgError> {
        PgClient::apply_sql_file(self, file)
    }

    fn apply_python_file(&self, file: &Utf8Path, cwd: &Utf8Path) -> Result<(), PgError> {
        PgClient::apply_python_file(self, file, cwd)
    }

    fn dump_schema(&self, out: &Utf8Path) -> Result<(), PgError> {
        PgClient::dump_schema(self, out)
    }

    fn dump_metadata(&self, out: &Utf8Path) -> Result<(), PgError> {
        PgClient::dump_metadata(self, out)
    }

    fn dump_seed(&self, out: &Utf8Path, tables: &[String]) -> Result<(), PgError> {
        PgClient::dump_seed(self, out, tables)
    }

    fn dump_all(&self, out: &Utf8Path) -> Result<(), PgError> {
        PgClient::dump_all(self, out)
    }

    fn read_current_version(&self) -> Result<Option<ReleaseFile>, PgError> {
        PgClient::read_current_version(self)
    }

    fn write_release_row(&self, release: &ReleaseFile) -> Result<(), PgError> {
        PgClient::write_release_row(self, release)
    }
}
