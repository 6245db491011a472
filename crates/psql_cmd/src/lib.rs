//! Typed operations over a PostgreSQL database, driven through the
//! `psql` and `pg_dump` binaries.
//!
//! The wrapper never needs superuser rights: it only drops and
//! recreates schemas owned by the connected role, and reads/writes the
//! `half_orm_meta.hop_release` tracking table. SQL errors bubble up
//! verbatim in [`PgError::Sql`]; connection-level failures are
//! classified so callers can distinguish an unreachable server from a
//! bad password or a missing grant.

mod error;
mod release_row;

pub use error::PgError;
pub use release_row::parse_release_row;

use std::process::{Command, Output};

use camino::Utf8Path;
use release_name::{ReleaseFile, ReleasePhase};
use tracing::{debug, trace};

/// The schema holding hop's own tables.
pub const META_SCHEMA: &str = "half_orm_meta";
/// Version tracking table, the authoritative current version of an
/// attached database.
pub const RELEASE_TABLE: &str = "half_orm_meta.hop_release";

/// Connection parameters, passed to the subprocesses through the
/// standard `PG*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct ConnectionParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: String,
}

#[derive(Debug)]
pub struct PgClient {
    params: ConnectionParams,
}

impl PgClient {
    pub fn new(params: ConnectionParams) -> Self {
        Self { params }
    }

    pub fn dbname(&self) -> &str {
        &self.params.dbname
    }

    fn command(&self, binary: &str) -> Command {
        let mut cmd = Command::new(binary);
        cmd.env("PGDATABASE", &self.params.dbname);
        if let Some(host) = &self.params.host {
            cmd.env("PGHOST", host);
        }
        if let Some(port) = self.params.port {
            cmd.env("PGPORT", port.to_string());
        }
        if let Some(user) = &self.params.user {
            cmd.env("PGUSER", user);
        }
        if let Some(password) = &self.params.password {
            cmd.env("PGPASSWORD", password);
        }
        cmd
    }

    fn run_psql(&self, args: &[&str], file: Option<&Utf8Path>) -> Result<String, PgError> {
        debug!("psql {}", args.join(" "));
        let output = self
            .command("psql")
            .args(["-X", "-q", "-v", "ON_ERROR_STOP=1"])
            .args(args)
            .output()?;
        into_stdout(output, file)
    }

    /// Execute a single SQL statement.
    pub fn execute(&self, sql: &str) -> Result<(), PgError> {
        self.run_psql(&["-c", sql], None)?;
        Ok(())
    }

    /// Execute a SQL file in one session, stopping at the first error.
    pub fn apply_sql_file(&self, path: &Utf8Path) -> Result<(), PgError> {
        self.run_psql(&["-f", path.as_str()], Some(path))?;
        Ok(())
    }

    /// Run a patch script with the connection exposed through the
    /// standard `PG*` environment variables and the repository root as
    /// working directory.
    pub fn apply_python_file(&self, path: &Utf8Path, cwd: &Utf8Path) -> Result<(), PgError> {
        debug!("python3 {path}");
        let output = self
            .command("python3")
            .arg(path.as_str())
            .current_dir(cwd)
            .output()?;
        into_stdout(output, Some(path))?;
        Ok(())
    }

    /// Run a query and return its rows as tab-separated fields.
    pub fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>, PgError> {
        let out = self.run_psql(&["-tA", "-F", "\t", "-c", sql], None)?;
        Ok(out
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.split('\t').map(ToString::to_string).collect())
            .collect())
    }

    pub fn query_scalar(&self, sql: &str) -> Result<Option<String>, PgError> {
        Ok(self.query_rows(sql)?.into_iter().next().and_then(|mut row| {
            if row.is_empty() { None } else { Some(row.remove(0)) }
        }))
    }

    /// Non-system schemas owned by the connected role.
    pub fn owned_schemas(&self) -> Result<Vec<String>, PgError> {
        let sql = "SELECT n.nspname FROM pg_namespace n \
                   JOIN pg_roles r ON r.oid = n.nspowner \
                   WHERE r.rolname = current_user \
                   AND n.nspname NOT IN ('pg_catalog', 'information_schema') \
                   AND n.nspname NOT LIKE 'pg_%' \
                   ORDER BY n.nspname";
        Ok(self
            .query_rows(sql)?
            .into_iter()
            .filter_map(|mut row| if row.is_empty() { None } else { Some(row.remove(0)) })
            .collect())
    }

    /// Bring the database to the exact state captured in `schema_path`.
    ///
    /// Drops every schema the connected role owns, recreates `public`,
    /// then loads the snapshot. Extensions, foreign servers and
    /// database-level settings are left alone: the snapshot only
    /// recreates schema-level objects.
    pub fn reset_to_schema(&self, schema_path: &Utf8Path) -> Result<(), PgError> {
        debug!("resetting {} to {schema_path}", self.params.dbname);
        for schema in self.owned_schemas()? {
            self.execute(&format!("DROP SCHEMA \"{schema}\" CASCADE"))?;
        }
        self.execute("CREATE SCHEMA public")?;
        self.apply_sql_file(schema_path)
    }

    fn pg_dump(&self, args: &[&str], out_path: &Utf8Path) -> Result<(), PgError> {
        debug!("pg_dump {} > {out_path}", args.join(" "));
        let output = self
            .command("pg_dump")
            .args(args)
            .args(["-f", out_path.as_str()])
            .output()?;
        into_stdout(output, Some(out_path))?;
        Ok(())
    }

    /// Dump schema-level DDL suitable for [`PgClient::reset_to_schema`].
    pub fn dump_schema(&self, out_path: &Utf8Path) -> Result<(), PgError> {
        self.pg_dump(
            &["--schema-only", "--no-owner", "--no-privileges"],
            out_path,
        )
    }

    /// Dump the contents of hop's own metadata schema.
    pub fn dump_metadata(&self, out_path: &Utf8Path) -> Result<(), PgError> {
        self.pg_dump(
            &[
                "--data-only",
                "--inserts",
                "--no-owner",
                &format!("--schema={META_SCHEMA}"),
            ],
            out_path,
        )
    }

    /// Dump seed data for the given tables.
    pub fn dump_seed(&self, out_path: &Utf8Path, tables: &[String]) -> Result<(), PgError> {
        let mut args: Vec<String> = vec![
            "--data-only".to_string(),
            "--inserts".to_string(),
            "--no-owner".to_string(),
        ];
        for table in tables {
            args.push(format!("--table={table}"));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.pg_dump(&args, out_path)
    }

    /// Full backup of the database into `out_path`.
    pub fn dump_all(&self, out_path: &Utf8Path) -> Result<(), PgError> {
        self.pg_dump(&["--no-owner"], out_path)
    }

    /// The most recent row of `half_orm_meta.hop_release`, or [`None`]
    /// when the table is empty or absent (fresh database).
    pub fn read_current_version(&self) -> Result<Option<ReleaseFile>, PgError> {
        let sql = format!(
            "SELECT major, minor, patch, pre_release, pre_release_num \
             FROM {RELEASE_TABLE} ORDER BY created_at DESC LIMIT 1"
        );
        let rows = match self.query_rows(&sql) {
            Ok(rows) => rows,
            // a fresh database has no tracking table yet
            Err(PgError::Sql { stderr, .. }) if stderr.contains("does not exist") => return Ok(None),
            Err(e) => return Err(e),
        };
        match rows.into_iter().next() {
            None => Ok(None),
            Some(row) => {
                let fields: Vec<&str> = row.iter().map(String::as_str).collect();
                parse_release_row(&fields).map(Some)
            }
        }
    }

    /// Record a deployed release in the tracking table.
    pub fn write_release_row(&self, release: &ReleaseFile) -> Result<(), PgError> {
        let (pre_release, pre_release_num) = match release.phase {
            ReleasePhase::Production => ("", "NULL".to_string()),
            ReleasePhase::Candidate(n) => ("rc", n.to_string()),
            ReleasePhase::Hotfix(n) => ("hotfix", n.to_string()),
            ReleasePhase::Development => ("", "NULL".to_string()),
        };
        let sql = format!(
            "INSERT INTO {RELEASE_TABLE} \
             (major, minor, patch, pre_release, pre_release_num, created_at) \
             VALUES ({}, {}, {}, '{pre_release}', {pre_release_num}, now())",
            release.version.major, release.version.minor, release.version.patch,
        );
        self.execute(&sql)
    }

    /// Load a full snapshot produced by [`PgClient::dump_all`] back
    /// into the database. Used by restore tooling; deployment goes
    /// through [`PgClient::reset_to_schema`].
    pub fn load_snapshot(&self, path: &Utf8Path) -> Result<(), PgError> {
        self.apply_sql_file(path)
    }
}

fn into_stdout(output: Output, file: Option<&Utf8Path>) -> Result<String, PgError> {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    trace!("status {}, stderr: {stderr}", output.status);
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(error::classify(&stderr, file))
    }
}
