use camino::{Utf8Path, Utf8PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PgError {
    #[error("database unreachable: {0}")]
    Unreachable(String),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{}: {stderr}", file.as_ref().map_or_else(|| "SQL error".to_string(), |f| format!("error applying {f}")))]
    Sql {
        file: Option<Utf8PathBuf>,
        stderr: String,
    },
    #[error("failed to spawn subprocess: {0}")]
    Io(#[from] std::io::Error),
}

/// Classify a failed subprocess from its stderr.
///
/// Everything that is not a connection-level failure is an SQL error,
/// reported unwrapped: hiding the server's message would only make the
/// patch author's life harder.
pub(crate) fn classify(stderr: &str, file: Option<&Utf8Path>) -> PgError {
    let lower = stderr.to_lowercase();
    if lower.contains("could not connect")
        || lower.contains("connection refused")
        || lower.contains("could not translate host name")
        || lower.contains("is the server running")
        || lower.contains("timeout expired")
    {
        PgError::Unreachable(stderr.to_string())
    } else if lower.contains("password authentication failed")
        || lower.contains("no password supplied")
        || (lower.contains("role") && lower.contains("does not exist"))
    {
        PgError::AuthFailed(stderr.to_string())
    } else if lower.contains("permission denied") {
        PgError::PermissionDenied(stderr.to_string())
    } else {
        PgError::Sql {
            file: file.map(Utf8Path::to_path_buf),
            stderr: stderr.to_string(),
        }
    }
}
