use release_name::{ReleaseFile, ReleasePhase};
use semver::Version;

use crate::PgError;

/// Decode one row of `half_orm_meta.hop_release` into a release.
///
/// Expected fields: `major, minor, patch, pre_release, pre_release_num`.
/// An empty `pre_release` marks a production deployment; `rc` and
/// `hotfix` carry their number in `pre_release_num`.
pub fn parse_release_row(fields: &[&str]) -> Result<ReleaseFile, PgError> {
    let malformed = |detail: &str| PgError::Sql {
        file: None,
        stderr: format!("malformed hop_release row {fields:?}: {detail}"),
    };

    let [major, minor, patch, pre_release, pre_release_num] = fields else {
        return Err(malformed("expected 5 fields"));
    };
    let major: u64 = major.parse().map_err(|_| malformed("bad major"))?;
    let minor: u64 = minor.parse().map_err(|_| malformed("bad minor"))?;
    let patch: u64 = patch.parse().map_err(|_| malformed("bad patch"))?;
    let version = Version::new(major, minor, patch);

    let phase = match *pre_release {
        "" => ReleasePhase::Production,
        kind @ ("rc" | "hotfix") => {
            let n: u32 = pre_release_num
                .parse()
                .map_err(|_| malformed("bad pre_release_num"))?;
            if kind == "rc" {
                ReleasePhase::Candidate(n)
            } else {
                ReleasePhase::Hotfix(n)
            }
        }
        other => return Err(malformed(&format!("unknown pre_release `{other}`"))),
    };

    Ok(ReleaseFile::new(version, phase))
}
