use release_name::{BumpLevel, ReleaseFile, ReleasePhase};

use crate::helpers::{Sandbox, version};

/// Two production releases on top of the seeded 0.1.0.
fn sandbox_with_two_releases() -> Sandbox {
    let sandbox = Sandbox::at_production("0.1.0");
    sandbox.hop.new_release(BumpLevel::Minor).unwrap();
    sandbox.integrate_patch("1-first");
    sandbox.hop.promote_rc().unwrap();
    sandbox.hop.promote_prod().unwrap(); // 0.2.0

    sandbox.hop.new_release(BumpLevel::Minor).unwrap();
    sandbox.integrate_patch("2-second");
    sandbox.hop.promote_rc().unwrap();
    sandbox.hop.promote_prod().unwrap(); // 0.3.0
    sandbox
}

#[test]
fn deploy_replays_snapshots_past_the_current_version() {
    let sandbox = sandbox_with_two_releases();
    sandbox.db.set_current(Some(ReleaseFile::new(
        version("0.1.0"),
        ReleasePhase::Production,
    )));
    let log_before = sandbox.db.log().len();

    let report = sandbox.hop.deploy(&version("0.3.0")).unwrap();
    let applied: Vec<String> = report.applied.iter().map(ReleaseFile::file_name).collect();
    assert_eq!(applied, vec!["0.2.0.txt", "0.3.0.txt"]);
    assert!(!report.fresh_load);
    assert_eq!(report.backups.len(), 2);
    for backup in &report.backups {
        assert!(backup.is_file(), "{backup} missing");
    }

    let log: Vec<String> = sandbox.db.log()[log_before..].to_vec();
    assert_eq!(
        log,
        vec![
            "dump_all fake-0.2.0-pre.dump",
            "apply 01.sql",
            "row 0.2.0",
            "dump_all fake-0.3.0-pre.dump",
            "apply 01.sql",
            "row 0.3.0",
        ]
    );
}

#[test]
fn deploy_stops_at_the_requested_target() {
    let sandbox = sandbox_with_two_releases();
    sandbox.db.set_current(Some(ReleaseFile::new(
        version("0.1.0"),
        ReleasePhase::Production,
    )));
    let report = sandbox.hop.deploy(&version("0.2.0")).unwrap();
    let applied: Vec<String> = report.applied.iter().map(ReleaseFile::file_name).collect();
    assert_eq!(applied, vec!["0.2.0.txt"]);
}

#[test]
fn fresh_database_is_fast_pathed_from_the_model() {
    let sandbox = sandbox_with_two_releases();
    sandbox.db.set_current(None);
    let log_before = sandbox.db.log().len();

    let report = sandbox.hop.deploy(&version("0.3.0")).unwrap();
    assert!(report.fresh_load);
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].file_name(), "0.3.0.txt");

    let log: Vec<String> = sandbox.db.log()[log_before..].to_vec();
    assert_eq!(
        log,
        vec!["reset schema-0.3.0.sql", "apply metadata-0.3.0.sql", "row 0.3.0"]
    );
    assert_eq!(
        sandbox.db.current().unwrap().version,
        version("0.3.0")
    );
}

#[test]
fn up_to_date_database_is_a_no_op() {
    let sandbox = sandbox_with_two_releases();
    sandbox.db.set_current(Some(ReleaseFile::new(
        version("0.3.0"),
        ReleasePhase::Production,
    )));
    let report = sandbox.hop.deploy(&version("0.3.0")).unwrap();
    assert!(report.applied.is_empty());
    assert!(report.backups.is_empty());
}
