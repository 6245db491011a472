use hop_core::{ExitClass, HopError, InvariantError};
use pretty_assertions::assert_eq;
use release_name::{BumpLevel, ReleasePhase};

use crate::helpers::Sandbox;

#[test]
fn create_release_opens_a_branch_with_an_empty_manifest() {
    let sandbox = Sandbox::at_production("1.3.3");
    let report = sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    assert_eq!(report.identifiers, vec!["1.3.4"]);

    let git = sandbox.git();
    assert_eq!(git.current_branch().unwrap(), "ho-release/1.3.4");
    assert!(git.remote_branch_exists("ho-release/1.3.4").unwrap());
    let manifest = sandbox.manifest_on("HEAD", "1.3.4").unwrap();
    assert_eq!(manifest, "[patches]\n");
}

#[test]
fn release_levels_stack_on_in_flight_releases() {
    let sandbox = Sandbox::at_production("0.1.0");
    sandbox.hop.new_release(BumpLevel::Minor).unwrap();
    sandbox.hop.new_release(BumpLevel::Minor).unwrap();
    sandbox.hop.new_release(BumpLevel::Major).unwrap();

    let git = sandbox.git();
    for branch in ["ho-release/0.2.0", "ho-release/0.3.0", "ho-release/1.0.0"] {
        assert!(git.remote_branch_exists(branch).unwrap(), "{branch} missing");
    }
    let err = sandbox.hop.new_release(BumpLevel::Major).unwrap_err();
    assert!(matches!(
        err,
        HopError::Precondition(hop_core::PreconditionError::ReleaseExists(_))
    ));
}

#[test]
fn single_patch_release_reaches_production() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.integrate_patch("42-login");

    let rc = sandbox.hop.promote_rc().unwrap();
    assert_eq!(rc.identifiers, vec!["1.3.4-rc1.txt"]);
    assert_eq!(rc.tags_pushed, vec!["release-rc-1.3.4-1"]);

    let git = sandbox.git();
    assert_eq!(git.current_branch().unwrap(), "ho-prod");
    let snapshot = sandbox.read_snapshot("1.3.4-rc1.txt");
    assert_eq!(snapshot, "# Release 1.3.4-rc1\n42-login\n");
    // staged rows moved out of the manifest, candidates would remain
    let manifest = sandbox.manifest_on("ho-release/1.3.4", "1.3.4").unwrap();
    assert!(!manifest.contains("42-login"));

    let prod = sandbox.hop.promote_prod().unwrap();
    assert_eq!(prod.tags_pushed, vec!["release-1.3.4"]);
    assert_eq!(prod.branches_deleted, vec!["ho-release/1.3.4"]);

    assert!(sandbox.root().join(".hop/releases/1.3.4.txt").is_file());
    assert!(!sandbox.root().join(".hop/releases/1.3.4-rc1.txt").exists());
    assert!(
        !sandbox
            .root()
            .join(".hop/releases/1.3.4-patches.toml")
            .exists()
    );

    // the symlink now names the new production schema
    let target = std::fs::read_link(sandbox.root().join(".hop/model/schema.sql")).unwrap();
    assert_eq!(target.to_str().unwrap(), "schema-1.3.4.sql");
    assert!(sandbox.root().join(".hop/model/schema-1.3.4.sql").is_file());
    assert!(
        sandbox
            .root()
            .join(".hop/model/metadata-1.3.4.sql")
            .is_file()
    );

    // the replica was rebuilt from the previous schema and recorded
    let log = sandbox.db.log();
    assert!(log.contains(&"reset schema.sql".to_string()));
    assert!(log.contains(&"row 1.3.4".to_string()));
    let current = sandbox.db.current().unwrap();
    assert_eq!(current.version, crate::helpers::version("1.3.4"));
    assert_eq!(current.phase, ReleasePhase::Production);

    assert!(!sandbox.git().remote_branch_exists("ho-release/1.3.4").unwrap());
}

#[test]
fn empty_release_promotes_with_an_empty_snapshot() {
    let sandbox = Sandbox::at_production("0.1.0");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();

    sandbox.hop.promote_rc().unwrap();
    let snapshot = sandbox.read_snapshot("0.1.1-rc1.txt");
    assert_eq!(snapshot, "# Release 0.1.1-rc1\n");

    sandbox.hop.promote_prod().unwrap();
    assert!(sandbox.root().join(".hop/releases/0.1.1.txt").is_file());
}

#[test]
fn promotion_is_sequential() {
    let sandbox = Sandbox::at_production("0.1.0");
    sandbox.hop.new_release(BumpLevel::Minor).unwrap(); // 0.2.0
    sandbox.hop.new_release(BumpLevel::Minor).unwrap(); // 0.3.0
    sandbox.hop.new_release(BumpLevel::Major).unwrap(); // 1.0.0

    // stage work on 0.3.0 and 1.0.0, leave 0.2.0 empty
    sandbox.git().checkout("ho-release/0.3.0").unwrap();
    sandbox.integrate_patch("30-a");
    sandbox.git().checkout("ho-release/1.0.0").unwrap();
    sandbox.integrate_patch("100-a");

    let err = sandbox.hop.promote_rc().unwrap_err();
    match err {
        HopError::Invariant(InvariantError::SequentialityViolated {
            attempted,
            must_first,
        }) => {
            assert_eq!(attempted, crate::helpers::version("0.3.0"));
            assert_eq!(must_first, crate::helpers::version("0.2.0"));
        }
        other => panic!("expected a sequentiality violation, got {other}"),
    }

    // stage work on 0.2.0; promotion picks it up
    sandbox.git().checkout("ho-release/0.2.0").unwrap();
    sandbox.integrate_patch("20-a");
    let report = sandbox.hop.promote_rc().unwrap();
    assert_eq!(report.identifiers, vec!["0.2.0-rc1.txt"]);

    // a second rc for another version is blocked while 0.2.0 is active
    let err = sandbox.hop.promote_rc().unwrap_err();
    assert!(matches!(
        err,
        HopError::Invariant(InvariantError::ActiveRcExists { .. })
    ));

    sandbox.hop.promote_prod().unwrap();
    let report = sandbox.hop.promote_rc().unwrap();
    assert_eq!(report.identifiers, vec!["0.3.0-rc1.txt"]);
}

#[test]
fn rc_numbers_increment_per_version() {
    let sandbox = Sandbox::at_production("1.0.0");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.integrate_patch("1-a");
    sandbox.hop.promote_rc().unwrap();

    sandbox.git().checkout("ho-release/1.0.1").unwrap();
    sandbox.integrate_patch("2-b");
    let report = sandbox.hop.promote_rc().unwrap();
    assert_eq!(report.identifiers, vec!["1.0.1-rc2.txt"]);
    let snapshot = sandbox.read_snapshot("1.0.1-rc2.txt");
    assert_eq!(snapshot, "# Release 1.0.1-rc2\n2-b\n");
}

#[test]
fn promote_prod_without_an_rc_is_refused() {
    let sandbox = Sandbox::at_production("1.0.0");
    let err = sandbox.hop.promote_prod().unwrap_err();
    assert_eq!(err.exit_class(), ExitClass::Precondition);
}

#[test]
fn rc_notifies_surviving_patch_branches() {
    let sandbox = Sandbox::at_production("1.0.0");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.hop.create_patch("9-slow").unwrap();
    sandbox.git().checkout("ho-release/1.0.1").unwrap();
    sandbox.integrate_patch("1-fast");

    let report = sandbox.hop.promote_rc().unwrap();
    assert_eq!(report.notifications_emitted, vec!["ho-patch/9-slow"]);

    let git = sandbox.git();
    let last = git
        .git(&["log", "-1", "--format=%s", "ho-patch/9-slow"])
        .unwrap();
    assert!(last.starts_with("[notify] promote_to_rc"), "got {last}");
}
