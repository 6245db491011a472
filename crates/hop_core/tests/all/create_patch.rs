use hop_core::{ExitClass, HopError, Orchestrator, Repo};
use release_name::BumpLevel;

use crate::helpers::Sandbox;

#[test]
fn create_patch_reserves_branch_directory_and_manifest_row() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();

    let report = sandbox.hop.create_patch("42-login").unwrap();
    assert_eq!(report.tags_pushed, vec!["patch-id/42-login"]);

    let git = sandbox.git();
    assert_eq!(git.current_branch().unwrap(), "ho-patch/42-login");
    assert!(sandbox.root().join("Patches/42-login/README.md").is_file());
    assert!(git.tag_exists("patch-id/42-login").unwrap());
    assert!(git.remote_branch_exists("ho-patch/42-login").unwrap());

    // the candidate row landed on the release branch and was pushed
    let manifest = sandbox
        .manifest_on("origin/ho-release/1.3.4", "1.3.4")
        .unwrap();
    assert!(manifest.contains("42-login = \"candidate\""));
}

#[test]
fn create_patch_requires_a_release_branch() {
    let sandbox = Sandbox::at_production("1.3.3");
    let err = sandbox.hop.create_patch("42-login").unwrap_err();
    assert_eq!(err.exit_class(), ExitClass::Precondition);
}

#[test]
fn malformed_patch_id_is_rejected() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    let err = sandbox.hop.create_patch("login-42").unwrap_err();
    assert!(matches!(err, HopError::Precondition(_)));
}

#[test]
fn duplicate_creation_fails_and_leaves_remote_untouched() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.hop.create_patch("7").unwrap();

    // back on the release branch, a second attempt must fail fast
    sandbox.git().checkout("ho-release/1.3.4").unwrap();
    let err = sandbox.hop.create_patch("7").unwrap_err();
    assert_eq!(err.exit_class(), ExitClass::Precondition);
}

#[test]
fn losing_the_reservation_race_rolls_back_cleanly() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();

    // another machine won the race for the id: its reservation tag is
    // on the remote, its branch push still in flight
    let rival = sandbox.fixture.clone_repo("rival");
    rival.commit_empty("rival work").unwrap();
    rival.create_tag("patch-id/99-x", None, None).unwrap();
    rival.push_tag("patch-id/99-x").unwrap();

    let err = sandbox.hop.create_patch("99-x").unwrap_err();
    assert_eq!(err.exit_class(), ExitClass::Coordination);
    // no local traces: directory gone, branch gone, back on the release
    assert!(!sandbox.root().join("Patches/99-x").exists());
    assert!(!sandbox.git().branch_exists("ho-patch/99-x").unwrap());
    assert_eq!(
        sandbox.git().current_branch().unwrap(),
        "ho-release/1.3.4"
    );
    assert!(!sandbox.git().remote_branch_exists("ho-patch/99-x").unwrap());
}

#[test]
fn second_clone_can_create_patches_too() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();

    let other = sandbox.fixture.clone_repo("colleague");
    other.checkout("ho-release/1.3.4").unwrap();
    let colleague = Orchestrator::new(
        Repo::open(other.directory().to_path_buf()).unwrap(),
        Box::new(crate::helpers::FakeDb::new()),
    );
    colleague.create_patch("7-other").unwrap();
    assert!(sandbox.git().fetch().is_ok());
    assert!(sandbox.git().tag_exists("patch-id/7-other").unwrap());
}
