use camino::{Utf8Path, Utf8PathBuf};
use hop_core::{Database, ExitClass, HopError, SchemaGenerator, ValidationError};
use release_name::BumpLevel;

use crate::helpers::Sandbox;

#[test]
fn merge_patch_stages_and_cleans_up() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.hop.create_patch("42-login").unwrap();
    sandbox.commit_patch_file("42-login", "01.sql", "CREATE TABLE t(id int);");

    let report = sandbox.hop.merge_patch().unwrap();
    assert_eq!(report.branches_deleted, vec!["ho-patch/42-login"]);
    assert_eq!(report.notifications_emitted.len(), 1);

    let git = sandbox.git();
    // we end on the release branch, fully pushed
    assert_eq!(git.current_branch().unwrap(), "ho-release/1.3.4");
    assert!(git.is_synced_with("ho-release/1.3.4").unwrap());

    // patch branch gone everywhere, reservation tag still there
    assert!(!git.branch_exists("ho-patch/42-login").unwrap());
    assert!(!git.remote_branch_exists("ho-patch/42-login").unwrap());
    assert!(git.tag_exists("patch-id/42-login").unwrap());

    // no ephemeral branch survives
    assert!(!git.branch_exists("ho-validate/42-login").unwrap());

    // the manifest records the staged state
    let manifest = sandbox
        .manifest_on("ho-release/1.3.4", "1.3.4")
        .unwrap();
    assert!(manifest.contains("42-login = \"staged\""));

    // the merge commit closes the issue
    let subjects = git
        .log_subjects("origin/ho-prod..ho-release/1.3.4")
        .unwrap();
    assert!(
        subjects
            .iter()
            .any(|subject| subject.contains("Merge ho-patch/42-login into ho-release/1.3.4")),
        "missing merge commit in {subjects:?}"
    );
    let body = git
        .git(&["log", "--format=%B", "origin/ho-prod..ho-release/1.3.4"])
        .unwrap();
    assert!(body.contains("Closes #42"));

    // validation replayed the patch against a pristine schema
    let applied = sandbox.db.applied_files();
    assert_eq!(applied, vec!["01.sql"]);
}

#[test]
fn broken_sql_aborts_the_merge_without_a_trace() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.hop.create_patch("13").unwrap();
    sandbox.commit_patch_file("13", "01.sql", "CREATE TABLE broken;");
    sandbox.db.fail_applying("01.sql");

    let release_head_before = {
        let git = sandbox.git();
        git.git(&["rev-parse", "ho-release/1.3.4"]).unwrap()
    };

    let err = sandbox.hop.merge_patch().unwrap_err();
    assert_eq!(err.exit_class(), ExitClass::Validation);
    assert!(matches!(
        err,
        HopError::Validation(ValidationError::ApplyFailed { .. })
    ));

    let git = sandbox.git();
    assert_eq!(git.current_branch().unwrap(), "ho-patch/13");
    assert!(!git.branch_exists("ho-validate/13").unwrap());
    assert_eq!(
        git.git(&["rev-parse", "ho-release/1.3.4"]).unwrap(),
        release_head_before
    );
    // the manifest still lists the patch as candidate
    let manifest = sandbox.manifest_on("ho-release/1.3.4", "1.3.4").unwrap();
    assert!(manifest.contains("13 = \"candidate\""));
    // no lock tag left behind
    assert!(git.list_tags("lock-*").unwrap().is_empty());
}

#[test]
fn failing_test_suite_aborts_the_merge() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.hop.create_patch("8").unwrap();
    sandbox.commit_patch_file("8", "01.sql", "CREATE TABLE t(id int);");
    // a configured runner with nothing collectable exits non-zero
    fs_err::write(sandbox.root().join("pytest.ini"), "[pytest]\n").unwrap();
    sandbox.git().add_all_and_commit("enable test gate").unwrap();

    let err = sandbox.hop.merge_patch().unwrap_err();
    assert_eq!(err.exit_class(), ExitClass::Validation);

    let git = sandbox.git();
    assert_eq!(git.current_branch().unwrap(), "ho-patch/8");
    assert!(!git.branch_exists("ho-validate/8").unwrap());
    assert!(git.remote_branch_exists("ho-patch/8").unwrap());
    assert!(git.list_tags("lock-*").unwrap().is_empty());
}

/// A generator that writes a file the patch author forgot to commit:
/// the replay is then not idempotent with the declared state.
#[derive(Debug)]
struct UncommittedFileGenerator;

impl SchemaGenerator for UncommittedFileGenerator {
    fn generate(&self, _db: &dyn Database, root: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>> {
        let path = root.join("generated_model.py");
        fs_err::write(&path, "# generated\n")?;
        Ok(vec![path])
    }
}

#[test]
fn non_idempotent_replay_is_rejected() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();

    // a second orchestrator over the same clone, with the generator
    // that leaves uncommitted output behind
    let db = sandbox.db.clone();
    let repo = hop_core::Repo::open(sandbox.root().to_path_buf()).unwrap();
    let hop = hop_core::Orchestrator::new(repo, Box::new(db))
        .with_generator(Box::new(UncommittedFileGenerator));

    hop.create_patch("21").unwrap();
    sandbox.commit_patch_file("21", "01.sql", "INSERT INTO t VALUES (1);");

    let err = hop.merge_patch().unwrap_err();
    assert_eq!(err.exit_class(), ExitClass::Validation);
    match err {
        HopError::Validation(ValidationError::IdempotencyViolation { paths }) => {
            assert_eq!(paths, vec!["generated_model.py"]);
        }
        other => panic!("expected an idempotency violation, got {other}"),
    }
    // the working tree is clean again and the release branch untouched
    let git = sandbox.git();
    assert!(git.is_clean().unwrap());
    assert!(!git.branch_exists("ho-validate/21").unwrap());
}

#[test]
fn merging_twice_is_refused() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.integrate_patch("5");

    // recreate the branch by hand to try again
    let git = sandbox.git();
    git.create_branch("ho-patch/5", "ho-release/1.3.4").unwrap();
    git.checkout("ho-patch/5").unwrap();

    let err = sandbox.hop.merge_patch().unwrap_err();
    assert!(matches!(
        err,
        HopError::Precondition(hop_core::PreconditionError::AlreadyStaged { .. })
    ));
}
