use hop_core::{MigrationOutcome, Orchestrator, Repo};
use semver::Version;

use crate::helpers::{FakeDb, Sandbox};

#[test]
fn current_repositories_have_nothing_to_migrate() {
    let sandbox = Sandbox::at_production("1.0.0");
    let mut hop = rebuild(&sandbox);
    let results = hop.migrate().unwrap();
    assert!(results.is_empty());
}

#[test]
fn legacy_layout_moves_under_hop_dir() {
    let sandbox = Sandbox::at_production("1.0.0");
    let git = sandbox.git();

    // rewind the recorded tool version and recreate the legacy layout:
    // releases/ and model/ at the repository root, nothing under .hop/
    let config_path = sandbox.root().join(".hop/config");
    let config = fs_err::read_to_string(&config_path)
        .unwrap()
        .replace("0.17.1", "0.16.0");
    fs_err::write(&config_path, config).unwrap();
    git.git(&["rm", "-r", "-q", ".hop/releases", ".hop/model"])
        .unwrap();
    fs_err::create_dir_all(sandbox.root().join("releases")).unwrap();
    fs_err::write(sandbox.root().join("releases/legacy.txt"), "# legacy\n").unwrap();
    git.add_all_and_commit("simulate pre-0.17 layout").unwrap();

    let mut hop = rebuild(&sandbox);
    let results = hop.migrate().unwrap();
    assert_eq!(
        results,
        vec![(Version::new(0, 17, 1), MigrationOutcome::Migrated)]
    );

    assert!(
        sandbox
            .root()
            .join(".hop/releases/legacy.txt")
            .is_file()
    );
    assert!(!sandbox.root().join("releases").exists());
    let gitignore = fs_err::read_to_string(sandbox.root().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".hop/backups/"));

    let last = git.git(&["log", "-1", "--format=%s"]).unwrap();
    assert_eq!(last, "[migrate 0.17.1] move metadata under .hop/");

    // the recorded version moved, so a second run is a no-op
    let mut hop = rebuild(&sandbox);
    assert!(hop.migrate().unwrap().is_empty());
}

fn rebuild(sandbox: &Sandbox) -> Orchestrator {
    Orchestrator::new(
        Repo::open(sandbox.root().to_path_buf()).unwrap(),
        Box::new(FakeDb::new()),
    )
}
