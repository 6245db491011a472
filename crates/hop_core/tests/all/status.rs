use hop_core::{Context, PatchState};
use release_name::{BumpLevel, ReleasePhase};

use crate::helpers::Sandbox;

#[test]
fn status_reports_production_and_releases() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.hop.create_patch("42-login").unwrap();

    let status = sandbox.hop.status().unwrap();
    assert_eq!(status.context, Context::DevDev);
    assert_eq!(
        status.production.as_ref().unwrap().version,
        crate::helpers::version("1.3.3")
    );
    assert!(status.active_rc.is_none());
    assert_eq!(status.releases.len(), 1);
    let release = &status.releases[0];
    assert_eq!(release.version, crate::helpers::version("1.3.4"));
    assert!(!release.hotfix);
    assert_eq!(release.entries.len(), 1);
    assert_eq!(release.entries[0].1, PatchState::Candidate);
    assert!(status.unlisted_patches.is_empty());
    assert!(status.observed_locks.is_empty());
}

#[test]
fn status_surfaces_notifications_for_lagging_candidates() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.hop.create_patch("9-slow").unwrap();

    // a colleague integrates another patch meanwhile
    sandbox.git().checkout("ho-release/1.3.4").unwrap();
    sandbox.integrate_patch("1-fast");

    sandbox.git().checkout("ho-patch/9-slow").unwrap();
    sandbox.git().fetch().unwrap();
    let status = sandbox.hop.status().unwrap();
    assert_eq!(status.pending_notifications.len(), 1);
    assert!(status.pending_notifications[0].starts_with("[notify] merge_patch"));

    // merging the release branch clears the backlog
    sandbox
        .git()
        .merge_no_ff("origin/ho-release/1.3.4", "Merge ho-release/1.3.4")
        .unwrap();
    let status = sandbox.hop.status().unwrap();
    assert!(status.pending_notifications.is_empty());
}

#[test]
fn status_reports_active_rc_and_context_transitions() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.integrate_patch("42-login");
    sandbox.hop.promote_rc().unwrap();

    let status = sandbox.hop.status().unwrap();
    assert_eq!(status.context, Context::DevProd);
    let rc = status.active_rc.unwrap();
    assert_eq!(rc.version, crate::helpers::version("1.3.4"));
    assert_eq!(rc.phase, ReleasePhase::Candidate(1));

    // a dirty worktree demotes the context
    fs_err::write(sandbox.root().join("scratch.txt"), "wip").unwrap();
    let status = sandbox.hop.status().unwrap();
    assert_eq!(status.context, Context::Dirty);
}

#[test]
fn unlisted_patch_directories_are_flagged() {
    let sandbox = Sandbox::at_production("1.3.3");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();

    // a patch directory with no manifest row (e.g. a failed manifest
    // commit)
    fs_err::create_dir_all(sandbox.root().join("Patches/77-orphan")).unwrap();
    fs_err::write(
        sandbox.root().join("Patches/77-orphan/01.sql"),
        "SELECT 1;",
    )
    .unwrap();
    sandbox.git().add_all_and_commit("orphan patch dir").unwrap();

    let status = sandbox.hop.status().unwrap();
    let unlisted: Vec<String> = status
        .unlisted_patches
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(unlisted, vec!["77-orphan"]);
}
