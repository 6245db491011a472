use std::time::{SystemTime, UNIX_EPOCH};

use hop_core::{CoordinationError, ExitClass, HopError, LockScope, LockService};
use release_name::BumpLevel;

use crate::helpers::Sandbox;

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis()
}

#[test]
fn promotion_is_blocked_by_a_live_lock() {
    let sandbox = Sandbox::at_production("1.0.0");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.integrate_patch("1-a");

    // somebody else holds the production lock
    let tag = format!("lock-ho-prod-{}", now_ms());
    let git = sandbox.git();
    git.create_tag(&tag, None, None).unwrap();
    git.push_tag(&tag).unwrap();

    let err = sandbox.hop.promote_rc().unwrap_err();
    assert_eq!(err.exit_class(), ExitClass::Coordination);
    match err {
        HopError::Coordination(CoordinationError::Busy { tag: busy, .. }) => {
            assert_eq!(busy, tag);
        }
        other => panic!("expected Busy, got {other}"),
    }
}

#[test]
fn stale_locks_are_swept_before_acquiring() {
    let sandbox = Sandbox::at_production("1.0.0");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.integrate_patch("1-a");

    // a lock from a dead process, 31 minutes old
    let stale = format!("lock-ho-prod-{}", now_ms() - 31 * 60 * 1000);
    let git = sandbox.git();
    git.create_tag(&stale, None, None).unwrap();
    git.push_tag(&stale).unwrap();

    sandbox.hop.promote_rc().unwrap();
    assert!(!git.tag_exists(&stale).unwrap());
}

#[test]
fn the_lock_is_released_on_success_and_failure() {
    let sandbox = Sandbox::at_production("1.0.0");
    sandbox.hop.new_release(BumpLevel::Patch).unwrap();
    sandbox.integrate_patch("1-a");

    sandbox.hop.promote_rc().unwrap();
    assert!(sandbox.git().list_tags("lock-*").unwrap().is_empty());
}

#[test]
fn a_failing_promotion_releases_the_lock() {
    let sandbox = Sandbox::at_production("1.0.0");
    // no release candidate exists: the failure happens while the lock
    // is held
    let err = sandbox.hop.promote_prod().unwrap_err();
    assert!(matches!(err, HopError::Precondition(_)));
    sandbox.git().fetch().unwrap();
    assert!(sandbox.git().list_tags("lock-*").unwrap().is_empty());
}

#[test]
fn scoped_locks_do_not_collide() {
    let sandbox = Sandbox::at_production("1.0.0");
    let git = sandbox.git();
    let locks = LockService::new(git);

    let prod = locks.acquire(&LockScope::Prod).unwrap();
    let release = locks
        .acquire(&LockScope::Release(crate::helpers::version("1.0.1")))
        .unwrap();
    assert_ne!(prod.tag(), release.tag());

    let err = locks.acquire(&LockScope::Prod).unwrap_err();
    assert!(matches!(
        err,
        HopError::Coordination(CoordinationError::Busy { .. })
    ));

    drop(prod);
    drop(release);
    git.fetch().unwrap();
    assert!(git.list_tags("lock-*").unwrap().is_empty());
    locks.acquire(&LockScope::Prod).unwrap();
}
