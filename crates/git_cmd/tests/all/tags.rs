use git_cmd::{GitError, PushOutcome, test_fixture::TestRepo};

#[test]
fn tags_are_created_listed_and_deleted() {
    test_logs::init();
    let context = TestRepo::new();
    let repo = &context.repo;
    repo.create_tag("lock-main-1000", None, None).unwrap();
    repo.create_tag("release-1.0.0", None, Some("Release 1.0.0"))
        .unwrap();

    assert!(repo.tag_exists("lock-main-1000").unwrap());
    assert_eq!(
        repo.list_tags("lock-main-*").unwrap(),
        vec!["lock-main-1000"]
    );

    repo.delete_tag("lock-main-1000").unwrap();
    assert!(!repo.tag_exists("lock-main-1000").unwrap());
}

#[test]
fn duplicate_tag_creation_fails() {
    test_logs::init();
    let context = TestRepo::new();
    let repo = &context.repo;
    repo.create_tag("t", None, None).unwrap();
    let err = repo.create_tag("t", None, None).unwrap_err();
    assert!(matches!(err, GitError::TagExists(name) if name == "t"));
}

#[test]
fn deleting_a_missing_tag_fails() {
    test_logs::init();
    let context = TestRepo::new();
    let err = context.repo.delete_tag("missing").unwrap_err();
    assert!(matches!(err, GitError::TagMissing(name) if name == "missing"));
}

#[test]
fn first_tag_push_wins_the_race() {
    test_logs::init();
    let context = TestRepo::new();
    let winner = &context.repo;
    let loser = context.clone_repo("other");

    // the loser tags a different commit under the same name
    loser.commit_empty("diverging commit").unwrap();
    winner.create_tag("patch-id/42-login", None, None).unwrap();
    assert_eq!(
        winner.push_tag("patch-id/42-login").unwrap(),
        PushOutcome::Accepted
    );

    loser.create_tag("patch-id/42-login", None, None).unwrap();
    assert_eq!(
        loser.push_tag("patch-id/42-login").unwrap(),
        PushOutcome::Rejected
    );
}

#[test]
fn remote_tag_deletion_makes_the_name_reusable() {
    test_logs::init();
    let context = TestRepo::new();
    let repo = &context.repo;
    repo.create_tag("patch-id/7", None, None).unwrap();
    assert_eq!(repo.push_tag("patch-id/7").unwrap(), PushOutcome::Accepted);

    repo.delete_tag("patch-id/7").unwrap();
    repo.delete_remote_tag("patch-id/7").unwrap();

    repo.create_tag("patch-id/7", None, None).unwrap();
    assert_eq!(repo.push_tag("patch-id/7").unwrap(), PushOutcome::Accepted);
}
