use git_cmd::test_fixture::TestRepo;

#[test]
fn mv_preserves_staged_rename() {
    test_logs::init();
    let context = TestRepo::new();
    context.commit_file("a.txt", "content", "add a.txt");
    context.repo.mv("a.txt", "b.txt").unwrap();
    context.repo.commit("rename a.txt to b.txt").unwrap();
    assert!(context.repo.directory().join("b.txt").exists());
    assert!(!context.repo.directory().join("a.txt").exists());
    assert!(context.repo.is_clean().unwrap());
}

#[test]
fn reset_hard_discards_local_commits() {
    test_logs::init();
    let context = TestRepo::new();
    let before = context.repo.current_commit_hash().unwrap();
    context.commit_file("x.txt", "x", "unwanted commit");
    context.repo.reset_hard("origin/main").unwrap();
    assert_eq!(context.repo.current_commit_hash().unwrap(), before);
    assert!(!context.repo.directory().join("x.txt").exists());
}

#[test]
fn empty_commits_carry_notifications() {
    test_logs::init();
    let context = TestRepo::new();
    context
        .repo
        .commit_empty("[notify] ho-prod advanced, run `git merge ho-prod`")
        .unwrap();
    let subjects = context.repo.log_subjects("origin/main..main").unwrap();
    assert_eq!(
        subjects,
        vec!["[notify] ho-prod advanced, run `git merge ho-prod`"]
    );
}

#[test]
fn ancestor_checks_detect_divergence() {
    test_logs::init();
    let context = TestRepo::new();
    let repo = &context.repo;
    context.commit_file("y.txt", "y", "local work");
    assert!(repo.is_ancestor_of("origin/main", "main").unwrap());
    assert!(!repo.is_ancestor_of("main", "origin/main").unwrap());
}
