//! Throwaway repositories for tests: a bare `origin` plus one or more
//! working clones, all living in a temporary directory that is removed
//! on drop.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};

use crate::Repo;

#[derive(Debug)]
pub struct TestRepo {
    // Held for its Drop: deleting it removes origin and every clone.
    tmp_dir: tempfile::TempDir,
    origin: Utf8PathBuf,
    pub repo: Repo,
}

impl TestRepo {
    /// A bare origin with a single clone positioned on an initial commit.
    pub fn new() -> Self {
        let tmp_dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(tmp_dir.path()).unwrap().to_path_buf();
        let origin = base.join("origin.git");

        run(&base, &["init", "--bare", "--initial-branch=main", origin.as_str()]);
        let work = base.join("work");
        run(&base, &["clone", origin.as_str(), work.as_str()]);
        configure_user(&work);
        run(&work, &["commit", "--allow-empty", "-m", "initial commit"]);
        run(&work, &["push", "-u", "origin", "main"]);

        let repo = Repo::new(work).unwrap();
        Self {
            tmp_dir,
            origin,
            repo,
        }
    }

    pub fn origin_url(&self) -> &str {
        self.origin.as_str()
    }

    /// A second clone of the same origin, simulating another machine.
    pub fn clone_repo(&self, name: &str) -> Repo {
        let base = Utf8Path::from_path(self.tmp_dir.path()).unwrap();
        let dir = base.join(name);
        run(base, &["clone", self.origin.as_str(), dir.as_str()]);
        configure_user(&dir);
        Repo::new(dir).unwrap()
    }

    /// Write `content` to `path` (relative to the working copy), stage
    /// and commit it.
    pub fn commit_file(&self, path: &str, content: &str, message: &str) {
        let file = self.repo.directory().join(path);
        if let Some(parent) = file.parent() {
            fs_err::create_dir_all(parent).unwrap();
        }
        fs_err::write(&file, content).unwrap();
        self.repo.add(&[path]).unwrap();
        self.repo.commit(message).unwrap();
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn configure_user(dir: &Utf8Path) {
    run(dir, &["config", "user.name", "hop test"]);
    run(dir, &["config", "user.email", "hop@example.com"]);
    run(dir, &["config", "commit.gpgsign", "false"]);
}

fn run(dir: &Utf8Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
