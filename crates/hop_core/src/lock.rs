use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use git_cmd::PushOutcome;
use semver::Version;
use tracing::{debug, warn};

use crate::{CoordinationError, PROD_BRANCH, PatchId, Result};

/// Locks older than this may be reclaimed by anyone: their owner is
/// assumed dead.
pub const LOCK_STALENESS: Duration = Duration::from_secs(30 * 60);

/// What a mutual-exclusion lock protects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockScope {
    /// Promotions and deployments: anything that moves `ho-prod`.
    Prod,
    /// Integration of patches into one release.
    Release(Version),
}

impl LockScope {
    fn label(&self) -> String {
        match self {
            Self::Prod => PROD_BRANCH.to_string(),
            Self::Release(version) => version.to_string(),
        }
    }

    fn tag_glob(&self) -> String {
        format!("lock-{}-*", self.label())
    }

    fn tag_for(&self, unix_ms: u128) -> String {
        format!("lock-{}-{unix_ms}", self.label())
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Distributed coordination over git tags.
///
/// Both primitives rest on the same property: a tag push is atomic on
/// the remote, so the first pusher wins and every loser observes the
/// rejection.
#[derive(Debug)]
pub struct LockService<'a> {
    git: &'a git_cmd::Repo,
}

impl<'a> LockService<'a> {
    pub fn new(git: &'a git_cmd::Repo) -> Self {
        Self { git }
    }

    /// Reserve the patch id globally by pushing `patch-id/<id>` at the
    /// commit that materializes `Patches/<id>/`.
    ///
    /// A successful push is the point of no return of patch creation:
    /// the id is allocated forever (unless the tag is deleted
    /// out-of-band).
    pub fn reserve_patch(&self, id: &PatchId) -> Result<()> {
        let tag = id.tag_name();
        self.git.fetch()?;
        if self.git.tag_exists(&tag)? {
            return Err(CoordinationError::ReservedElsewhere { id: id.clone() }.into());
        }
        self.git.create_tag(&tag, None, None)?;
        match self.git.push_tag(&tag)? {
            PushOutcome::Accepted => {
                debug!("reserved patch id {id}");
                Ok(())
            }
            PushOutcome::Rejected => {
                // concurrent winner; leave no local trace
                if let Err(e) = self.git.delete_tag(&tag) {
                    warn!("failed to delete local tag {tag}: {e}");
                }
                Err(CoordinationError::ReservedElsewhere { id: id.clone() }.into())
            }
        }
    }

    /// Acquire the mutual-exclusion lock for `scope`.
    ///
    /// Stale locks are swept best-effort before giving up. The returned
    /// guard releases the lock on drop, whatever the exit path.
    pub fn acquire(&self, scope: &LockScope) -> Result<LockGuard<'a>> {
        self.git.fetch()?;
        let now_ms = unix_ms();
        for tag in self.git.list_tags(&scope.tag_glob())? {
            match lock_age(&tag, now_ms) {
                Some(age) if age >= LOCK_STALENESS => {
                    warn!("sweeping stale lock {tag} (age {}s)", age.as_secs());
                    if let Err(e) = self.git.delete_tag(&tag) {
                        warn!("failed to delete stale lock {tag}: {e}");
                    }
                    if let Err(e) = self.git.delete_remote_tag(&tag) {
                        warn!("failed to delete stale lock {tag} on origin: {e}");
                    }
                }
                Some(age) => {
                    return Err(CoordinationError::Busy {
                        tag,
                        age_secs: age.as_secs(),
                    }
                    .into());
                }
                None => warn!("ignoring unparsable lock tag {tag}"),
            }
        }

        let tag = scope.tag_for(now_ms);
        self.git.create_tag(&tag, None, None)?;
        match self.git.push_tag(&tag)? {
            PushOutcome::Accepted => {
                debug!("acquired lock {tag}");
                Ok(LockGuard {
                    git: self.git,
                    tag,
                    released: false,
                })
            }
            PushOutcome::Rejected => {
                if let Err(e) = self.git.delete_tag(&tag) {
                    warn!("failed to delete local tag {tag}: {e}");
                }
                Err(CoordinationError::Busy { tag, age_secs: 0 }.into())
            }
        }
    }

    /// Lock tags visible locally for any scope, with their age. Used by
    /// status reporting.
    pub fn observed_locks(&self) -> Result<Vec<(String, Duration)>> {
        let now_ms = unix_ms();
        Ok(self
            .git
            .list_tags("lock-*")?
            .into_iter()
            .filter_map(|tag| lock_age(&tag, now_ms).map(|age| (tag, age)))
            .collect())
    }
}

/// A held lock. Dropping it deletes the tag locally and remotely;
/// failing to delete remotely is logged, never fatal (the staleness
/// horizon reclaims it eventually).
#[derive(Debug)]
pub struct LockGuard<'a> {
    git: &'a git_cmd::Repo,
    tag: String,
    released: bool,
}

impl LockGuard<'_> {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Release eagerly instead of at drop, to observe errors. Drop
    /// still covers the error paths.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.git.delete_tag(&self.tag) {
            warn!("failed to delete lock tag {}: {e}", self.tag);
        }
        if let Err(e) = self.git.delete_remote_tag(&self.tag) {
            warn!("failed to delete lock tag {} on origin: {e}", self.tag);
        }
        debug!("released lock {}", self.tag);
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before 1970")
        .as_millis()
}

/// Age of a lock tag from its embedded timestamp. [`None`] when the
/// tag does not end in a millisecond timestamp.
fn lock_age(tag: &str, now_ms: u128) -> Option<Duration> {
    let ms: u128 = tag.rsplit('-').next()?.parse().ok()?;
    let elapsed = now_ms.saturating_sub(ms);
    Some(Duration::from_millis(u64::try_from(elapsed).ok()?))
}
