use git_cmd::Repo as GitRepo;

use crate::{CoordinationError, PreconditionError, Result};

/// Fast-forward the local `branch` to `origin/<branch>`, creating it
/// when only the remote has it. Refuses diverged histories: hop never
/// rewrites or merges on the user's behalf outside its own protocol.
pub(crate) fn sync_local_branch(git: &GitRepo, branch: &str) -> Result<()> {
    let remote = format!("origin/{branch}");
    if !git.branch_exists(branch)? {
        if git.remote_branch_exists(branch)? {
            git.create_branch(branch, &remote)?;
            return Ok(());
        }
        return Err(PreconditionError::MissingBranch(branch.to_string()).into());
    }
    if git.is_synced_with(branch)? {
        return Ok(());
    }
    if git.is_ancestor_of(branch, &remote)? {
        if git.current_branch()? == branch {
            git.merge_ff_only(&remote)?;
        } else {
            // fast-forward a branch that is not checked out
            git.git(&["fetch", "origin", &format!("{branch}:{branch}")])?;
        }
        Ok(())
    } else if git.is_ancestor_of(&remote, branch)? {
        // local is ahead; pushing is the caller's decision
        Ok(())
    } else {
        Err(CoordinationError::Diverged {
            branch: branch.to_string(),
        }
        .into())
    }
}

/// [`sync_local_branch`] followed by a checkout.
pub(crate) fn checkout_synced(git: &GitRepo, branch: &str) -> Result<()> {
    sync_local_branch(git, branch)?;
    git.checkout(branch)?;
    Ok(())
}
