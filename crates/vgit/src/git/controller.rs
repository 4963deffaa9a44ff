//! Typed git operations over a [`CommandRunner`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use vgit_core::{Error, Result};

use super::commit_ref::CommitRef;
use super::diff::{FileDiff, parse_diff};
use super::parse::{BranchListing, extract_branch_names, parse_files, parse_worktrees};
use crate::runner::{CommandRunner, ExecOutput};

/// Options prepended to every invocation so output does not depend on the
/// user's git config.
const GLOBAL_ARGS: [&str; 4] = ["-c", "color.ui=never", "-c", "core.quotePath=false"];

/// Git bound to one directory: a repository root or a worktree.
#[derive(Clone)]
pub struct GitController {
    path: PathBuf,
    binary: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for GitController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitController")
            .field("path", &self.path)
            .field("binary", &self.binary)
            .finish_non_exhaustive()
    }
}

impl GitController {
    /// Bind to `path`, resolved against the current directory.
    pub fn new(path: impl AsRef<Path>, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        Ok(Self {
            path: std::path::absolute(path.as_ref())?,
            binary: PathBuf::from("git"),
            runner,
        })
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// A controller for another directory sharing this one's runner and binary.
    pub fn at(&self, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            path: std::path::absolute(path.as_ref())?,
            binary: self.binary.clone(),
            runner: Arc::clone(&self.runner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run(&self, args: &[&str]) -> Result<ExecOutput> {
        let argv: Vec<String> = GLOBAL_ARGS
            .iter()
            .chain(args)
            .map(ToString::to_string)
            .collect();
        debug!(path = %self.path.display(), ?args, "git");
        self.runner
            .execute(&self.binary, &argv, &self.path)
            .await
            .map_err(|e| Error::GitCommandFailed(format!("failed to spawn git: {e}")))
    }

    /// Run git and return stdout, failing with `GitCommandFailed` on a
    /// non-zero exit.
    pub async fn exec_git(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).await?;
        if !output.success() {
            return Err(Error::GitCommandFailed(format!(
                "git {} exited with {:?}: {}",
                args.join(" "),
                output.exit.code,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    pub async fn show(&self) -> Result<String> {
        self.exec_git(&["show"]).await
    }

    /// Hard-reset to `target` (default: one commit back).
    pub async fn undo_commit(&self, target: Option<CommitRef>) -> Result<()> {
        let target = target.unwrap_or(CommitRef::Offset(1)).resolve();
        self.exec_git(&["reset", "--hard", &target])
            .await
            .map_err(|e| {
                debug!(error = %e, "reset failed");
                Error::UndoFailed(format!("failed to reset to \"{target}\""))
            })?;
        info!(path = %self.path.display(), rev = %target, "Reset worktree");
        Ok(())
    }

    /// Resolve `HEAD~ago` to a commit id.
    pub async fn get_commit(&self, ago: u32) -> Result<String> {
        let rev = CommitRef::Offset(ago).resolve();
        let out = self.exec_git(&["rev-parse", &rev]).await?;
        Ok(out.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Commit what is staged and return the new HEAD.
    pub async fn commit(&self, message: &str) -> Result<String> {
        self.exec_git(&["commit", "-m", message]).await?;
        let id = self.get_commit(0).await?;
        info!(path = %self.path.display(), commit = %id, "Committed");
        Ok(id)
    }

    /// Diff `from` (default HEAD) against `to`, or against the working tree
    /// when `to` is `None`.
    pub async fn get_diff(
        &self,
        from: Option<CommitRef>,
        to: Option<CommitRef>,
    ) -> Result<Vec<FileDiff>> {
        let mut revs = vec![from.unwrap_or_default().resolve()];
        if let Some(to) = to {
            revs.push(to.resolve());
        }
        let mut args = vec!["diff"];
        args.extend(revs.iter().map(String::as_str));
        let out = self.exec_git(&args).await?;
        Ok(parse_diff(&out))
    }

    pub async fn add_worktree(&self, path: &Path, branch: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.exec_git(&["worktree", "add", &path_str, branch])
            .await?;
        info!(path = %path.display(), branch, "Created git worktree");
        Ok(())
    }

    /// Branch short-name → worktree path.
    pub async fn get_worktrees(&self) -> Result<HashMap<String, PathBuf>> {
        let out = self.exec_git(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktrees(&out))
    }

    pub async fn checkout(&self, branch: &str) -> Result<String> {
        self.exec_git(&["checkout", branch])
            .await
            .map_err(|_| Error::CheckoutFailed(format!("failed to checkout \"{branch}\"")))
    }

    pub async fn get_all_branches(&self) -> Result<Vec<String>> {
        let out = self.exec_git(&["branch", "-a"]).await?;
        Ok(extract_branch_names(&out, BranchListing::All))
    }

    pub async fn get_remote_branches(&self) -> Result<Vec<String>> {
        let out = self.exec_git(&["branch", "-r"]).await?;
        Ok(extract_branch_names(&out, BranchListing::Remote))
    }

    pub async fn get_local_branches(&self) -> Result<Vec<String>> {
        let out = self.exec_git(&["branch"]).await?;
        Ok(extract_branch_names(&out, BranchListing::Local))
    }

    pub async fn get_current_branch(&self) -> Result<String> {
        let out = self.exec_git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    /// Clone `url` into the bound directory, creating it if needed.
    pub async fn clone(&self, url: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|e| Error::CloneFailed(format!("failed to create {}: {e}", self.path.display())))?;
        self.exec_git(&["clone", url, "."]).await.map_err(|e| {
            debug!(url, error = %e, "clone failed");
            Error::CloneFailed(format!("failed to clone repository {url}"))
        })?;
        info!(url, path = %self.path.display(), "Cloned repository");
        Ok(())
    }

    /// Tracked paths, relative to the bound directory.
    pub async fn get_files(&self) -> Result<Vec<String>> {
        let out = self.exec_git(&["ls-files", "-z"]).await?;
        Ok(parse_files(&out))
    }

    pub async fn add_files(&self, files: &[&str]) -> Result<()> {
        let mut args = vec!["add", "--"];
        args.extend_from_slice(files);
        self.exec_git(&args).await?;
        Ok(())
    }

    pub async fn add_all(&self) -> Result<()> {
        self.exec_git(&["add", "--all"]).await?;
        Ok(())
    }

    /// The shared `.git` directory (the main repository's, for worktrees).
    pub async fn git_common_dir(&self) -> Result<PathBuf> {
        let out = self.exec_git(&["rev-parse", "--git-common-dir"]).await?;
        Ok(self.path.join(out.trim()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::runner::ExecOutput;
    use crate::testing::ScriptedRunner;

    fn controller(runner: ScriptedRunner) -> (GitController, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let git = GitController::new("/repo", runner.clone()).unwrap();
        (git, runner)
    }

    #[tokio::test]
    async fn undo_defaults_to_one_commit_back() {
        let (git, runner) = controller(ScriptedRunner::new());
        git.undo_commit(None).await.unwrap();
        assert_eq!(runner.calls_with(&["reset", "--hard", "HEAD~1"]).len(), 1);
    }

    #[tokio::test]
    async fn undo_to_literal_commit() {
        let (git, runner) = controller(ScriptedRunner::new());
        git.undo_commit(Some("abcdef1".into())).await.unwrap();
        assert_eq!(runner.calls_with(&["reset", "--hard", "abcdef1"]).len(), 1);
        assert!(runner.calls_with(&["HEAD~abcdef1"]).is_empty());
    }

    #[tokio::test]
    async fn undo_failure_is_undo_failed() {
        let (git, _) = controller(
            ScriptedRunner::new().on(&["reset"], ExecOutput::failed("fatal: bad revision")),
        );
        let err = git.undo_commit(Some(CommitRef::Offset(9))).await.unwrap_err();
        match err {
            Error::UndoFailed(msg) => assert!(msg.contains("HEAD~9")),
            other => panic!("expected UndoFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn commit_returns_head() {
        let (git, runner) = controller(
            ScriptedRunner::new().on(&["rev-parse", "HEAD~0"], ExecOutput::ok("deadbeef\n")),
        );
        assert_eq!(git.commit("virtual-git").await.unwrap(), "deadbeef");
        assert_eq!(runner.calls_with(&["commit", "-m", "virtual-git"]).len(), 1);
    }

    #[tokio::test]
    async fn commit_with_nothing_staged_fails() {
        let (git, _) = controller(
            ScriptedRunner::new().on(&["commit"], ExecOutput::failed("nothing to commit")),
        );
        assert!(matches!(
            git.commit("m").await.unwrap_err(),
            Error::GitCommandFailed(_)
        ));
    }

    #[tokio::test]
    async fn every_call_pins_output_format() {
        let (git, runner) = controller(ScriptedRunner::new());
        git.get_files().await.unwrap();
        let call = &runner.calls()[0];
        assert_eq!(call.program, PathBuf::from("git"));
        assert_eq!(call.cwd, PathBuf::from("/repo"));
        assert!(call.has_args(&["-c", "color.ui=never"]));
        assert!(call.has_args(&["ls-files", "-z"]));
    }

    #[tokio::test]
    async fn diff_without_to_targets_working_tree() {
        let (git, runner) = controller(ScriptedRunner::new());
        git.get_diff(Some(2.into()), None).await.unwrap();
        let call = &runner.calls_with(&["diff"])[0];
        assert_eq!(call.args.last().map(String::as_str), Some("HEAD~2"));

        git.get_diff(None, Some("abc1234".into())).await.unwrap();
        assert_eq!(runner.calls_with(&["diff", "HEAD~0", "abc1234"]).len(), 1);
    }

    #[tokio::test]
    async fn checkout_failure_is_classified() {
        let (git, _) = controller(
            ScriptedRunner::new().on(&["checkout"], ExecOutput::failed("pathspec did not match")),
        );
        assert!(matches!(
            git.checkout("nope").await.unwrap_err(),
            Error::CheckoutFailed(_)
        ));
    }

    #[tokio::test]
    async fn clone_failure_is_classified() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            ScriptedRunner::new().on(&["clone"], ExecOutput::failed("repository not found")),
        );
        let git = GitController::new(tmp.path().join("dest"), runner).unwrap();
        assert!(matches!(
            git.clone("https://example.invalid/x.git").await.unwrap_err(),
            Error::CloneFailed(_)
        ));
        assert!(tmp.path().join("dest").is_dir());
    }

    #[tokio::test]
    async fn at_shares_binary() {
        let (git, runner) = controller(ScriptedRunner::new());
        let other = git.with_binary("/usr/bin/git").at("/elsewhere").unwrap();
        other.get_current_branch().await.unwrap();
        let call = &runner.calls()[0];
        assert_eq!(call.program, PathBuf::from("/usr/bin/git"));
        assert_eq!(call.cwd, PathBuf::from("/elsewhere"));
    }

    #[tokio::test]
    async fn listing_commands() {
        let (git, runner) = controller(
            ScriptedRunner::new()
                .on(&["branch", "-r"], ExecOutput::ok("  origin/HEAD -> origin/main\n  origin/main\n"))
                .on(&["branch"], ExecOutput::ok("* main\n  feature\n"))
                .on(&["show"], ExecOutput::ok("commit abc\n")),
        );
        assert_eq!(git.get_remote_branches().await.unwrap(), vec!["main"]);
        assert_eq!(git.get_local_branches().await.unwrap(), vec!["main", "feature"]);
        assert_eq!(git.show().await.unwrap(), "commit abc\n");
        git.add_all().await.unwrap();
        assert_eq!(runner.calls_with(&["add", "--all"]).len(), 1);
    }
}
