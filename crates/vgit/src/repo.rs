//! Repository: lazily materialises branches as worktrees.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use vgit_core::config::{WorktreeConfig, WorktreeModeSetting, global_worktree_dir};
use vgit_core::{Config, Error, Result};

use crate::branch::{Branch, DEFAULT_COMMIT_MESSAGE};
use crate::container::{ContainerEngine, DockerCli};
use crate::git::GitController;
use crate::runner::{CommandRunner, ProcessRunner};

/// Worktree placement for a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorktreeMode {
    /// `<global_base>/<repo_name>/<branch>/`
    Global(PathBuf),
    /// `<repo_path>/<subfolder>/<branch>/`
    Local(PathBuf),
    /// `<custom_path>/<repo_name>/<branch>/`
    Custom(PathBuf),
}

impl Default for WorktreeMode {
    fn default() -> Self {
        Self::Local(PathBuf::from(".worktrees"))
    }
}

impl WorktreeMode {
    pub fn from_config(config: &WorktreeConfig) -> Result<Self> {
        match config.mode {
            WorktreeModeSetting::Local => Ok(Self::Local(config.local_subfolder.clone())),
            WorktreeModeSetting::Global => global_worktree_dir()
                .map(Self::Global)
                .ok_or_else(|| Error::Config("no data directory for global worktrees".into())),
            WorktreeModeSetting::Custom => config
                .custom_path
                .clone()
                .map(Self::Custom)
                .ok_or_else(|| Error::Config("custom worktree mode needs custom_path".into())),
        }
    }

    /// Directory holding one subdirectory per branch.
    pub fn base_dir(&self, repo_path: &Path) -> PathBuf {
        match self {
            Self::Global(base) | Self::Custom(base) => base.join(repo_name(repo_path)),
            Self::Local(subfolder) => repo_path.join(subfolder),
        }
    }
}

/// Last path component of the repository, or `"unknown"` for paths like `/`.
pub fn repo_name(repo_path: &Path) -> &str {
    repo_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
}

/// Reject branch names git would not accept as a refname, or that could
/// escape the worktree directory when used as a path.
///
/// Anything git lists as a branch passes, including names such as
/// `fix#12` or `user+topic`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("name cannot be empty".into()));
    }
    if name.starts_with('-') {
        return Err(Error::InvalidName("name cannot start with a dash".into()));
    }
    if name.contains("..") {
        return Err(Error::InvalidName("name cannot contain '..'".into()));
    }
    if name.contains("@{") || name == "@" {
        return Err(Error::InvalidName(format!("not a valid refname: {name}")));
    }
    if name.chars().any(|c| {
        c.is_control()
            || c.is_whitespace()
            || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')
    }) {
        return Err(Error::InvalidName(format!(
            "name contains invalid characters: {name}"
        )));
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return Err(Error::InvalidName(format!("not a valid refname: {name}")));
    }
    for segment in name.split('/') {
        if segment.is_empty() || segment.starts_with('.') {
            return Err(Error::InvalidName(format!(
                "invalid path segment in name: {name}"
            )));
        }
    }
    Ok(())
}

/// Behaviour knobs of a [`Repo`], usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct RepoSettings {
    pub git_binary: PathBuf,
    pub commit_message: String,
    pub worktree_mode: WorktreeMode,
    /// Keep the local worktree folder out of `git status`.
    pub auto_exclude: bool,
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            worktree_mode: WorktreeMode::default(),
            auto_exclude: true,
        }
    }
}

impl RepoSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            git_binary: config.git.binary.clone(),
            commit_message: config.git.commit_message.clone(),
            worktree_mode: WorktreeMode::from_config(&config.worktrees)?,
            auto_exclude: config.worktrees.auto_exclude,
        })
    }
}

/// A git repository whose branches are handed out as [`Branch`] workspaces.
pub struct Repo {
    git: GitController,
    engine: Arc<dyn ContainerEngine>,
    settings: RepoSettings,
    branches: Mutex<HashMap<String, Arc<Branch>>>,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("path", &self.git.path())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Repo {
    pub fn new(
        path: impl AsRef<Path>,
        runner: Arc<dyn CommandRunner>,
        engine: Arc<dyn ContainerEngine>,
        settings: RepoSettings,
    ) -> Result<Self> {
        let git = GitController::new(path, runner)?.with_binary(settings.git_binary.clone());
        Ok(Self {
            git,
            engine,
            settings,
            branches: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        self.git.path()
    }

    pub fn git(&self) -> &GitController {
        &self.git
    }

    pub fn settings(&self) -> &RepoSettings {
        &self.settings
    }

    /// Clone `url` into this repository's directory.
    pub async fn clone(&self, url: &str) -> Result<()> {
        self.git.clone(url).await
    }

    /// Local and remote branch names, each listed once.
    pub async fn get_branches(&self) -> Result<Vec<String>> {
        self.git.get_all_branches().await
    }

    /// Workspace for branch `name`, creating its worktree on first use.
    ///
    /// Returns `Ok(None)` when no such branch exists. The branch map stays
    /// locked for the whole lookup, so racing callers share one worktree.
    pub async fn get_branch(&self, name: &str) -> Result<Option<Arc<Branch>>> {
        let mut branches = self.branches.lock().await;
        if let Some(branch) = branches.get(name) {
            return Ok(Some(Arc::clone(branch)));
        }

        if !self.get_branches().await?.iter().any(|b| b == name) {
            debug!(branch = name, "no such branch");
            return Ok(None);
        }
        validate_name(name)?;

        let path = match self.git.get_worktrees().await?.remove(name) {
            Some(existing) => existing,
            None => self.create_worktree(name).await?,
        };

        let branch = Arc::new(
            Branch::new(name, self.git.at(&path)?, Arc::clone(&self.engine))
                .with_commit_message(self.settings.commit_message.clone()),
        );
        branches.insert(name.to_string(), Arc::clone(&branch));
        Ok(Some(branch))
    }

    async fn create_worktree(&self, name: &str) -> Result<PathBuf> {
        let target = self
            .settings
            .worktree_mode
            .base_dir(self.path())
            .join(name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let WorktreeMode::Local(subfolder) = &self.settings.worktree_mode {
            if self.settings.auto_exclude {
                self.ensure_excluded(subfolder).await?;
            }
        }

        self.git.add_worktree(&target, name).await?;

        // git reports the canonical location, which may differ from `target`
        // through symlinks.
        let path = self
            .git
            .get_worktrees()
            .await?
            .remove(name)
            .unwrap_or(target);
        info!(branch = name, path = %path.display(), "Materialised branch");
        Ok(path)
    }

    /// Append `/<subfolder>/` to `info/exclude` unless already listed.
    async fn ensure_excluded(&self, subfolder: &Path) -> Result<()> {
        let info = self.git.git_common_dir().await?.join("info");
        let exclude = info.join("exclude");
        let entry = format!("/{}/", subfolder.to_string_lossy().trim_matches('/'));

        let current = match tokio::fs::read_to_string(&exclude).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if current.lines().any(|l| l.trim() == entry) {
            return Ok(());
        }

        let mut updated = current;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&entry);
        updated.push('\n');
        tokio::fs::create_dir_all(&info).await?;
        tokio::fs::write(&exclude, updated).await?;
        debug!(path = %exclude.display(), entry = %entry, "Excluded worktree folder");
        Ok(())
    }
}

/// Repository at `path` wired to the real `git` and `docker` binaries.
pub fn repo_from_path(path: impl AsRef<Path>, config: &Config) -> Result<Repo> {
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let engine = Arc::new(DockerCli::from_settings(Arc::clone(&runner), &config.docker));
    Repo::new(path, runner, engine, RepoSettings::from_config(config)?)
}

/// A fresh `virtual-git-<uuid>` path under the system temp dir.
pub fn temp_repo_dir() -> PathBuf {
    std::env::temp_dir().join(format!("virtual-git-{}", uuid::Uuid::new_v4()))
}

/// Clone `url` into a [`temp_repo_dir`]. The directory is left in place.
pub async fn repo_from_url(url: &str, config: &Config) -> Result<Repo> {
    let repo = repo_from_path(temp_repo_dir(), config)?;
    repo.clone(url).await?;
    Ok(repo)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::runner::ExecOutput;
    use crate::testing::{RecordingEngine, ScriptedRunner};

    const BRANCHES: &str = "* main\n  feature\n  remotes/origin/HEAD -> origin/main\n  remotes/origin/main\n  remotes/origin/release\n";

    fn worktrees(root: &Path) -> String {
        format!(
            "worktree {}\nHEAD 1111111\nbranch refs/heads/main\n\n",
            root.display()
        )
    }

    fn repo(dir: &Path, runner: ScriptedRunner) -> (Repo, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let repo = Repo::new(
            dir,
            runner.clone(),
            Arc::new(RecordingEngine::new()),
            RepoSettings::default(),
        )
        .unwrap();
        (repo, runner)
    }

    fn scripted(dir: &Path) -> ScriptedRunner {
        ScriptedRunner::new()
            .on(&["branch", "-a"], ExecOutput::ok(BRANCHES))
            .on(&["worktree", "list"], ExecOutput::ok(worktrees(dir)))
            .on(&["--git-common-dir"], ExecOutput::ok(".git\n"))
    }

    #[test]
    fn validate_name_accepts_valid() {
        assert!(validate_name("feat-login").is_ok());
        assert!(validate_name("feature/auth").is_ok());
        assert!(validate_name("v1.2.3").is_ok());
        assert!(validate_name("my_worktree").is_ok());
        assert!(validate_name("fix#12").is_ok());
        assert!(validate_name("user+topic").is_ok());
        assert!(validate_name("team@x/feature").is_ok());
    }

    #[test]
    fn validate_name_rejects_unsafe() {
        for bad in [
            "",
            "-flag",
            "../etc/passwd",
            "foo/../bar",
            "foo bar",
            "a:b",
            "head~1",
            "back\\slash",
            "/lead",
            "trail/",
            "a//b",
            ".hidden",
            "dir/.hidden",
            "ref.lock",
            "v1.",
            "x@{1}",
        ] {
            assert!(
                matches!(validate_name(bad), Err(Error::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn worktree_layouts() {
        let repo_path = Path::new("/home/me/project");
        assert_eq!(
            WorktreeMode::default().base_dir(repo_path),
            PathBuf::from("/home/me/project/.worktrees")
        );
        assert_eq!(
            WorktreeMode::Global(PathBuf::from("/data/wt")).base_dir(repo_path),
            PathBuf::from("/data/wt/project")
        );
        assert_eq!(
            WorktreeMode::Custom(PathBuf::from("/mnt/wt")).base_dir(repo_path),
            PathBuf::from("/mnt/wt/project")
        );
        assert_eq!(repo_name(Path::new("/")), "unknown");
    }

    #[test]
    fn custom_mode_requires_path() {
        let config = WorktreeConfig {
            mode: WorktreeModeSetting::Custom,
            ..WorktreeConfig::default()
        };
        assert!(matches!(
            WorktreeMode::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn unknown_branch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, runner) = repo(dir.path(), scripted(dir.path()));
        assert!(repo.get_branch("nonexistent").await.unwrap().is_none());
        assert!(runner.calls_with(&["worktree", "add"]).is_empty());
    }

    #[tokio::test]
    async fn branch_is_created_once_and_shared() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, runner) = repo(dir.path(), scripted(dir.path()));

        let first = repo.get_branch("feature").await.unwrap().unwrap();
        let second = repo.get_branch("feature").await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let adds = runner.calls_with(&["worktree", "add"]);
        assert_eq!(adds.len(), 1);
        let expected = dir.path().join(".worktrees").join("feature");
        assert!(adds[0].has_args(&[&expected.to_string_lossy(), "feature"]));
        assert_eq!(first.path(), expected);
    }

    #[tokio::test]
    async fn checked_out_branch_reuses_its_worktree() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, runner) = repo(dir.path(), scripted(dir.path()));
        let main = repo.get_branch("main").await.unwrap().unwrap();
        assert_eq!(main.path(), dir.path());
        assert!(runner.calls_with(&["worktree", "add"]).is_empty());
    }

    #[tokio::test]
    async fn remote_only_branch_is_known() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, runner) = repo(dir.path(), scripted(dir.path()));
        assert!(repo.get_branch("release").await.unwrap().is_some());
        assert_eq!(runner.calls_with(&["worktree", "add"]).len(), 1);
    }

    #[tokio::test]
    async fn worktree_folder_is_excluded_once() {
        let dir = tempfile::tempdir().unwrap();
        let exclude = dir.path().join(".git/info/exclude");
        std::fs::create_dir_all(exclude.parent().unwrap()).unwrap();
        std::fs::write(&exclude, "# local ignores\n*.log").unwrap();

        let (repo, _) = repo(dir.path(), scripted(dir.path()));
        repo.get_branch("feature").await.unwrap();
        repo.ensure_excluded(Path::new(".worktrees")).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&exclude).unwrap(),
            "# local ignores\n*.log\n/.worktrees/\n"
        );
    }

    #[test]
    fn temp_dirs_are_unique() {
        let a = temp_repo_dir();
        assert!(a.starts_with(std::env::temp_dir()));
        assert!(repo_name(&a).starts_with("virtual-git-"));
        assert_ne!(a, temp_repo_dir());
    }

    #[tokio::test]
    async fn listed_names_with_punctuation_get_workspaces() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .on(
                &["branch", "-a"],
                ExecOutput::ok("* main\n  fix#12\n  user+topic\n"),
            )
            .on(&["worktree", "list"], ExecOutput::ok(worktrees(dir.path())))
            .on(&["--git-common-dir"], ExecOutput::ok(".git\n"));
        let (repo, runner) = repo(dir.path(), runner);

        for name in ["fix#12", "user+topic"] {
            let branch = repo.get_branch(name).await.unwrap().unwrap();
            assert_eq!(branch.path(), dir.path().join(".worktrees").join(name));
        }
        assert_eq!(runner.calls_with(&["worktree", "add"]).len(), 2);
    }

    #[tokio::test]
    async fn branches_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, _) = repo(dir.path(), scripted(dir.path()));
        assert_eq!(
            repo.get_branches().await.unwrap(),
            vec!["main", "feature", "release"]
        );
    }
}
