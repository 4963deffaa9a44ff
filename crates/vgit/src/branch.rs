//! A branch checked out in its own worktree, used as a mutable workspace.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vgit_core::{DockerConfig, Error, Result};

use crate::container::{BuiltImage, ContainerEngine};
use crate::git::{CommitRef, FileDiff, GitController};
use crate::tree::{Tree, build_tree};

/// Commit message used by [`Branch::save`] unless configured otherwise.
pub const DEFAULT_COMMIT_MESSAGE: &str = "virtual-git";

pub struct Branch {
    name: String,
    git: GitController,
    engine: Arc<dyn ContainerEngine>,
    commit_message: String,
    image: RwLock<Option<BuiltImage>>,
}

impl std::fmt::Debug for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branch")
            .field("name", &self.name)
            .field("path", &self.git.path())
            .finish_non_exhaustive()
    }
}

impl Branch {
    /// Wrap the worktree `git` is bound to.
    pub fn new(
        name: impl Into<String>,
        git: GitController,
        engine: Arc<dyn ContainerEngine>,
    ) -> Self {
        Self {
            name: name.into(),
            git,
            engine,
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            image: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Worktree directory.
    pub fn path(&self) -> &Path {
        self.git.path()
    }

    pub fn git(&self) -> &GitController {
        &self.git
    }

    /// Normalise a worktree-relative path, refusing anything that could
    /// land outside the worktree.
    fn relative(path: &str) -> Result<PathBuf> {
        let mut out = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::InvalidPath(format!(
                        "path must stay inside the worktree: {path}"
                    )));
                }
            }
        }
        if out.as_os_str().is_empty() {
            return Err(Error::InvalidPath(format!("empty path: {path:?}")));
        }
        Ok(out)
    }

    /// Write `content` to `path` and stage it. Nothing is committed.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let rel = Self::relative(path)?;
        let full = self.path().join(&rel);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;

        let rel = rel.to_string_lossy();
        self.git.add_files(&[&rel]).await?;
        debug!(branch = %self.name, path = %rel, bytes = content.len(), "Staged file");
        Ok(())
    }

    pub async fn read_file(&self, path: &str) -> Result<String> {
        let rel = Self::relative(path)?;
        Ok(tokio::fs::read_to_string(self.path().join(rel)).await?)
    }

    /// Commit everything staged. Returns the new commit id.
    pub async fn save(&self) -> Result<String> {
        self.git.commit(&self.commit_message).await
    }

    /// Hard-reset the worktree to `target` (default: one commit back).
    ///
    /// Passing the id of a later commit moves forward again, as long as the
    /// caller kept it.
    pub async fn undo(&self, target: Option<CommitRef>) -> Result<()> {
        self.git.undo_commit(target).await
    }

    pub async fn changes(
        &self,
        from: Option<CommitRef>,
        to: Option<CommitRef>,
    ) -> Result<Vec<FileDiff>> {
        self.git.get_diff(from, to).await
    }

    pub async fn files(&self) -> Result<Vec<String>> {
        self.git.get_files().await
    }

    pub async fn get_file_tree(&self) -> Result<Tree> {
        Ok(build_tree(&self.files().await?))
    }

    /// Build an image from the tracked files and keep it for
    /// [`Branch::run_image`]. Replaces any image built before; the replaced
    /// image is removed from the engine.
    pub async fn build_image(&self, config: &DockerConfig) -> Result<BuiltImage> {
        let files = self.files().await?;
        let image = self
            .engine
            .build_image(self.path(), &files, config)
            .await?;
        info!(branch = %self.name, image = %image.id, "Built branch image");
        let replaced = self.image.write().await.replace(image.clone());
        if let Some(old) = replaced.filter(|old| old.id != image.id) {
            if let Err(e) = self.engine.remove_image(&old).await {
                warn!(branch = %self.name, image = %old.id, error = %e, "Failed to remove replaced image");
            }
        }
        Ok(image)
    }

    /// Run the last built image, streaming its output to `on_data`. The image
    /// stays available, so it can be run again without a rebuild.
    pub async fn run_image(
        &self,
        on_data: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()> {
        let image = self.image.read().await.clone().ok_or_else(|| {
            Error::CreateContainerFailed(format!("no image built for branch {}", self.name))
        })?;
        self.engine.run_image(&image, on_data).await
    }

    /// Forget the built image and remove it from the engine. Returns the
    /// image that was dropped, if there was one.
    pub async fn discard_image(&self) -> Result<Option<BuiltImage>> {
        let Some(image) = self.image.write().await.take() else {
            return Ok(None);
        };
        self.engine.remove_image(&image).await?;
        debug!(branch = %self.name, image = %image.id, "Discarded branch image");
        Ok(Some(image))
    }

    /// The image waiting to be run, if any.
    pub async fn image(&self) -> Option<BuiltImage> {
        self.image.read().await.clone()
    }
}
