//! Container pipeline: package a worktree's tracked files into an image and
//! run it.

mod docker;
mod dockerfile;

pub use docker::DockerCli;
pub use dockerfile::render_dockerfile;

use std::path::Path;

use async_trait::async_trait;
use vgit_core::{DockerConfig, Result};

/// An image produced by [`ContainerEngine::build_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    pub id: String,
    /// Ports to publish when the image runs.
    pub exposed_ports: Vec<u16>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build an image from `files` (relative to `worktree`).
    async fn build_image(
        &self,
        worktree: &Path,
        files: &[String],
        config: &DockerConfig,
    ) -> Result<BuiltImage>;

    /// Run `image` to completion, streaming its output to `on_data`. The
    /// container is removed afterwards; the image is kept.
    async fn run_image(
        &self,
        image: &BuiltImage,
        on_data: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()>;

    /// Delete `image` from the engine.
    async fn remove_image(&self, image: &BuiltImage) -> Result<()>;
}
