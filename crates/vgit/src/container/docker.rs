//! [`ContainerEngine`] driving the `docker` CLI.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vgit_core::config::DockerSettings;
use vgit_core::{DockerConfig, Error, Result};

use super::dockerfile::render_dockerfile;
use super::{BuiltImage, ContainerEngine};
use crate::runner::{CommandRunner, ExecOutput, Exit};

/// Exit status docker itself uses when the daemon rejects a request, as
/// opposed to the container's own exit status.
const DOCKER_DAEMON_ERROR: i32 = 125;

/// Builds and runs images through the `docker` binary.
///
/// Containers created by this engine are tracked until their run ends, so a
/// signal handler can tear them down with [`DockerCli::kill_all`].
#[derive(Clone)]
pub struct DockerCli {
    runner: Arc<dyn CommandRunner>,
    binary: PathBuf,
    image_prefix: String,
    live: Arc<Mutex<HashSet<String>>>,
}

impl DockerCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: PathBuf::from("docker"),
            image_prefix: "virtual-git".to_string(),
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Engine configured from the `docker` settings section.
    pub fn from_settings(runner: Arc<dyn CommandRunner>, settings: &DockerSettings) -> Self {
        Self::new(runner)
            .with_binary(settings.binary.clone())
            .with_image_prefix(settings.image_prefix.clone())
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn with_image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.image_prefix = prefix.into();
        self
    }

    /// Ids of containers created here that have not finished yet.
    pub async fn live_containers(&self) -> Vec<String> {
        self.live.lock().await.iter().cloned().collect()
    }

    /// Force-kill and remove every live container. Failures are logged and
    /// skipped.
    pub async fn kill_all(&self) {
        let ids: Vec<String> = self.live.lock().await.drain().collect();
        for id in ids {
            match self.docker(&["rm", "--force", &id], &std::env::temp_dir()).await {
                Ok(out) if out.success() => info!(container = %id, "Killed container"),
                Ok(out) => warn!(container = %id, stderr = %out.stderr.trim(), "docker rm failed"),
                Err(e) => warn!(container = %id, error = %e, "docker rm failed"),
            }
        }
    }

    async fn docker(&self, args: &[&str], cwd: &Path) -> std::io::Result<ExecOutput> {
        let argv: Vec<String> = args.iter().map(ToString::to_string).collect();
        self.runner.execute(&self.binary, &argv, cwd).await
    }

    fn new_image_id(&self) -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.image_prefix, &hex[..16])
    }

    /// Lay out the build context: tracked files plus the rendered Dockerfile.
    async fn stage_context(
        worktree: &Path,
        files: &[String],
        config: &DockerConfig,
        context: &Path,
    ) -> std::io::Result<()> {
        for file in files {
            let from = worktree.join(file);
            let to = context.join(file);
            if !tokio::fs::try_exists(&from).await.unwrap_or(false) {
                debug!(file = %file, "tracked file missing from worktree, skipping");
                continue;
            }
            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&from, &to).await?;
        }
        tokio::fs::write(context.join("Dockerfile"), render_dockerfile(config)).await
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn build_image(
        &self,
        worktree: &Path,
        files: &[String],
        config: &DockerConfig,
    ) -> Result<BuiltImage> {
        let image = self.new_image_id();
        let context = tempfile::Builder::new()
            .prefix("vgit-build-")
            .tempdir()
            .map_err(|e| Error::BuildImageFailed(format!("failed to create build context: {e}")))?;

        Self::stage_context(worktree, files, config, context.path())
            .await
            .map_err(|e| Error::BuildImageFailed(format!("failed to stage build context: {e}")))?;

        let owner = format!("owner={}", self.image_prefix);
        let context_str = context.path().to_string_lossy();
        let start = std::time::Instant::now();
        let out = self
            .docker(
                &["build", "-t", &image, "--label", &owner, &context_str],
                context.path(),
            )
            .await
            .map_err(|e| Error::BuildImageFailed(format!("failed to run docker: {e}")))?;

        if !out.success() {
            return Err(Error::BuildImageFailed(format!(
                "failed to build image: {}",
                out.combined().trim()
            )));
        }

        info!(
            image = %image,
            worktree = %worktree.display(),
            files = files.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Built image"
        );
        Ok(BuiltImage {
            id: image,
            exposed_ports: config.exposed_ports.clone(),
        })
    }

    async fn run_image(
        &self,
        image: &BuiltImage,
        on_data: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()> {
        let owner = format!("owner={}", self.image_prefix);
        let publish: Vec<String> = image
            .exposed_ports
            .iter()
            .map(|p| format!("{p}:{p}"))
            .collect();
        let mut args = vec!["create", "--tty", "--label", owner.as_str()];
        for mapping in &publish {
            args.extend(["--publish", mapping.as_str()]);
        }
        args.push(image.id.as_str());

        let cwd = std::env::temp_dir();
        let created = self
            .docker(&args, &cwd)
            .await
            .map_err(|e| Error::CreateContainerFailed(format!("failed to run docker: {e}")))?;
        if !created.success() {
            return Err(Error::CreateContainerFailed(format!(
                "failed to create container: {}",
                created.stderr.trim()
            )));
        }
        let container = created.stdout.trim().to_string();
        self.live.lock().await.insert(container.clone());
        info!(container = %container, image = %image.id, "Created container");

        let argv = vec!["start".to_string(), "--attach".to_string(), container.clone()];
        let result = match self.runner.stream(&self.binary, &argv, &cwd, on_data).await {
            Err(e) => Err(Error::RunContainerFailed(format!("failed to attach stream: {e}"))),
            Ok(Exit {
                code: Some(DOCKER_DAEMON_ERROR),
            }) => Err(Error::RunContainerFailed(
                "docker refused to start the container".to_string(),
            )),
            Ok(exit) => {
                info!(container = %container, code = ?exit.code, "Container exited");
                Ok(())
            }
        };

        match self.docker(&["rm", "--force", &container], &cwd).await {
            Ok(out) if out.success() => debug!(container = %container, "Removed container"),
            Ok(out) => warn!(container = %container, stderr = %out.stderr.trim(), "docker rm failed"),
            Err(e) => warn!(container = %container, error = %e, "docker rm failed"),
        }
        self.live.lock().await.remove(&container);

        result
    }

    async fn remove_image(&self, image: &BuiltImage) -> Result<()> {
        let out = self
            .docker(&["rmi", "--force", &image.id], &std::env::temp_dir())
            .await?;
        if !out.success() {
            return Err(Error::BuildImageFailed(format!(
                "failed to remove image {}: {}",
                image.id,
                out.stderr.trim()
            )));
        }
        info!(image = %image.id, "Removed image");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn engine(runner: ScriptedRunner) -> (DockerCli, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        (DockerCli::new(runner.clone()), runner)
    }

    fn image() -> BuiltImage {
        BuiltImage {
            id: "virtual-git-0123456789abcdef".into(),
            exposed_ports: vec![8080],
        }
    }

    #[tokio::test]
    async fn build_stages_tracked_files_and_tags_image() {
        let worktree = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(worktree.path().join("src")).unwrap();
        std::fs::write(worktree.path().join("src/a.js"), "a").unwrap();
        std::fs::write(worktree.path().join("index.js"), "i").unwrap();
        std::fs::write(worktree.path().join("untracked.txt"), "u").unwrap();

        let (docker, runner) = engine(ScriptedRunner::new());
        let files = vec!["src/a.js".to_string(), "index.js".to_string()];
        let built = docker
            .build_image(worktree.path(), &files, &DockerConfig::node())
            .await
            .unwrap();

        assert!(built.id.starts_with("virtual-git-"));
        assert_eq!(built.id.len(), "virtual-git-".len() + 16);
        assert_eq!(built.exposed_ports, vec![8080]);

        let call = &runner.calls_with(&["build"])[0];
        assert!(call.has_args(&["-t", &built.id]));
        assert!(call.has_args(&["--label", "owner=virtual-git"]));
        // The Dockerfile is not written into the worktree itself.
        assert!(!worktree.path().join("Dockerfile").exists());
    }

    #[tokio::test]
    async fn build_failure_is_classified() {
        let worktree = tempfile::tempdir().unwrap();
        let (docker, _) = engine(
            ScriptedRunner::new().on(&["build"], ExecOutput::failed("pull access denied")),
        );
        let err = docker
            .build_image(worktree.path(), &[], &DockerConfig::ubuntu())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BuildImageFailed(_)));
    }

    #[tokio::test]
    async fn run_streams_and_cleans_up() {
        let (docker, runner) = engine(
            ScriptedRunner::new()
                .on(&["create"], ExecOutput::ok("c0ffee\n"))
                .on_stream(&["start", "--attach", "c0ffee"], &["Boo\n", "bye\n"], Exit::SUCCESS),
        );

        let mut seen = Vec::new();
        docker
            .run_image(&image(), &mut |chunk| seen.push(chunk.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["Boo\n", "bye\n"]);
        assert!(runner.calls_with(&["--publish", "8080:8080"]).len() == 1);
        assert_eq!(runner.calls_with(&["rm", "--force", "c0ffee"]).len(), 1);
        assert!(runner.calls_with(&["rmi"]).is_empty());
        assert!(docker.live_containers().await.is_empty());
    }

    #[tokio::test]
    async fn create_failure_is_classified() {
        let (docker, runner) = engine(
            ScriptedRunner::new().on(&["create"], ExecOutput::failed("No such image")),
        );
        let err = docker.run_image(&image(), &mut |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::CreateContainerFailed(_)));
        assert!(runner.calls_with(&["start"]).is_empty());
        assert!(runner.calls_with(&["rmi"]).is_empty());
        assert!(docker.live_containers().await.is_empty());
    }

    #[tokio::test]
    async fn remove_image_runs_rmi() {
        let (docker, runner) = engine(ScriptedRunner::new());
        docker.remove_image(&image()).await.unwrap();
        assert_eq!(
            runner
                .calls_with(&["rmi", "--force", "virtual-git-0123456789abcdef"])
                .len(),
            1
        );

        let (docker, _) = engine(
            ScriptedRunner::new().on(&["rmi"], ExecOutput::failed("image is in use")),
        );
        assert!(matches!(
            docker.remove_image(&image()).await.unwrap_err(),
            Error::BuildImageFailed(_)
        ));
    }

    #[tokio::test]
    async fn daemon_refusal_is_run_failure() {
        let (docker, runner) = engine(
            ScriptedRunner::new()
                .on(&["create"], ExecOutput::ok("c0ffee\n"))
                .on_stream(&["start"], &[], Exit { code: Some(125) }),
        );
        let err = docker.run_image(&image(), &mut |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::RunContainerFailed(_)));
        assert_eq!(runner.calls_with(&["rm", "--force", "c0ffee"]).len(), 1);
    }

    #[tokio::test]
    async fn program_failure_is_not_an_engine_error() {
        let (docker, _) = engine(
            ScriptedRunner::new()
                .on(&["create"], ExecOutput::ok("c0ffee\n"))
                .on_stream(&["start"], &["boom\n"], Exit { code: Some(1) }),
        );
        assert!(docker.run_image(&image(), &mut |_| {}).await.is_ok());
    }

    #[tokio::test]
    async fn kill_all_drains_registry() {
        let (docker, runner) = engine(ScriptedRunner::new());
        docker.live.lock().await.insert("abc".into());
        docker.kill_all().await;
        assert_eq!(runner.calls_with(&["rm", "--force", "abc"]).len(), 1);
        assert!(docker.live_containers().await.is_empty());
    }
}
