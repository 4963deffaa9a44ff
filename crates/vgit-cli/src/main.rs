//! virtual-git CLI
//!
//! Treats the branches of a repository as workspaces: edit, save, undo,
//! inspect and run them without touching the main checkout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use vgit::runner::{CommandRunner, ProcessRunner};
use vgit::{DockerCli, Repo, RepoSettings, temp_repo_dir};
use vgit_cli::branch_cmd::{self, BranchAction};
use vgit_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "vgit")]
#[command(version, about = "Git branches as mutable, undoable workspaces", long_about = None)]
struct Cli {
    /// Repository to operate on
    #[arg(long, env = "VGIT_REPO", default_value = ".", conflicts_with = "url")]
    repo: PathBuf,

    /// Clone this URL into a fresh temporary directory and operate on it
    #[arg(long)]
    url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    action: BranchAction,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let project_dir = cli.url.is_none().then_some(cli.repo.as_path());
    let config = vgit_core::config::load_config(project_dir)?;

    let filter = format!(
        "vgit={level},vgit_core={level},vgit_cli={level}",
        level = config.log_level
    );
    init_tracing(&filter, cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting vgit");

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let docker = DockerCli::from_settings(Arc::clone(&runner), &config.docker);
    let settings = RepoSettings::from_config(&config)?;

    let repo = match &cli.url {
        Some(url) => {
            let dir = temp_repo_dir();
            let repo = Repo::new(&dir, runner, Arc::new(docker.clone()), settings)?;
            repo.clone(url).await?;
            info!(url = %url, path = %dir.display(), "Cloned into temporary directory");
            repo
        }
        None => Repo::new(&cli.repo, runner, Arc::new(docker.clone()), settings)?,
    };

    let result = branch_cmd::run(&repo, &docker, &config, cli.action).await;
    if let Err(e) = &result {
        if let Some(err) = e.downcast_ref::<vgit_core::Error>() {
            error!(code = err.code(), error = %err, "Command failed");
        }
    }
    result
}
