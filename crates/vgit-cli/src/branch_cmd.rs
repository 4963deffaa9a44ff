//! CLI branch subcommands.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::future::Future;
use std::io::{self, Write};

use anyhow::{Context, anyhow};
use clap::Subcommand;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use vgit::git::{ChangeKind, FileDiff};
use vgit::{Branch, CommitRef, DockerCli, Node, Repo, Tree};
use vgit_core::Config;

#[derive(Subcommand, Debug)]
pub enum BranchAction {
    /// List local and remote branches
    Branches,
    /// Show the tracked files of a branch as a tree
    Tree {
        branch: String,
    },
    /// List the tracked files of a branch
    Files {
        branch: String,
    },
    /// Print a file from a branch
    Read {
        branch: String,
        path: String,
    },
    /// Write and stage a file (reads stdin unless --content is given)
    Write {
        branch: String,
        path: String,
        #[arg(long)]
        content: Option<String>,
    },
    /// Commit staged changes
    Save {
        branch: String,
    },
    /// Hard-reset to a commit id or a number of commits back (default 1)
    Undo {
        branch: String,
        target: Option<CommitRef>,
    },
    /// Show the diff between two commits, or against the working tree
    Changes {
        branch: String,
        from: Option<CommitRef>,
        to: Option<CommitRef>,
        /// Print the parsed diff as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build the branch into an image and run it
    Run {
        branch: String,
        /// Container preset (built-in: ubuntu, node)
        #[arg(long, default_value = "ubuntu")]
        preset: String,
    },
}

/// Execute a branch subcommand.
pub async fn run(
    repo: &Repo,
    docker: &DockerCli,
    config: &Config,
    action: BranchAction,
) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match action {
        BranchAction::Branches => {
            for name in repo.get_branches().await? {
                writeln!(out, "{name}")?;
            }
        }
        BranchAction::Tree { branch } => {
            let tree = require(repo, &branch).await?.get_file_tree().await?;
            write_tree(&mut out, &tree)?;
        }
        BranchAction::Files { branch } => {
            for file in require(repo, &branch).await?.files().await? {
                writeln!(out, "{file}")?;
            }
        }
        BranchAction::Read { branch, path } => {
            let content = require(repo, &branch).await?.read_file(&path).await?;
            out.write_all(content.as_bytes())?;
        }
        BranchAction::Write {
            branch,
            path,
            content,
        } => {
            let content = match content {
                Some(c) => c,
                None => {
                    let mut buf = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buf)
                        .await
                        .context("failed to read stdin")?;
                    buf
                }
            };
            require(repo, &branch)
                .await?
                .write_file(&path, &content)
                .await?;
            writeln!(out, "Staged {path}")?;
        }
        BranchAction::Save { branch } => {
            let id = require(repo, &branch).await?.save().await?;
            writeln!(out, "{id}")?;
        }
        BranchAction::Undo { branch, target } => {
            let branch = require(repo, &branch).await?;
            branch.undo(target).await?;
            let head = branch.git().get_commit(0).await?;
            writeln!(out, "HEAD is now {head}")?;
        }
        BranchAction::Changes {
            branch,
            from,
            to,
            json,
        } => {
            let diffs = require(repo, &branch).await?.changes(from, to).await?;
            if json {
                serde_json::to_writer_pretty(&mut out, &diffs)?;
                writeln!(out)?;
            } else {
                write_changes(&mut out, &diffs)?;
            }
        }
        BranchAction::Run { branch, preset } => {
            let docker_config = config
                .preset(&preset)
                .ok_or_else(|| anyhow!("unknown preset: {preset}"))?;
            let branch = require(repo, &branch).await?;
            let image = branch.build_image(&docker_config).await?;
            info!(branch = branch.name(), image = %image.id, "Running");

            let mut sink = |chunk: &str| {
                let _ = out.write_all(chunk.as_bytes());
                let _ = out.flush();
            };
            run_until(&branch, docker, tokio::signal::ctrl_c(), &mut sink).await?;
        }
    }
    Ok(())
}

/// Run the branch's image until it exits or `interrupt` resolves, then remove
/// the image. An interrupt kills every live container first.
async fn run_until<I: Future>(
    branch: &Branch,
    docker: &DockerCli,
    interrupt: I,
    sink: &mut (dyn for<'a> FnMut(&'a str) + Send),
) -> anyhow::Result<()> {
    let result = tokio::select! {
        biased;
        _ = interrupt => {
            info!("Interrupted, stopping containers");
            docker.kill_all().await;
            Ok(())
        }
        result = branch.run_image(sink) => result,
    };
    if let Err(e) = branch.discard_image().await {
        warn!(branch = branch.name(), error = %e, "Failed to remove image");
    }
    Ok(result?)
}

async fn require(repo: &Repo, name: &str) -> anyhow::Result<std::sync::Arc<Branch>> {
    repo.get_branch(name)
        .await?
        .ok_or_else(|| anyhow!("no such branch: {name}"))
}

/// Write a file tree, one entry per line, directories suffixed with `/`.
fn write_tree(w: &mut impl Write, tree: &Tree) -> io::Result<()> {
    fn walk(w: &mut impl Write, tree: &Tree, depth: usize) -> io::Result<()> {
        for child in &tree.children {
            let indent = "  ".repeat(depth);
            match child {
                Node::Dir(dir) => {
                    writeln!(w, "{indent}{}/", dir.name)?;
                    walk(w, dir, depth + 1)?;
                }
                Node::File(name) => writeln!(w, "{indent}{name}")?,
            }
        }
        Ok(())
    }
    writeln!(w, "{}/", tree.name)?;
    walk(w, tree, 1)
}

/// Write a diff summary followed by each hunk.
fn write_changes(w: &mut impl Write, diffs: &[FileDiff]) -> io::Result<()> {
    if diffs.is_empty() {
        writeln!(w, "No changes.")?;
        return Ok(());
    }
    for diff in diffs {
        let status = if diff.new_file {
            "new"
        } else if diff.deleted_file {
            "deleted"
        } else if diff.renamed {
            "renamed"
        } else {
            "modified"
        };
        writeln!(
            w,
            "{:<8}  {}  +{} -{}",
            status,
            diff.path(),
            diff.additions,
            diff.deletions
        )?;
        if diff.binary {
            writeln!(w, "  (binary)")?;
        }
        for hunk in &diff.hunks {
            writeln!(w, "  {}", hunk.header)?;
            for change in &hunk.changes {
                let marker = match change.kind {
                    ChangeKind::Add => '+',
                    ChangeKind::Delete => '-',
                    ChangeKind::Normal => ' ',
                };
                writeln!(w, "  {marker}{}", change.content)?;
            }
        }
    }
    Ok(())
}
