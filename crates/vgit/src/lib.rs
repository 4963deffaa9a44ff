//! `virtual-git` Engine
//!
//! Git branches as mutable, undoable workspaces:
//! - [`Repo`] hands out one [`Branch`] per branch, each backed by its own
//!   worktree created on first use
//! - [`Branch`] edits files, commits, resets and diffs inside its worktree
//! - [`container`] packages a branch's tracked files into an image and runs it
//!
//! All process spawning goes through [`runner::CommandRunner`].

pub mod branch;
pub mod container;
pub mod git;
pub mod repo;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod tree;

pub use branch::Branch;
pub use container::{BuiltImage, ContainerEngine, DockerCli};
pub use git::{CommitRef, FileDiff, GitController};
pub use repo::{Repo, RepoSettings, WorktreeMode, repo_from_path, repo_from_url, temp_repo_dir};
pub use runner::{CommandRunner, ProcessRunner};
pub use tree::{Node, Tree, build_tree};
