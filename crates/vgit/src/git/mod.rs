//! Version control adapter.
//!
//! Drives the `git` binary through a [`crate::runner::CommandRunner`] and
//! parses its textual output into typed results.

mod commit_ref;
mod controller;
pub mod diff;
pub mod parse;

pub use commit_ref::CommitRef;
pub use controller::GitController;
pub use diff::{Change, ChangeKind, FileDiff, Hunk};
