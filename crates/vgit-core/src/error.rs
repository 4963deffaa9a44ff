//! Error types for virtual-git.
//!
//! Every external-command failure is re-signalled as one of these kinds at
//! the adapter boundary, so callers can match on a stable set.

use thiserror::Error;

/// Result type alias using the virtual-git [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds for virtual-git operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A git invocation exited non-zero and has no more specific kind.
    #[error("git command failed: {0}")]
    GitCommandFailed(String),

    #[error("clone failed: {0}")]
    CloneFailed(String),

    /// Hard reset to a commit reference failed (including unknown targets).
    #[error("undo failed: {0}")]
    UndoFailed(String),

    #[error("checkout failed: {0}")]
    CheckoutFailed(String),

    #[error("image build failed: {0}")]
    BuildImageFailed(String),

    /// No image to run, or the container could not be created.
    #[error("container creation failed: {0}")]
    CreateContainerFailed(String),

    /// The container was created but could not be started or attached.
    #[error("container run failed: {0}")]
    RunContainerFailed(String),

    /// Branch or worktree name rejected before reaching git.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Workspace-relative path escapes the worktree.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable tag for the error kind, suitable for telemetry and scripting.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::GitCommandFailed(_) => "GitCommandFailed",
            Self::CloneFailed(_) => "CloneFailed",
            Self::UndoFailed(_) => "UndoFailed",
            Self::CheckoutFailed(_) => "CheckoutFailed",
            Self::BuildImageFailed(_) => "BuildImageFailed",
            Self::CreateContainerFailed(_) => "CreateContainerFailed",
            Self::RunContainerFailed(_) => "RunContainerFailed",
            Self::InvalidName(_) => "InvalidName",
            Self::InvalidPath(_) => "InvalidPath",
            Self::Config(_) => "Config",
            Self::Json(_) => "Json",
            Self::Io(_) => "Io",
        }
    }
}
