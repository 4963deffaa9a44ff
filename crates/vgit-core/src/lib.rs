//! `virtual-git` Core Library
//!
//! Shared functionality for the virtual-git crates:
//! - The closed error taxonomy every engine operation reports through
//! - Configuration resolution and hierarchy
//! - Container build configuration and presets
//! - Tracing initialisation

pub mod config;
pub mod docker;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use docker::DockerConfig;
pub use error::{Error, Result};
