//! Container build configuration.

use serde::{Deserialize, Serialize};

/// How a workspace is packaged into an image and what the container runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Base image for `FROM`.
    pub from: String,
    /// Pattern copied before the build command so dependency installs can
    /// be cached (e.g. `package*.json`).
    pub build_copy: Option<String>,
    /// Command run at build time, after `build_copy`.
    pub build_command: Option<String>,
    /// Exec-form argument list for `CMD`.
    pub run_command: Vec<String>,
    pub exposed_ports: Vec<u16>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self::ubuntu()
    }
}

impl DockerConfig {
    /// Bare ubuntu image with no build step.
    pub fn ubuntu() -> Self {
        Self {
            from: "ubuntu".to_string(),
            build_copy: None,
            build_command: None,
            run_command: Vec::new(),
            exposed_ports: Vec::new(),
        }
    }

    /// Node project: installs dependencies then runs `npm run start` on 8080.
    pub fn node() -> Self {
        Self {
            from: "node".to_string(),
            build_copy: Some("package*.json".to_string()),
            build_command: Some("npm install".to_string()),
            run_command: vec!["npm".into(), "run".into(), "start".into()],
            exposed_ports: vec![8080],
        }
    }

    /// Look up a built-in preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "ubuntu" | "default" => Some(Self::ubuntu()),
            "node" => Some(Self::node()),
            _ => None,
        }
    }
}
