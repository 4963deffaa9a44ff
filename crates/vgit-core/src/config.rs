//! Configuration resolution for virtual-git.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/vgit/settings.json`)
//! 3. Project config (`<repo>/.vgit/settings.json`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::docker::DockerConfig;
use crate::error::{Error, Result};

/// Complete virtual-git configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub worktrees: WorktreeConfig,
    #[serde(default)]
    pub docker: DockerSettings,
    /// Named container presets, merged over the built-in `ubuntu`/`node`.
    #[serde(default)]
    pub presets: HashMap<String, DockerConfig>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            git: GitConfig::default(),
            worktrees: WorktreeConfig::default(),
            docker: DockerSettings::default(),
            presets: HashMap::new(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// How the `git` binary is driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub binary: PathBuf,
    /// Message used for every `save()` commit.
    pub commit_message: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
            commit_message: "virtual-git".to_string(),
        }
    }
}

/// Where branch worktrees are placed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorktreeModeSetting {
    /// `<repo>/<local_subfolder>/<branch>`
    #[default]
    Local,
    /// `<data dir>/vgit/worktrees/<repo name>/<branch>`
    Global,
    /// `<custom_path>/<repo name>/<branch>`
    Custom,
}

impl std::str::FromStr for WorktreeModeSetting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "global" => Ok(Self::Global),
            "custom" => Ok(Self::Custom),
            other => Err(Error::Config(format!("unknown worktree mode: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    pub mode: WorktreeModeSetting,
    pub local_subfolder: PathBuf,
    /// Required when `mode` is `custom`.
    pub custom_path: Option<PathBuf>,
    /// Add the local subfolder to the repository's `info/exclude`.
    pub auto_exclude: bool,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            mode: WorktreeModeSetting::Local,
            local_subfolder: PathBuf::from(".worktrees"),
            custom_path: None,
            auto_exclude: true,
        }
    }
}

/// How the `docker` binary is driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    pub binary: PathBuf,
    /// Prefix of generated image tags; also used as the `owner` label.
    pub image_prefix: String,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("docker"),
            image_prefix: "virtual-git".to_string(),
        }
    }
}

impl Config {
    /// Resolve a preset: user-defined presets shadow the built-ins.
    pub fn preset(&self, name: &str) -> Option<DockerConfig> {
        self.presets
            .get(name)
            .cloned()
            .or_else(|| DockerConfig::preset(name))
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let global = global_config_path();
    let project = project_dir.map(|dir| dir.join(".vgit").join("settings.json"));
    let layers: Vec<&Path> = global
        .iter()
        .chain(project.iter())
        .map(PathBuf::as_path)
        .collect();

    let mut config = resolve_layers(&layers)?;
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Built-in defaults overlaid with each settings file in `paths` that
/// exists. Later files win key by key; keys a file leaves out keep the value
/// from earlier layers.
pub fn resolve_layers(paths: &[&Path]) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for path in paths {
        if path.exists() {
            merge_config(&mut merged, read_settings(path)?);
        }
    }
    Ok(serde_json::from_value(merged)?)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("vgit").join("settings.json"))
}

/// Base directory for worktrees in `global` mode.
pub fn global_worktree_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("vgit").join("worktrees"))
}

/// Parse a single settings file over the built-in defaults.
pub fn load_config_file(path: &Path) -> Result<Config> {
    resolve_layers(&[path])
}

fn read_settings(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;
    if !value.is_object() {
        return Err(Error::Config(format!(
            "Config file {} must hold a JSON object",
            path.display()
        )));
    }
    Ok(value)
}

/// Recursively merge `overlay` into `base`. Objects merge per key; any other
/// value replaces what was there.
fn merge_config(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_config(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("VGIT_GIT_BIN") {
        config.git.binary = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("VGIT_DOCKER_BIN") {
        config.docker.binary = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("VGIT_COMMIT_MESSAGE") {
        config.git.commit_message = val;
    }
    if let Ok(val) = std::env::var("VGIT_WORKTREE_MODE") {
        if let Ok(mode) = val.parse() {
            config.worktrees.mode = mode;
        }
    }
    if let Ok(val) = std::env::var("VGIT_LOG_LEVEL") {
        config.log_level = val;
    }
}
