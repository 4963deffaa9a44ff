//! Test doubles for the process and container seams.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use vgit_core::{DockerConfig, Error, Result};

use crate::container::{BuiltImage, ContainerEngine};
use crate::runner::{CommandRunner, ExecOutput, Exit};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl Call {
    /// Whether `needle` appears as a contiguous run inside the arguments.
    pub fn has_args(&self, needle: &[&str]) -> bool {
        needle.is_empty()
            || self
                .args
                .windows(needle.len())
                .any(|w| w.iter().zip(needle).all(|(a, b)| a == b))
    }
}

struct Rule {
    args: Vec<String>,
    output: ExecOutput,
    chunks: Vec<String>,
}

/// [`CommandRunner`] that answers from a script and records every call.
///
/// A rule matches when its arguments appear contiguously in the call's
/// arguments; the first matching rule wins. Unmatched calls succeed with
/// empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on(self, args: &[&str], output: ExecOutput) -> Self {
        self.push(args, output, Vec::new());
        self
    }

    /// Script a streamed invocation: chunks are fed to the callback in order.
    #[must_use]
    pub fn on_stream(self, args: &[&str], chunks: &[&str], exit: Exit) -> Self {
        let output = ExecOutput {
            exit,
            stdout: String::new(),
            stderr: String::new(),
        };
        self.push(args, output, chunks.iter().map(ToString::to_string).collect());
        self
    }

    fn push(&self, args: &[&str], output: ExecOutput, chunks: Vec<String>) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                args: args.iter().map(ToString::to_string).collect(),
                output,
                chunks,
            });
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Calls whose arguments contain `needle`.
    pub fn calls_with(&self, needle: &[&str]) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.has_args(needle))
            .collect()
    }

    fn answer(&self, program: &Path, args: &[String], cwd: &Path) -> (ExecOutput, Vec<String>) {
        let call = Call {
            program: program.to_path_buf(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
        };
        let found = self.rules.lock().ok().and_then(|rules| {
            rules.iter().find_map(|rule| {
                let needle: Vec<&str> = rule.args.iter().map(String::as_str).collect();
                call.has_args(&needle)
                    .then(|| (rule.output.clone(), rule.chunks.clone()))
            })
        });
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        found.unwrap_or_else(|| (ExecOutput::ok(""), Vec::new()))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
    ) -> std::io::Result<ExecOutput> {
        Ok(self.answer(program, args, cwd).0)
    }

    async fn stream(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
        on_data: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> std::io::Result<Exit> {
        let (output, chunks) = self.answer(program, args, cwd);
        for chunk in &chunks {
            on_data(chunk);
        }
        Ok(output.exit)
    }
}

/// What a [`RecordingEngine`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Build {
        worktree: PathBuf,
        files: Vec<String>,
        config: DockerConfig,
    },
    Run {
        image: String,
    },
    Remove {
        image: String,
    },
}

/// [`ContainerEngine`] that records requests and replays canned output.
#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<EngineCall>>,
    output: Vec<String>,
    fail_runs: bool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(mut self, chunks: &[&str]) -> Self {
        self.output = chunks.iter().map(ToString::to_string).collect();
        self
    }

    /// Make every run fail as if the container could not be created.
    #[must_use]
    pub fn failing_runs(mut self) -> Self {
        self.fail_runs = true;
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: EngineCall) -> Result<usize> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| Error::RunContainerFailed("recording engine poisoned".into()))?;
        calls.push(call);
        Ok(calls.len())
    }
}

#[async_trait]
impl ContainerEngine for RecordingEngine {
    async fn build_image(
        &self,
        worktree: &Path,
        files: &[String],
        config: &DockerConfig,
    ) -> Result<BuiltImage> {
        let n = self.record(EngineCall::Build {
            worktree: worktree.to_path_buf(),
            files: files.to_vec(),
            config: config.clone(),
        })?;
        Ok(BuiltImage {
            id: format!("virtual-git-test{n}"),
            exposed_ports: config.exposed_ports.clone(),
        })
    }

    async fn run_image(
        &self,
        image: &BuiltImage,
        on_data: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<()> {
        self.record(EngineCall::Run {
            image: image.id.clone(),
        })?;
        if self.fail_runs {
            return Err(Error::CreateContainerFailed(format!(
                "failed to create container from {}",
                image.id
            )));
        }
        for chunk in &self.output {
            on_data(chunk);
        }
        Ok(())
    }

    async fn remove_image(&self, image: &BuiltImage) -> Result<()> {
        self.record(EngineCall::Remove {
            image: image.id.clone(),
        })?;
        Ok(())
    }
}
