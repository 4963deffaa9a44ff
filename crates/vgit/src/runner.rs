//! External process execution.
//!
//! Every git and docker invocation goes through a [`CommandRunner`], so the
//! engine can be exercised against a scripted runner in tests.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// Exit status of a finished process. `code` is `None` when the process was
/// killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    pub code: Option<i32>,
}

impl Exit {
    pub const SUCCESS: Self = Self { code: Some(0) };

    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Captured result of [`CommandRunner::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit: Exit,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    /// Successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit: Exit::SUCCESS,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed run (exit 1) with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            exit: Exit { code: Some(1) },
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub const fn success(&self) -> bool {
        self.exit.success()
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

/// Runs external programs against a working directory.
///
/// No timeouts: commands run to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output.
    async fn execute(&self, program: &Path, args: &[String], cwd: &Path)
    -> std::io::Result<ExecOutput>;

    /// Run to completion, forwarding stdout and stderr chunks to `on_data`
    /// as they arrive.
    async fn stream(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
        on_data: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> std::io::Result<Exit>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    env: Vec<(String, String)>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            env: vec![
                ("LC_ALL".into(), "C".into()),
                ("GIT_TERMINAL_PROMPT".into(), "0".into()),
            ],
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable passed to every spawned process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self, program: &Path, args: &[String], cwd: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
    ) -> std::io::Result<ExecOutput> {
        let start = std::time::Instant::now();
        let output = self.command(program, args, cwd).output().await?;
        let exit = Exit {
            code: output.status.code(),
        };
        debug!(
            program = %program.display(),
            ?args,
            cwd = %cwd.display(),
            code = ?exit.code,
            elapsed_ms = start.elapsed().as_millis(),
            "exec finished"
        );
        Ok(ExecOutput {
            exit,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn stream(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
        on_data: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> std::io::Result<Exit> {
        let start = std::time::Instant::now();
        let mut child = self
            .command(program, args, cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stderr"))?;

        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let mut out_text = Utf8Decoder::default();
        let mut err_text = Utf8Decoder::default();
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            let text = tokio::select! {
                n = stdout.read(&mut out_buf), if out_open => match n? {
                    0 => {
                        out_open = false;
                        out_text.finish()
                    }
                    n => out_text.push(&out_buf[..n]),
                },
                n = stderr.read(&mut err_buf), if err_open => match n? {
                    0 => {
                        err_open = false;
                        err_text.finish()
                    }
                    n => err_text.push(&err_buf[..n]),
                },
            };
            if !text.is_empty() {
                on_data(&text);
            }
        }

        let status = child.wait().await?;
        let exit = Exit {
            code: status.code(),
        };
        debug!(
            program = %program.display(),
            ?args,
            code = ?exit.code,
            elapsed_ms = start.elapsed().as_millis(),
            "stream finished"
        );
        Ok(exit)
    }
}

/// Incremental UTF-8 decoding of a byte stream.
///
/// A character split across two reads is held back until its remaining
/// bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete trailing character: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return text;
                        }
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is still held back once the stream has ended.
    fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
