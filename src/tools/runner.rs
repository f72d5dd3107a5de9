use crate::types::ToolSpec;
use std::ffi::{OsStr, OsString};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// One external tool invocation with fully captured output.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Text worth showing a user when the tool failed: stderr, else stdout, else the exit status.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exited with {}", self.status)
    }
}

impl ToolCommand {
    pub fn new(spec: &ToolSpec) -> Self {
        Self {
            program: spec.program.clone().into_os_string(),
            args: spec.args.iter().map(OsString::from).collect(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Environment for the child only. Values never appear in logs.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn display(&self) -> String {
        let words = std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|w| w.to_string_lossy().into_owned());
        shell_words::join(words)
    }

    /// Run to completion. Stdout and stderr are drained concurrently, so a
    /// chatty tool cannot stall on a full pipe.
    pub async fn run(&self) -> std::io::Result<ToolOutput> {
        debug!("Running tool: {}", self.display());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        let output = cmd.output().await?;
        let result = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(
            "Tool {} finished with {} ({} bytes stdout, {} bytes stderr)",
            self.program.to_string_lossy(),
            result.status,
            output.stdout.len(),
            output.stderr.len()
        );
        Ok(result)
    }
}
